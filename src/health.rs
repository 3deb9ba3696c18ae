//! Health signal for the hosting layer.

use crate::registry::SchemaRegistry;
use crate::warehouse::Warehouse;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    /// Serving, but the warehouse is unreachable; data queries will fail.
    Degraded,
    Down,
}

/// Down until the schema registry has initialized; degraded while the
/// warehouse probe fails.
pub async fn health(registry: &SchemaRegistry, warehouse: &dyn Warehouse) -> HealthStatus {
    if !registry.is_initialized() {
        return HealthStatus::Down;
    }
    if !warehouse.healthy().await {
        return HealthStatus::Degraded;
    }
    HealthStatus::Up
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::MemoryWarehouse;

    #[tokio::test]
    async fn down_without_registry() {
        let registry = SchemaRegistry::new();
        let warehouse = MemoryWarehouse::new();
        assert_eq!(health(&registry, &warehouse).await, HealthStatus::Down);
    }
}
