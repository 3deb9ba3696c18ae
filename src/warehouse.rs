//! Warehouse capability: execute parameterized SQL and return rows.
//!
//! The real warehouse lives behind the `Warehouse` trait. Retry policy is
//! an explicit wrapper, bounded, and applies only to execution. A timeout
//! at the call site is a failure, not an automatic retry.

use crate::generator::ParamValue;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// Cost estimate, when the backend reports one post-execution.
    pub bytes_processed: Option<u64>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WarehouseError {
    #[error("query timed out")]
    Timeout,
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("quota exceeded")]
    QuotaExceeded,
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("warehouse unavailable: {0}")]
    Unavailable(String),
    #[error("warehouse error: {0}")]
    Other(String),
}

impl WarehouseError {
    /// Transient failures worth a bounded retry. Permission and syntax
    /// errors are deterministic and retrying them cannot help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WarehouseError::Timeout
                | WarehouseError::QuotaExceeded
                | WarehouseError::Unavailable(_)
        )
    }
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn execute(
        &self,
        sql: &str,
        params: &BTreeMap<String, ParamValue>,
        timeout: Duration,
    ) -> Result<QueryResult, WarehouseError>;

    /// Physical schema introspection for a table, as (column, type) pairs.
    async fn table_schema(&self, table: &str) -> Result<Vec<(String, String)>, WarehouseError>;

    /// Cheap reachability probe, used by the health signal.
    async fn healthy(&self) -> bool;
}

/// Bounded-retry wrapper around any warehouse. Backoff is fixed per
/// attempt and capped by construction.
pub struct RetryingWarehouse<W> {
    inner: W,
    max_attempts: u32,
    backoff: Duration,
}

impl<W: Warehouse> RetryingWarehouse<W> {
    pub fn new(inner: W, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

#[async_trait]
impl<W: Warehouse> Warehouse for RetryingWarehouse<W> {
    async fn execute(
        &self,
        sql: &str,
        params: &BTreeMap<String, ParamValue>,
        timeout: Duration,
    ) -> Result<QueryResult, WarehouseError> {
        let mut last = WarehouseError::Other("no attempts made".to_string());
        for attempt in 1..=self.max_attempts {
            match self.inner.execute(sql, params, timeout).await {
                Ok(result) => {
                    info!(
                        attempt,
                        rows = result.rows.len(),
                        bytes = result.bytes_processed,
                        "query executed"
                    );
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(attempt, error = %e, "retryable warehouse failure");
                    tokio::time::sleep(self.backoff).await;
                    last = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last)
    }

    async fn table_schema(&self, table: &str) -> Result<Vec<(String, String)>, WarehouseError> {
        self.inner.table_schema(table).await
    }

    async fn healthy(&self) -> bool {
        self.inner.healthy().await
    }
}

/// In-memory warehouse with canned responses, for tests and dry runs.
pub struct MemoryWarehouse {
    canned: std::sync::Mutex<Vec<Result<QueryResult, WarehouseError>>>,
    pub executed: std::sync::Mutex<Vec<String>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self {
            canned: std::sync::Mutex::new(Vec::new()),
            executed: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Queue the outcome of the next execution. Outcomes are consumed in
    /// FIFO order; an empty queue yields an empty result set.
    pub fn push_outcome(&self, outcome: Result<QueryResult, WarehouseError>) {
        self.canned.lock().expect("lock poisoned").push(outcome);
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.push_outcome(Ok(QueryResult {
            rows,
            bytes_processed: Some(1024),
        }));
    }
}

impl Default for MemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn execute(
        &self,
        sql: &str,
        _params: &BTreeMap<String, ParamValue>,
        _timeout: Duration,
    ) -> Result<QueryResult, WarehouseError> {
        self.executed
            .lock()
            .expect("lock poisoned")
            .push(sql.to_string());
        let mut canned = self.canned.lock().expect("lock poisoned");
        if canned.is_empty() {
            Ok(QueryResult {
                rows: Vec::new(),
                bytes_processed: Some(0),
            })
        } else {
            canned.remove(0)
        }
    }

    async fn table_schema(&self, _table: &str) -> Result<Vec<(String, String)>, WarehouseError> {
        Ok(Vec::new())
    }

    async fn healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with_rows(n: usize) -> QueryResult {
        QueryResult {
            rows: (0..n).map(|_| Row::new()).collect(),
            bytes_processed: None,
        }
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let inner = MemoryWarehouse::new();
        inner.push_outcome(Err(WarehouseError::Timeout));
        inner.push_outcome(Err(WarehouseError::Unavailable("502".to_string())));
        inner.push_outcome(Ok(result_with_rows(2)));
        let warehouse = RetryingWarehouse::new(inner, 3, Duration::from_millis(1));
        let result = warehouse
            .execute("SELECT 1 FROM t", &BTreeMap::new(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let inner = MemoryWarehouse::new();
        for _ in 0..3 {
            inner.push_outcome(Err(WarehouseError::Timeout));
        }
        let warehouse = RetryingWarehouse::new(inner, 3, Duration::from_millis(1));
        let err = warehouse
            .execute("SELECT 1 FROM t", &BTreeMap::new(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, WarehouseError::Timeout);
    }

    #[tokio::test]
    async fn permission_errors_are_not_retried() {
        let inner = MemoryWarehouse::new();
        inner.push_outcome(Err(WarehouseError::Permission("denied".to_string())));
        inner.push_outcome(Ok(result_with_rows(1)));
        let warehouse = RetryingWarehouse::new(inner, 3, Duration::from_millis(1));
        let err = warehouse
            .execute("SELECT 1 FROM t", &BTreeMap::new(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, WarehouseError::Permission(_)));
        assert_eq!(warehouse.inner.executed.lock().unwrap().len(), 1);
    }
}
