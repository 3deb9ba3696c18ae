//! Assistant manager: orchestrates memory, routing, generation,
//! validation, execution, and response formatting per incoming message.
//!
//! Every path through `process_message`, success or failure, appends
//! exactly one assistant-role message to conversation memory before
//! returning, so history always matches what the user saw.

use crate::config::{messages, Settings};
use crate::error::{AssistantError, Result};
use crate::generator::{GeneratedQuery, SqlGenerator};
use crate::llm::{general_prompt, TextGenerator};
use crate::memory::{ConversationMemory, Role};
use crate::registry::SchemaRegistry;
use crate::router::{QueryRouter, QueryType};
use crate::validator::SqlValidator;
use crate::warehouse::{Row, Warehouse, WarehouseError};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Reply to one processed message, including observability fields for
/// data queries.
#[derive(Debug, Clone)]
pub struct AssistantReply {
    pub message: String,
    pub query_type: Option<QueryType>,
    pub sql: Option<String>,
    pub tables: Vec<String>,
    pub rows: Vec<Row>,
}

impl AssistantReply {
    fn general(message: String) -> Self {
        Self {
            message,
            query_type: None,
            sql: None,
            tables: Vec::new(),
            rows: Vec::new(),
        }
    }
}

pub struct AssistantManager {
    registry: SchemaRegistry,
    router: QueryRouter,
    generator: SqlGenerator,
    validator: SqlValidator,
    warehouse: Arc<dyn Warehouse>,
    llm: Arc<dyn TextGenerator>,
    memory: Mutex<ConversationMemory>,
    settings: Settings,
}

impl AssistantManager {
    pub fn new(
        registry: SchemaRegistry,
        warehouse: Arc<dyn Warehouse>,
        llm: Arc<dyn TextGenerator>,
        settings: Settings,
    ) -> Self {
        Self {
            registry,
            router: QueryRouter::new(),
            generator: SqlGenerator::new(&settings),
            validator: SqlValidator::new(),
            warehouse,
            llm,
            memory: Mutex::new(ConversationMemory::new(settings.memory_max_messages)),
            settings,
        }
    }

    /// Process one user message. The optional context map may carry a
    /// `now` key (RFC 3339) that pins the reference instant for time-range
    /// parsing; otherwise wall-clock UTC is used.
    pub async fn process_message(
        &self,
        message: &str,
        conversation_id: &str,
        platforms: &HashSet<String>,
        context: Option<&HashMap<String, String>>,
    ) -> AssistantReply {
        let request_id = Uuid::new_v4();
        info!(%request_id, conversation_id, message_len = message.len(), "processing message");

        {
            let mut memory = self.memory.lock().await;
            memory.add_message(conversation_id, Role::User, message);
        }

        let now = context
            .and_then(|c| c.get("now"))
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let reply = self
            .handle_message(message, conversation_id, platforms, now)
            .await;

        {
            let mut memory = self.memory.lock().await;
            memory.add_message(conversation_id, Role::Assistant, reply.message.clone());
        }
        reply
    }

    async fn handle_message(
        &self,
        message: &str,
        conversation_id: &str,
        platforms: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> AssistantReply {
        let catalog = match self.registry.snapshot() {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "registry not ready");
                return AssistantReply::general(messages::GENERIC_FAILURE.to_string());
            }
        };

        let (_valid, invalid) = self.router.validate_platforms(platforms, &catalog);
        if !invalid.is_empty() {
            let err = AssistantError::InvalidPlatform {
                unknown: invalid.into_iter().sorted().collect(),
                available: catalog.platforms().into_iter().sorted().collect(),
            };
            warn!(error = %err, "unknown platforms in request");
            return AssistantReply::general(err.to_string());
        }

        let query_type = self.router.classify(message);
        match query_type {
            Some(query_type) => {
                self.handle_data_query(&catalog, message, platforms, query_type, now)
                    .await
            }
            None => self.handle_general_query(message, conversation_id).await,
        }
    }

    /// Data path. The catalog snapshot is taken once per request so a
    /// concurrent reload can't change the schema mid-pipeline.
    async fn handle_data_query(
        &self,
        catalog: &crate::registry::SchemaCatalog,
        message: &str,
        platforms: &HashSet<String>,
        query_type: QueryType,
        now: DateTime<Utc>,
    ) -> AssistantReply {
        if let Err(e) = self
            .router
            .validate_query_support(query_type, platforms, catalog)
        {
            warn!(error = %e, "request rejected");
            return AssistantReply::general(format!(
                "I can't answer {} questions for the selected platforms. \
                 Try a different platform selection.",
                query_type
            ));
        }

        let generated = match self.generator.generate(
            catalog,
            message,
            platforms,
            Some(query_type),
            now,
        ) {
            Ok(g) => g,
            Err(e) if e.is_user_error() => {
                return AssistantReply::general(e.to_string());
            }
            Err(e) => {
                // Router and registry disagree. A bug, not user input.
                error!(error = %e, %query_type, "query generation failed");
                return AssistantReply::general(messages::GENERIC_FAILURE.to_string());
            }
        };

        if let Err(e) = self
            .validator
            .validate(catalog, &generated.sql, Some(&generated.params))
            .into_result()
        {
            // Generator output failing validation is an internal
            // inconsistency. Log the offending SQL for audit; the
            // query is never executed.
            error!(sql = %generated.sql, error = %e, "generated SQL failed validation");
            return AssistantReply::general(messages::GENERIC_FAILURE.to_string());
        }

        let result = match self
            .warehouse
            .execute(&generated.sql, &generated.params, self.settings.warehouse_timeout)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "warehouse execution failed");
                let message = match e {
                    WarehouseError::Timeout | WarehouseError::Unavailable(_) => {
                        messages::TRY_AGAIN_LATER
                    }
                    _ => messages::GENERIC_FAILURE,
                };
                return AssistantReply {
                    message: message.to_string(),
                    query_type: Some(query_type),
                    sql: Some(generated.sql),
                    tables: generated.tables,
                    rows: Vec::new(),
                };
            }
        };

        let text = self.format_response(&generated, &result.rows).await;
        AssistantReply {
            message: text,
            query_type: Some(query_type),
            sql: Some(generated.sql),
            tables: generated.tables,
            rows: result.rows,
        }
    }

    async fn handle_general_query(&self, message: &str, conversation_id: &str) -> AssistantReply {
        let history = {
            let memory = self.memory.lock().await;
            memory.get_history(conversation_id, Some(6))
        };
        let prompt = general_prompt(message, &history);
        match self.llm.generate(&prompt).await {
            Ok(text) => AssistantReply::general(text),
            Err(e) => {
                error!(error = %e, "general response generation failed");
                AssistantReply::general(
                    "Hello! Ask me about your sales, inventory, customers, or performance."
                        .to_string(),
                )
            }
        }
    }

    /// Deterministic per-query-type summary, optionally rewritten by the
    /// LLM when summaries are enabled.
    async fn format_response(&self, generated: &GeneratedQuery, rows: &[Row]) -> String {
        if rows.is_empty() {
            return messages::NO_DATA.to_string();
        }
        let summary = format_rows(generated.query_type, rows);
        if !self.settings.llm_summaries {
            return summary;
        }
        let prompt = format!(
            "Rephrase this analytics summary as one friendly sentence. \
             Keep every number exactly as written.\n\n{}",
            summary
        );
        match self.llm.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "summary generation failed, using template");
                summary
            }
        }
    }

    /// Persist conversation memory if a snapshot path is configured.
    pub async fn save_memory(&self) -> Result<()> {
        if let Some(path) = &self.settings.memory_snapshot_path {
            let memory = self.memory.lock().await;
            memory.save_state(path)?;
        }
        Ok(())
    }

    pub async fn load_memory(&self) -> Result<()> {
        if let Some(path) = &self.settings.memory_snapshot_path {
            let mut memory = self.memory.lock().await;
            memory.load_state(path)?;
        }
        Ok(())
    }

    /// Sweep expired conversations. Intended to be called periodically by
    /// the hosting layer.
    pub async fn sweep_memory(&self) {
        let mut memory = self.memory.lock().await;
        memory.sweep_expired(self.settings.memory_max_age, Utc::now());
    }

    /// History access for callers that need to render a transcript.
    pub async fn history(&self, conversation_id: &str, limit: Option<usize>) -> Vec<crate::memory::ConversationMessage> {
        let memory = self.memory.lock().await;
        memory.get_history(conversation_id, limit)
    }
}

fn numeric(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Template formatter per query type. Column names follow the shipped
/// query templates.
fn format_rows(query_type: QueryType, rows: &[Row]) -> String {
    match query_type {
        QueryType::Sales => {
            let total: f64 = rows
                .iter()
                .filter_map(|r| r.get("total_sales").and_then(numeric))
                .sum();
            let by_platform: Vec<String> = rows
                .iter()
                .filter_map(|r| {
                    let platform = r.get("platform")?.as_str()?;
                    let amount = r.get("total_sales").and_then(numeric)?;
                    Some(format!("{}: ${:.2}", platform, amount))
                })
                .collect();
            if by_platform.is_empty() {
                format!("Total sales for the selected period: ${:.2}.", total)
            } else {
                format!(
                    "Total sales for the selected period: ${:.2} ({}).",
                    total,
                    by_platform.join(", ")
                )
            }
        }
        QueryType::Inventory => {
            let products: f64 = rows
                .iter()
                .filter_map(|r| r.get("product_count").and_then(numeric))
                .sum();
            let quantity: f64 = rows
                .iter()
                .filter_map(|r| r.get("total_quantity").and_then(numeric))
                .sum();
            format!(
                "Current inventory shows {:.0} products with a total quantity of {:.0}.",
                products, quantity
            )
        }
        QueryType::Customers => {
            let customers: f64 = rows
                .iter()
                .filter_map(|r| r.get("customer_count").and_then(numeric))
                .sum();
            format!("{:.0} customers matched for the selected period.", customers)
        }
        QueryType::Performance => {
            format!("Found {} result rows for the selected period.", rows.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn formats_sales_totals_by_platform() {
        let rows = vec![
            row(&[("platform", json!("shopify")), ("total_sales", json!(1200.5))]),
            row(&[("platform", json!("amazon")), ("total_sales", json!(799.5))]),
        ];
        let text = format_rows(QueryType::Sales, &rows);
        assert!(text.contains("$2000.00"));
        assert!(text.contains("shopify: $1200.50"));
    }

    #[test]
    fn formats_inventory_counts() {
        let rows = vec![row(&[
            ("product_count", json!(42)),
            ("total_quantity", json!(1300)),
        ])];
        let text = format_rows(QueryType::Inventory, &rows);
        assert!(text.contains("42 products"));
        assert!(text.contains("1300"));
    }
}
