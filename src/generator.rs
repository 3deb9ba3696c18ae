//! SQL generation: resolve a table and template for the classified intent,
//! fill the template's placeholders, and bind every variable value through
//! the named parameter map. User text never reaches the SQL string.

use crate::config::{Settings, TableResolution};
use crate::error::{AssistantError, Result};
use crate::registry::SchemaCatalog;
use crate::router::{QueryRouter, QueryType};
use crate::timeparse;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// A typed query parameter, bound by name (`@start_date`, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Date(NaiveDate),
    Str(String),
    StrList(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct GeneratedQuery {
    pub sql: String,
    pub params: BTreeMap<String, ParamValue>,
    /// Tables referenced by the query, for downstream validation.
    pub tables: Vec<String>,
    pub query_type: QueryType,
}

pub struct SqlGenerator {
    router: QueryRouter,
    default_window_days: u32,
    table_resolution: TableResolution,
}

impl SqlGenerator {
    pub fn new(settings: &Settings) -> Self {
        Self {
            router: QueryRouter::new(),
            default_window_days: settings.default_window_days,
            table_resolution: settings.table_resolution,
        }
    }

    /// Generate a parameterized query for `text` against the given catalog
    /// snapshot. `now` is injected so identical inputs at the same instant
    /// produce identical output.
    pub fn generate(
        &self,
        catalog: &SchemaCatalog,
        text: &str,
        platforms: &HashSet<String>,
        query_type: Option<QueryType>,
        now: DateTime<Utc>,
    ) -> Result<GeneratedQuery> {
        // A router miss is a generation failure, never a silent default.
        let query_type = match query_type.or_else(|| self.router.classify(text)) {
            Some(qt) => qt,
            None => {
                return Err(AssistantError::UnsupportedQueryType(
                    "message does not describe a data query".to_string(),
                ))
            }
        };

        let table = self.resolve_table(catalog, query_type, platforms)?;
        let schema = catalog
            .get_table_schema(&table)
            .ok_or_else(|| AssistantError::TemplateNotFound {
                table: table.clone(),
                query_type: query_type.to_string(),
            })?;
        let is_consolidated = schema.platform == "consolidated";

        let range = timeparse::parse_time_range(text, now, self.default_window_days);

        let template = catalog
            .find_template(&table, query_type.as_str())
            .ok_or_else(|| AssistantError::TemplateNotFound {
                table: table.clone(),
                query_type: query_type.to_string(),
            })?;

        let date_column = schema
            .date_column()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "created_at".to_string());
        let date_condition = format!("{} BETWEEN @start_date AND @end_date", date_column);
        let platform_condition = if is_consolidated {
            "platform IN UNNEST(@platforms)"
        } else {
            "1=1"
        };

        let sql = template
            .template
            .replace("{table}", &table)
            .replace("{date_condition}", &date_condition)
            .replace("{platform_condition}", platform_condition)
            .trim()
            .to_string();

        let mut params = BTreeMap::new();
        params.insert("start_date".to_string(), ParamValue::Date(range.start));
        params.insert("end_date".to_string(), ParamValue::Date(range.end));
        if is_consolidated {
            let mut sorted: Vec<String> = platforms.iter().cloned().collect();
            sorted.sort();
            params.insert("platforms".to_string(), ParamValue::StrList(sorted));
        }

        debug!(%query_type, table = %table, start = %range.start, end = %range.end, "resolved query intent");
        info!(template = %template.name, table = %table, "generated SQL");

        Ok(GeneratedQuery {
            sql,
            params,
            tables: vec![table],
            query_type,
        })
    }

    /// Table resolution policy: a multi-platform request prefers the
    /// consolidated table for the query type when one exists; a
    /// single-platform request uses that platform's table. Configurable
    /// via `TableResolution`.
    fn resolve_table(
        &self,
        catalog: &SchemaCatalog,
        query_type: QueryType,
        platforms: &HashSet<String>,
    ) -> Result<String> {
        let candidates = catalog.tables_for_query_type(query_type.as_str());
        if candidates.is_empty() {
            return Err(AssistantError::UnsupportedQueryType(format!(
                "no tables service '{}' queries",
                query_type
            )));
        }

        let prefer_consolidated = platforms.len() > 1
            && self.table_resolution == TableResolution::PreferConsolidated;
        if prefer_consolidated {
            if let Some(consolidated) = candidates.iter().find(|t| t.platform == "consolidated") {
                return Ok(consolidated.table_name.clone());
            }
        }

        // Platform-specific table for one of the requested platforms,
        // smallest platform name first for determinism.
        let mut requested: Vec<&String> = platforms.iter().collect();
        requested.sort();
        for platform in requested {
            if let Some(table) = candidates.iter().find(|t| &t.platform == platform) {
                return Ok(table.table_name.clone());
            }
        }

        // Fall back to consolidated even for single-platform requests when
        // no platform table services the type.
        if let Some(consolidated) = candidates.iter().find(|t| t.platform == "consolidated") {
            return Ok(consolidated.table_name.clone());
        }

        Err(AssistantError::UnsupportedQueryType(format!(
            "{} (no tables for requested platforms)",
            query_type
        )))
    }
}
