//! Declarative schema model for the table catalog.
//!
//! Each table is described by one YAML document declaring its columns,
//! keys, relationships, business rules, metrics, and query templates.
//! `table_name` and `columns` are mandatory; everything else is optional.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    /// Owning platform. Filled in from the directory the document was
    /// loaded from, so documents don't need to repeat it.
    #[serde(default)]
    pub platform: String,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub keys: Keys,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub business_rules: Vec<BusinessRule>,
    #[serde(default)]
    pub common_metrics: Vec<CommonMetric>,
    #[serde(default)]
    pub query_templates: Vec<QueryTemplate>,
    #[serde(default)]
    pub query_types: Vec<String>,
    #[serde(default)]
    pub update_frequency: Option<String>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// First declared timestamp/date column, used for date-range conditions.
    pub fn date_column(&self) -> Option<&ColumnDefinition> {
        self.columns
            .iter()
            .find(|c| matches!(c.column_type, ColumnType::Timestamp | ColumnType::Date))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub business_term: Option<String>,
    /// Allowed values for enum columns.
    #[serde(default)]
    pub values: Vec<String>,
    /// Physical field name per platform, for consolidated tables.
    #[serde(default)]
    pub platform_fields: HashMap<String, String>,
    /// Aggregations that make sense for this column (SUM, AVG, ...).
    #[serde(default)]
    pub aggregation_rules: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Timestamp,
    Date,
    Decimal,
    Integer,
    Enum,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Keys {
    #[serde(default)]
    pub primary: Vec<String>,
    /// Platform-native identifier columns, keyed by platform.
    #[serde(default)]
    pub platform_specific: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    OneToMany,
    ManyToOne,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub table: String,
    #[serde(rename = "type")]
    pub cardinality: Cardinality,
    pub local_key: String,
    pub foreign_key: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessRule {
    pub name: String,
    /// Boolean SQL conditions, ANDed together.
    pub conditions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonMetric {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub sql: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub name: String,
    #[serde(rename = "type")]
    pub query_type: String,
    /// Parameterized SQL skeleton. Recognized placeholders: `{table}`,
    /// `{date_condition}`, `{platform_condition}`.
    pub template: String,
    #[serde(default)]
    pub description: Option<String>,
}
