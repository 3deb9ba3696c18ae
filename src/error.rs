use thiserror::Error;

use crate::warehouse::WarehouseError;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Schema load error: {0}")]
    SchemaLoad(String),

    #[error(
        "I don't recognize these platforms: {}. Available platforms are {}.",
        .unknown.join(", "),
        .available.join(", ")
    )]
    InvalidPlatform {
        unknown: Vec<String>,
        available: Vec<String>,
    },

    #[error("Unsupported query type: {0}")]
    UnsupportedQueryType(String),

    #[error("No query template for table '{table}' and query type '{query_type}'")]
    TemplateNotFound { table: String, query_type: String },

    #[error("Query validation failed: {0}")]
    Validation(String),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl AssistantError {
    /// Whether the error came from bad user input, as opposed to an
    /// internal inconsistency. Input errors are described to the user
    /// precisely; everything else gets a generic message.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            AssistantError::InvalidPlatform { .. } | AssistantError::UnsupportedQueryType(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_platform_message_names_offenders_and_alternatives() {
        let err = AssistantError::InvalidPlatform {
            unknown: vec!["nonexistent".to_string()],
            available: vec!["amazon".to_string(), "shopify".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("nonexistent"));
        assert!(text.contains("amazon, shopify"));
        assert!(err.is_user_error());
    }

    #[test]
    fn validation_errors_are_internal() {
        assert!(!AssistantError::Validation("x".to_string()).is_user_error());
    }
}
