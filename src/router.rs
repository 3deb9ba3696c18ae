//! Query router: keyword/regex intent classification and platform checks.

use crate::error::{AssistantError, Result};
use crate::registry::SchemaCatalog;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Sales,
    Inventory,
    Customers,
    Performance,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Sales => "sales",
            QueryType::Inventory => "inventory",
            QueryType::Customers => "customers",
            QueryType::Performance => "performance",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered classifier. The first query type whose pattern set matches the
/// lower-cased input wins; declaration order breaks ties. No match means
/// the message is a general (non-data) query.
pub struct QueryRouter {
    patterns: Vec<(QueryType, Vec<Regex>)>,
}

impl QueryRouter {
    pub fn new() -> Self {
        let declarations: &[(QueryType, &[&str])] = &[
            (
                QueryType::Sales,
                &[
                    r"sales",
                    r"revenue",
                    r"earnings",
                    r"income",
                    r"transactions",
                    r"orders",
                    r"purchases",
                ],
            ),
            (
                QueryType::Inventory,
                &[r"inventory", r"stock", r"products", r"items", r"availability"],
            ),
            (
                QueryType::Customers,
                &[r"customers?", r"buyers", r"clients", r"customer base", r"shoppers"],
            ),
            (
                QueryType::Performance,
                &[r"performance", r"metrics", r"analytics", r"trends", r"growth"],
            ),
        ];
        let patterns = declarations
            .iter()
            .map(|(query_type, raw)| {
                let compiled = raw
                    .iter()
                    .map(|p| Regex::new(p).expect("router pattern must compile"))
                    .collect();
                (*query_type, compiled)
            })
            .collect();
        Self { patterns }
    }

    /// Build a router from an explicit (type, patterns) list, keeping the
    /// given order. Patterns that fail to compile reject the whole set.
    pub fn with_patterns(declarations: Vec<(QueryType, Vec<String>)>) -> Result<Self> {
        let mut patterns = Vec::with_capacity(declarations.len());
        for (query_type, raw) in declarations {
            let mut compiled = Vec::with_capacity(raw.len());
            for p in raw {
                let regex = Regex::new(&p).map_err(|e| {
                    AssistantError::SchemaLoad(format!("bad router pattern '{}': {}", p, e))
                })?;
                compiled.push(regex);
            }
            patterns.push((query_type, compiled));
        }
        Ok(Self { patterns })
    }

    /// Classify free text. Empty or whitespace-only input is a general
    /// query, never an error.
    pub fn classify(&self, text: &str) -> Option<QueryType> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }
        for (query_type, patterns) in &self.patterns {
            if patterns.iter().any(|p| p.is_match(&text)) {
                return Some(*query_type);
            }
        }
        None
    }

    /// Partition the requested platforms into (valid, invalid) against the
    /// catalog. Callers must reject requests with any invalid platform.
    pub fn validate_platforms(
        &self,
        requested: &HashSet<String>,
        catalog: &SchemaCatalog,
    ) -> (HashSet<String>, HashSet<String>) {
        let known = catalog.platforms();
        let valid = requested.intersection(&known).cloned().collect();
        let invalid = requested.difference(&known).cloned().collect();
        (valid, invalid)
    }

    /// Fail unless at least one requested platform (or the consolidated
    /// group) has a table servicing `query_type`.
    pub fn validate_query_support(
        &self,
        query_type: QueryType,
        platforms: &HashSet<String>,
        catalog: &SchemaCatalog,
    ) -> Result<()> {
        let supported = catalog
            .tables_for_query_type(query_type.as_str())
            .iter()
            .any(|t| t.platform == "consolidated" || platforms.contains(&t.platform));
        if supported {
            Ok(())
        } else {
            Err(AssistantError::UnsupportedQueryType(format!(
                "{} (no tables for requested platforms)",
                query_type
            )))
        }
    }
}

impl Default for QueryRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_keyword() {
        let router = QueryRouter::new();
        assert_eq!(
            router.classify("What were my total sales last month?"),
            Some(QueryType::Sales)
        );
        assert_eq!(
            router.classify("How much stock is left?"),
            Some(QueryType::Inventory)
        );
        assert_eq!(
            router.classify("how many new buyers this week"),
            Some(QueryType::Customers)
        );
    }

    #[test]
    fn first_declared_type_wins_ties() {
        // "orders" (sales) and "products" (inventory) both match; sales is
        // declared first.
        let router = QueryRouter::new();
        assert_eq!(
            router.classify("orders per products"),
            Some(QueryType::Sales)
        );
    }

    #[test]
    fn empty_input_is_general() {
        let router = QueryRouter::new();
        assert_eq!(router.classify(""), None);
        assert_eq!(router.classify("   \t\n"), None);
        assert_eq!(router.classify("hello, how are you?"), None);
    }

    #[test]
    fn custom_patterns_keep_order() {
        let router = QueryRouter::with_patterns(vec![
            (QueryType::Inventory, vec![r"widgets".to_string()]),
            (QueryType::Sales, vec![r"widgets".to_string()]),
        ])
        .unwrap();
        assert_eq!(router.classify("widgets"), Some(QueryType::Inventory));
    }
}
