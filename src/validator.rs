//! Staged SQL validation: security denylist, structural shape, and schema
//! compliance (tables and columns) against the registry.
//!
//! The security stage is a pattern denylist, documented as defense in
//! depth on top of template-restricted generation, not a parser and not a
//! security boundary on its own. Validation never executes the query.

use crate::error::AssistantError;
use crate::generator::ParamValue;
use crate::registry::SchemaCatalog;
use itertools::Itertools;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

/// Words that appear in generated SQL but never name a column.
const SQL_KEYWORDS: &[&str] = &[
    "select", "from", "where", "group", "by", "order", "having", "limit",
    "and", "or", "not", "as", "on", "in", "is", "null", "like", "between",
    "distinct", "asc", "desc", "join", "inner", "left", "right", "outer",
    "case", "when", "then", "else", "end", "union", "all", "true", "false",
];

/// Validation outcome. `Invalid` carries a description intended for logs,
/// not for end users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(String),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Verdict::Valid => None,
            Verdict::Invalid(e) => Some(e),
        }
    }

    /// Map onto the crate error taxonomy for callers that propagate.
    pub fn into_result(self) -> crate::error::Result<()> {
        match self {
            Verdict::Valid => Ok(()),
            Verdict::Invalid(e) => Err(AssistantError::Validation(e)),
        }
    }
}

pub struct SqlValidator {
    security_patterns: Vec<Regex>,
    table_pattern: Regex,
    param_pattern: Regex,
    alias_pattern: Regex,
    identifier_pattern: Regex,
    opaque_pattern: Regex,
}

impl SqlValidator {
    pub fn new() -> Self {
        let denylist = [
            r"(?i);\s*DROP\s",
            r"(?i);\s*DELETE\s",
            r"(?i);\s*INSERT\s",
            r"(?i);\s*UPDATE\s",
            r"(?i);\s*MERGE\s",
            r"(?i);\s*ALTER\s",
            r"(?i);\s*TRUNCATE\s",
            r"--",
            r"/\*",
            r"(?i)UNION\s+(ALL\s+)?SELECT",
            // More than one statement.
            r";\s*\S",
        ];
        Self {
            security_patterns: denylist
                .iter()
                .map(|p| Regex::new(p).expect("denylist pattern must compile"))
                .collect(),
            table_pattern: Regex::new(r"(?i)\b(?:FROM|JOIN)\s+`?([A-Za-z0-9_.\-]+)`?")
                .expect("table pattern must compile"),
            param_pattern: Regex::new(r"@(\w+)").expect("param pattern must compile"),
            alias_pattern: Regex::new(r"(?i)\bAS\s+([A-Za-z_][A-Za-z0-9_]*)")
                .expect("alias pattern must compile"),
            identifier_pattern: Regex::new(
                r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*",
            )
            .expect("identifier pattern must compile"),
            // String literals and parameters carry no column references.
            opaque_pattern: Regex::new(r"'[^']*'|@\w+").expect("opaque pattern must compile"),
        }
    }

    /// Run all stages. All must pass; the first failing stage's description
    /// is returned.
    pub fn validate(
        &self,
        catalog: &SchemaCatalog,
        sql: &str,
        params: Option<&BTreeMap<String, ParamValue>>,
    ) -> Verdict {
        if let Some(pattern) = self.security_risk(sql) {
            warn!(%pattern, sql, "security pattern matched in generated SQL");
            return Verdict::Invalid(format!("security pattern matched: {}", pattern));
        }
        if let Verdict::Invalid(e) = self.check_structure(sql) {
            return Verdict::Invalid(e);
        }
        let tables = self.referenced_tables(sql);
        if let Verdict::Invalid(e) = self.check_tables(catalog, &tables) {
            return Verdict::Invalid(e);
        }
        if let Verdict::Invalid(e) = self.check_columns(catalog, sql, &tables) {
            return Verdict::Invalid(e);
        }
        if let Some(params) = params {
            if let Verdict::Invalid(e) = self.check_parameters(sql, params) {
                return Verdict::Invalid(e);
            }
        }
        Verdict::Valid
    }

    fn security_risk(&self, sql: &str) -> Option<String> {
        self.security_patterns
            .iter()
            .find(|p| p.is_match(sql))
            .map(|p| p.as_str().to_string())
    }

    /// Must begin with SELECT (leading whitespace tolerated) and contain a
    /// FROM clause.
    fn check_structure(&self, sql: &str) -> Verdict {
        let trimmed = sql.trim_start();
        if !trimmed.get(..6).map_or(false, |s| s.eq_ignore_ascii_case("select")) {
            return Verdict::Invalid("query must begin with SELECT".to_string());
        }
        let upper = sql.to_uppercase();
        if !upper.contains(" FROM ") && !upper.contains("\nFROM ") {
            return Verdict::Invalid("query has no FROM clause".to_string());
        }
        Verdict::Valid
    }

    /// Tables named after FROM/JOIN, qualified names reduced to their last
    /// path segment, order preserved.
    fn referenced_tables(&self, sql: &str) -> Vec<String> {
        self.table_pattern
            .captures_iter(sql)
            .map(|caps| {
                let reference = &caps[1];
                reference.rsplit('.').next().unwrap_or(reference).to_string()
            })
            .unique()
            .collect()
    }

    /// Every referenced table must exist in the catalog. All unknown tables
    /// are collected so the caller gets one actionable error.
    fn check_tables(&self, catalog: &SchemaCatalog, tables: &[String]) -> Verdict {
        let unknown: Vec<&str> = tables
            .iter()
            .filter(|t| !catalog.table_exists(t))
            .map(|t| t.as_str())
            .collect();
        if unknown.is_empty() {
            Verdict::Valid
        } else {
            Verdict::Invalid(format!("unknown tables: {}", unknown.iter().join(", ")))
        }
    }

    /// Every bare identifier used as a column must be declared by one of the
    /// referenced tables. Aliases introduced with AS, function names, SQL
    /// keywords, and the table names themselves are exempt. All unknown
    /// columns are collected into one error.
    fn check_columns(&self, catalog: &SchemaCatalog, sql: &str, tables: &[String]) -> Verdict {
        let declared: HashSet<&str> = tables
            .iter()
            .filter_map(|t| catalog.get_table_schema(t))
            .flat_map(|s| s.columns.iter().map(|c| c.name.as_str()))
            .collect();
        let aliases: HashSet<String> = self
            .alias_pattern
            .captures_iter(sql)
            .map(|caps| caps[1].to_lowercase())
            .collect();

        // Blank out literals, parameters, and the FROM/JOIN clauses so only
        // column positions remain.
        let stripped = self.opaque_pattern.replace_all(sql, " ");
        let stripped = self.table_pattern.replace_all(&stripped, " ");

        let mut unknown = Vec::new();
        for m in self.identifier_pattern.find_iter(&stripped) {
            let rest = stripped[m.end()..].trim_start();
            if rest.starts_with('(') {
                // Function call (SUM, COUNT, DATE, UNNEST, ...).
                continue;
            }
            let column = m.as_str().rsplit('.').next().unwrap_or(m.as_str());
            let lower = column.to_lowercase();
            if SQL_KEYWORDS.contains(&lower.as_str())
                || aliases.contains(&lower)
                || declared.contains(column)
                || tables.iter().any(|t| t == column)
            {
                continue;
            }
            if !unknown.iter().any(|u| u == column) {
                unknown.push(column.to_string());
            }
        }
        if unknown.is_empty() {
            Verdict::Valid
        } else {
            Verdict::Invalid(format!("unknown columns: {}", unknown.iter().join(", ")))
        }
    }

    /// Every `@name` referenced by the SQL must be present in the
    /// parameter map.
    fn check_parameters(&self, sql: &str, params: &BTreeMap<String, ParamValue>) -> Verdict {
        let missing: Vec<&str> = self
            .param_pattern
            .captures_iter(sql)
            .filter_map(|caps| {
                let name = caps.get(1).map(|m| m.as_str())?;
                (!params.contains_key(name)).then_some(name)
            })
            .unique()
            .collect();
        if missing.is_empty() {
            Verdict::Valid
        } else {
            Verdict::Invalid(format!("missing parameters: {}", missing.iter().join(", ")))
        }
    }
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::new()
    }
}
