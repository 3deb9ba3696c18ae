//! Schema registry: loads table documents into an immutable catalog and
//! answers lookups over it.
//!
//! The catalog is replaced wholesale on (re)load. Readers take an `Arc`
//! snapshot, so a reload never exposes a half-updated catalog.

use crate::error::{AssistantError, Result};
use crate::schema::{ColumnType, QueryTemplate, Relationship, TableSchema};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// One step of a join path between two tables.
#[derive(Debug, Clone)]
pub struct JoinEdge {
    pub from_table: String,
    pub to_table: String,
    pub local_key: String,
    pub foreign_key: String,
}

/// Business glossary entry for a column.
#[derive(Debug, Clone)]
pub struct GlossaryEntry {
    pub business_term: String,
    pub table: String,
    pub column: String,
}

/// Immutable snapshot of all loaded schemas plus lookup indexes.
#[derive(Debug)]
pub struct SchemaCatalog {
    tables: HashMap<String, TableSchema>,
    templates_by_name: HashMap<String, (String, QueryTemplate)>,
    tables_by_platform: HashMap<String, Vec<String>>,
    glossary: HashMap<String, GlossaryEntry>,
}

impl SchemaCatalog {
    /// Load every YAML document under `dir`. Layout is one subdirectory
    /// per platform plus `consolidated/`; the directory name becomes the
    /// owning platform. Any malformed document fails the whole load.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut tables = HashMap::new();

        let entries = std::fs::read_dir(dir).map_err(|e| {
            AssistantError::SchemaLoad(format!("cannot read {}: {}", dir.display(), e))
        })?;

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let platform = entry.file_name().to_string_lossy().to_string();
            for file in std::fs::read_dir(entry.path())? {
                let path = file?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                    continue;
                }
                let schema = Self::load_document(&path, &platform)?;
                debug!(table = %schema.table_name, platform = %platform, "loaded schema");
                if tables.insert(schema.table_name.clone(), schema).is_some() {
                    return Err(AssistantError::SchemaLoad(format!(
                        "duplicate table declaration in {}",
                        path.display()
                    )));
                }
            }
        }

        if tables.is_empty() {
            return Err(AssistantError::SchemaLoad(format!(
                "no schema documents found under {}",
                dir.display()
            )));
        }

        let catalog = Self::build(tables)?;
        info!(
            tables = catalog.tables.len(),
            templates = catalog.templates_by_name.len(),
            platforms = catalog.tables_by_platform.len(),
            "schema catalog loaded"
        );
        Ok(catalog)
    }

    fn load_document(path: &Path, platform: &str) -> Result<TableSchema> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AssistantError::SchemaLoad(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut schema: TableSchema = serde_yaml::from_str(&content).map_err(|e| {
            AssistantError::SchemaLoad(format!("invalid document {}: {}", path.display(), e))
        })?;
        if schema.table_name.trim().is_empty() {
            return Err(AssistantError::SchemaLoad(format!(
                "empty table_name in {}",
                path.display()
            )));
        }
        if schema.columns.is_empty() {
            return Err(AssistantError::SchemaLoad(format!(
                "table '{}' declares no columns ({})",
                schema.table_name,
                path.display()
            )));
        }
        schema.platform = platform.to_string();
        Ok(schema)
    }

    /// Build indexes and run cross-table validation. Relationship keys
    /// must name real columns on both ends.
    pub fn build(tables: HashMap<String, TableSchema>) -> Result<Self> {
        for schema in tables.values() {
            for rel in &schema.relationships {
                if schema.column(&rel.local_key).is_none() {
                    return Err(AssistantError::SchemaLoad(format!(
                        "relationship {} -> {}: local key '{}' is not a column of {}",
                        schema.table_name, rel.table, rel.local_key, schema.table_name
                    )));
                }
                if let Some(target) = tables.get(&rel.table) {
                    if target.column(&rel.foreign_key).is_none() {
                        return Err(AssistantError::SchemaLoad(format!(
                            "relationship {} -> {}: foreign key '{}' is not a column of {}",
                            schema.table_name, rel.table, rel.foreign_key, rel.table
                        )));
                    }
                }
            }
        }

        let mut templates_by_name = HashMap::new();
        let mut tables_by_platform: HashMap<String, Vec<String>> = HashMap::new();
        let mut glossary = HashMap::new();

        for schema in tables.values() {
            for template in &schema.query_templates {
                templates_by_name.insert(
                    template.name.clone(),
                    (schema.table_name.clone(), template.clone()),
                );
            }
            tables_by_platform
                .entry(schema.platform.clone())
                .or_default()
                .push(schema.table_name.clone());
            for column in &schema.columns {
                if let Some(term) = &column.business_term {
                    glossary.insert(
                        term.to_lowercase(),
                        GlossaryEntry {
                            business_term: term.clone(),
                            table: schema.table_name.clone(),
                            column: column.name.clone(),
                        },
                    );
                }
            }
        }
        for names in tables_by_platform.values_mut() {
            names.sort();
        }

        Ok(Self {
            tables,
            templates_by_name,
            tables_by_platform,
            glossary,
        })
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn get_table_schema(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn get_column_type(&self, table: &str, column: &str) -> Option<ColumnType> {
        self.tables
            .get(table)
            .and_then(|t| t.column(column))
            .map(|c| c.column_type)
    }

    pub fn get_relationships(&self, table: &str) -> &[Relationship] {
        self.tables
            .get(table)
            .map(|t| t.relationships.as_slice())
            .unwrap_or(&[])
    }

    /// Look up a template by its declared name.
    pub fn get_query_template(&self, name: &str) -> Option<&(String, QueryTemplate)> {
        self.templates_by_name.get(name)
    }

    /// Find the template a (table, query_type) pair should use.
    pub fn find_template(&self, table: &str, query_type: &str) -> Option<&QueryTemplate> {
        self.tables
            .get(table)?
            .query_templates
            .iter()
            .find(|t| t.query_type == query_type)
    }

    pub fn get_platform_tables(&self, platform: &str) -> &[String] {
        self.tables_by_platform
            .get(platform)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All platforms in the catalog, `consolidated` excluded.
    pub fn platforms(&self) -> HashSet<String> {
        self.tables_by_platform
            .keys()
            .filter(|p| *p != "consolidated")
            .cloned()
            .collect()
    }

    /// Tables whose documents declare support for `query_type`, either via
    /// the `query_types` list or a matching template.
    pub fn tables_for_query_type(&self, query_type: &str) -> Vec<&TableSchema> {
        let mut found: Vec<&TableSchema> = self
            .tables
            .values()
            .filter(|t| {
                t.query_types.iter().any(|q| q == query_type)
                    || t.query_templates.iter().any(|q| q.query_type == query_type)
            })
            .collect();
        found.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        found
    }

    pub fn get_business_term(&self, term: &str) -> Option<&GlossaryEntry> {
        self.glossary.get(&term.to_lowercase())
    }

    /// Shortest join path between two tables over declared relationships,
    /// as a list of edges. BFS with a visited set, so relationship cycles
    /// cannot loop.
    pub fn join_path(&self, from: &str, to: &str) -> Option<Vec<JoinEdge>> {
        if from == to {
            return Some(Vec::new());
        }
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut parent: HashMap<String, JoinEdge> = HashMap::new();
        visited.insert(from.to_string());
        queue.push_back(from.to_string());

        while let Some(current) = queue.pop_front() {
            for rel in self.get_relationships(&current) {
                let next = rel.table.clone();
                if !self.tables.contains_key(&next) || !visited.insert(next.clone()) {
                    continue;
                }
                parent.insert(
                    next.clone(),
                    JoinEdge {
                        from_table: current.clone(),
                        to_table: next.clone(),
                        local_key: rel.local_key.clone(),
                        foreign_key: rel.foreign_key.clone(),
                    },
                );
                if next == to {
                    let mut path = Vec::new();
                    let mut node = to.to_string();
                    while node != from {
                        let edge = parent.remove(&node)?;
                        node = edge.from_table.clone();
                        path.push(edge);
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }
}

/// Shared handle over the current catalog snapshot.
#[derive(Clone)]
pub struct SchemaRegistry {
    catalog: Arc<RwLock<Option<Arc<SchemaCatalog>>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(RwLock::new(None)),
        }
    }

    /// Load the catalog from `dir`. The whole load either succeeds or the
    /// previous snapshot (if any) stays in place untouched.
    pub fn initialize(&self, dir: impl AsRef<Path>) -> Result<()> {
        let catalog = SchemaCatalog::load(dir)?;
        *self.catalog.write().expect("registry lock poisoned") = Some(Arc::new(catalog));
        Ok(())
    }

    /// Install a pre-built catalog. Used by tests and by refresh tasks
    /// that assemble the catalog out of band.
    pub fn install(&self, catalog: SchemaCatalog) {
        *self.catalog.write().expect("registry lock poisoned") = Some(Arc::new(catalog));
    }

    /// Periodic refresh: same as `initialize`, readers keep their old
    /// snapshot until the swap.
    pub fn reload(&self, dir: impl AsRef<Path>) -> Result<()> {
        self.initialize(dir)
    }

    pub fn is_initialized(&self) -> bool {
        self.catalog.read().expect("registry lock poisoned").is_some()
    }

    /// Current catalog snapshot. Errors if `initialize` has not run.
    pub fn snapshot(&self) -> Result<Arc<SchemaCatalog>> {
        self.catalog
            .read()
            .expect("registry lock poisoned")
            .clone()
            .ok_or_else(|| AssistantError::SchemaLoad("registry not initialized".to_string()))
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Cardinality, ColumnDefinition, Keys};

    fn column(name: &str, column_type: ColumnType) -> ColumnDefinition {
        ColumnDefinition {
            name: name.to_string(),
            column_type,
            required: false,
            description: None,
            business_term: None,
            values: Vec::new(),
            platform_fields: HashMap::new(),
            aggregation_rules: Vec::new(),
        }
    }

    fn table(name: &str, platform: &str, columns: Vec<ColumnDefinition>) -> TableSchema {
        TableSchema {
            table_name: name.to_string(),
            platform: platform.to_string(),
            columns,
            keys: Keys::default(),
            relationships: Vec::new(),
            business_rules: Vec::new(),
            common_metrics: Vec::new(),
            query_templates: Vec::new(),
            query_types: Vec::new(),
            update_frequency: None,
        }
    }

    fn catalog_of(tables: Vec<TableSchema>) -> Result<SchemaCatalog> {
        SchemaCatalog::build(
            tables
                .into_iter()
                .map(|t| (t.table_name.clone(), t))
                .collect(),
        )
    }

    #[test]
    fn rejects_relationship_with_unknown_local_key() {
        let mut orders = table(
            "shopify_orders",
            "shopify",
            vec![column("order_id", ColumnType::String)],
        );
        orders.relationships.push(Relationship {
            table: "shopify_customers".to_string(),
            cardinality: Cardinality::ManyToOne,
            local_key: "customer_id".to_string(),
            foreign_key: "customer_id".to_string(),
            description: None,
        });
        let customers = table(
            "shopify_customers",
            "shopify",
            vec![column("customer_id", ColumnType::String)],
        );
        let err = catalog_of(vec![orders, customers]).unwrap_err();
        assert!(err.to_string().contains("local key"));
    }

    #[test]
    fn join_path_walks_relationships() {
        let mut orders = table(
            "shopify_orders",
            "shopify",
            vec![
                column("order_id", ColumnType::String),
                column("customer_id", ColumnType::String),
            ],
        );
        orders.relationships.push(Relationship {
            table: "shopify_customers".to_string(),
            cardinality: Cardinality::ManyToOne,
            local_key: "customer_id".to_string(),
            foreign_key: "customer_id".to_string(),
            description: None,
        });
        let customers = table(
            "shopify_customers",
            "shopify",
            vec![column("customer_id", ColumnType::String)],
        );
        let catalog = catalog_of(vec![orders, customers]).unwrap();
        let path = catalog
            .join_path("shopify_orders", "shopify_customers")
            .unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].local_key, "customer_id");
        assert!(catalog.join_path("shopify_customers", "shopify_orders").is_none());
    }

    #[test]
    fn loads_shipped_documents_and_answers_lookups() {
        let dir = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("schemas");
        let catalog = SchemaCatalog::load(dir).unwrap();

        assert!(catalog.table_exists("shopify_orders"));
        assert!(!catalog.table_exists("shopify_orders; DROP TABLE users"));
        assert_eq!(
            catalog.get_column_type("shopify_orders", "total_amount"),
            Some(ColumnType::Decimal)
        );
        assert_eq!(catalog.get_column_type("shopify_orders", "nope"), None);

        let (table, template) = catalog.get_query_template("consolidated_sales_total").unwrap();
        assert_eq!(table.as_str(), "consolidated_orders");
        assert_eq!(template.query_type, "sales");

        assert!(catalog
            .get_platform_tables("shopify")
            .contains(&"shopify_products".to_string()));
        let platforms = catalog.platforms();
        assert!(platforms.contains("amazon") && !platforms.contains("consolidated"));

        let glossary = catalog.get_business_term("order total").unwrap();
        assert_eq!(glossary.business_term, "Order Total");

        let sales_tables: Vec<&str> = catalog
            .tables_for_query_type("sales")
            .iter()
            .map(|t| t.table_name.as_str())
            .collect();
        assert!(sales_tables.contains(&"shopify_orders"));
        assert!(sales_tables.contains(&"consolidated_orders"));
    }

    #[test]
    fn snapshot_requires_initialization() {
        let registry = SchemaRegistry::new();
        assert!(!registry.is_initialized());
        assert!(registry.snapshot().is_err());
    }
}
