//! Declarative table schemas and the provisioning routine
//!
//! Provisioning is decoupled from the edge store: callers pass an ordered
//! list of versioned [`SchemaDefinition`]s to a [`Provisioner`], which
//! creates them in order and tears them down in reverse order.

use crate::codec::{AK_ATTR, PK_ATTR, RK_ATTR, SK_ATTR, TTL_ATTR};
use crate::config::EdgeStoreConfig;
use crate::kv::{Item, KvError, KvResult, PrimaryKey, WriteRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Version tag of the canonical graph table definition
pub const EDGE_TABLE_VERSION: &str = "20250405000000_graph_based_on_gsi_table";

/// Secondary index keyed by a single string attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub key_attribute: String,
}

impl IndexSchema {
    pub fn new(name: impl Into<String>, key_attribute: impl Into<String>) -> Self {
        IndexSchema {
            name: name.into(),
            key_attribute: key_attribute.into(),
        }
    }

    /// Index key of `item`, or None when the item is not indexed (sparse index)
    pub fn key_of<'a>(&self, item: &'a Item) -> Option<&'a str> {
        item.get(&self.key_attribute).and_then(|v| v.as_str())
    }
}

/// A table keyed by a string partition key and a string sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub partition_key: String,
    pub sort_key: String,
    /// Attribute holding the absolute expiry (epoch seconds)
    pub ttl_attribute: Option<String>,
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    pub fn new(
        name: impl Into<String>,
        partition_key: impl Into<String>,
        sort_key: impl Into<String>,
    ) -> Self {
        TableSchema {
            name: name.into(),
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
            ttl_attribute: None,
            indexes: Vec::new(),
        }
    }

    pub fn with_ttl(mut self, attribute: impl Into<String>) -> Self {
        self.ttl_attribute = Some(attribute.into());
        self
    }

    pub fn with_index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Primary key of `item`
    pub fn key_of(&self, item: &Item) -> KvResult<PrimaryKey> {
        let attr = |name: &str| {
            item.get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| KvError::MissingKey(name.to_string()))
        };
        Ok(PrimaryKey::new(attr(&self.partition_key)?, attr(&self.sort_key)?))
    }

    /// Primary key targeted by a batch operation
    pub fn request_key(&self, request: &WriteRequest) -> KvResult<PrimaryKey> {
        match request {
            WriteRequest::Put(item) => self.key_of(item),
            WriteRequest::Delete(key) => Ok(key.clone()),
        }
    }

    /// Expiry of `item` if the table has a TTL attribute and the item carries it
    pub fn expiry_of(&self, item: &Item) -> Option<i64> {
        let attr = self.ttl_attribute.as_ref()?;
        item.get(attr).and_then(|v| v.as_i64())
    }

    /// Project an item onto its key attributes
    pub fn project_keys(&self, item: &Item) -> Item {
        item.iter()
            .filter(|(name, _)| **name == self.partition_key || **name == self.sort_key)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

/// Canonical edge table: `(pk, sk)` primary key, reverse and area indexes, TTL on `ttl`
pub fn edge_table_schema(config: &EdgeStoreConfig) -> TableSchema {
    TableSchema::new(&config.table_name, PK_ATTR, SK_ATTR)
        .with_ttl(TTL_ATTR)
        .with_index(IndexSchema::new(&config.reverse_index, RK_ATTR))
        .with_index(IndexSchema::new(&config.area_index, AK_ATTR))
}

/// Versioned schema definitions for the edge graph
pub fn edge_graph_definitions(config: &EdgeStoreConfig) -> Vec<SchemaDefinition> {
    vec![SchemaDefinition::new(EDGE_TABLE_VERSION, edge_table_schema(config))]
}

/// Table lifecycle operations offered by a backend
#[async_trait]
pub trait TableAdmin: Send + Sync {
    async fn create_table(&self, schema: &TableSchema) -> KvResult<()>;

    async fn delete_table(&self, name: &str) -> KvResult<()>;

    async fn table_exists(&self, name: &str) -> KvResult<bool>;
}

/// One versioned table definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub version: String,
    pub table: TableSchema,
}

impl SchemaDefinition {
    pub fn new(version: impl Into<String>, table: TableSchema) -> Self {
        SchemaDefinition {
            version: version.into(),
            table,
        }
    }
}

/// Provisioning errors
#[derive(Error, Debug)]
#[error("Schema {version} ({action}) failed: {source}")]
pub struct ProvisionError {
    pub version: String,
    pub action: &'static str,
    #[source]
    pub source: KvError,
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Applies an ordered list of schema definitions
#[derive(Debug, Clone)]
pub struct Provisioner {
    definitions: Vec<SchemaDefinition>,
}

impl Provisioner {
    pub fn new(definitions: Vec<SchemaDefinition>) -> Self {
        Provisioner { definitions }
    }

    pub fn definitions(&self) -> &[SchemaDefinition] {
        &self.definitions
    }

    /// Create every table in order; existing tables are left untouched.
    /// Returns the versions that were applied.
    pub async fn migrate<A: TableAdmin + ?Sized>(&self, admin: &A) -> ProvisionResult<Vec<String>> {
        let mut applied = Vec::new();
        for def in &self.definitions {
            let wrap = |source| ProvisionError {
                version: def.version.clone(),
                action: "migrate",
                source,
            };

            if admin.table_exists(&def.table.name).await.map_err(wrap)? {
                debug!("Schema {} already applied, skipping", def.version);
                continue;
            }
            admin.create_table(&def.table).await.map_err(wrap)?;
            info!("Applied schema {} (table {})", def.version, def.table.name);
            applied.push(def.version.clone());
        }
        Ok(applied)
    }

    /// Drop every table in reverse order; absent tables are skipped.
    /// Returns the versions that were reverted.
    pub async fn rollback<A: TableAdmin + ?Sized>(&self, admin: &A) -> ProvisionResult<Vec<String>> {
        let mut reverted = Vec::new();
        for def in self.definitions.iter().rev() {
            let wrap = |source| ProvisionError {
                version: def.version.clone(),
                action: "rollback",
                source,
            };

            if !admin.table_exists(&def.table.name).await.map_err(wrap)? {
                debug!("Schema {} not applied, skipping", def.version);
                continue;
            }
            admin.delete_table(&def.table.name).await.map_err(wrap)?;
            info!("Reverted schema {} (table {})", def.version, def.table.name);
            reverted.push(def.version.clone());
        }
        Ok(reverted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryStore;

    fn definitions() -> Vec<SchemaDefinition> {
        vec![
            SchemaDefinition::new("0001_first", TableSchema::new("first", "pk", "sk")),
            SchemaDefinition::new("0002_second", TableSchema::new("second", "pk", "sk")),
        ]
    }

    #[test]
    fn test_edge_table_schema() {
        let schema = edge_table_schema(&EdgeStoreConfig::default());
        assert_eq!(schema.name, "graph_based_on_gsi_tbl");
        assert_eq!(schema.ttl_attribute.as_deref(), Some(TTL_ATTR));
        assert_eq!(schema.index("rk-gsi").map(|i| i.key_attribute.as_str()), Some(RK_ATTR));
        assert_eq!(schema.index("ak-gsi").map(|i| i.key_attribute.as_str()), Some(AK_ATTR));
        assert!(schema.index("missing").is_none());
    }

    #[test]
    fn test_key_of_requires_both_attributes() {
        let schema = TableSchema::new("t", "pk", "sk");
        let mut item = Item::new();
        item.insert("pk".to_string(), "p".into());
        assert!(matches!(schema.key_of(&item), Err(KvError::MissingKey(attr)) if attr == "sk"));

        item.insert("sk".to_string(), "s".into());
        item.insert("other".to_string(), 1i64.into());
        assert_eq!(schema.key_of(&item).unwrap(), PrimaryKey::new("p", "s"));
        assert_eq!(schema.project_keys(&item).len(), 2);
    }

    #[tokio::test]
    async fn test_migrate_then_rollback() {
        let store = InMemoryStore::new();
        let provisioner = Provisioner::new(definitions());

        let applied = provisioner.migrate(&store).await.unwrap();
        assert_eq!(applied, vec!["0001_first", "0002_second"]);
        assert!(store.table_exists("first").await.unwrap());
        assert!(store.table_exists("second").await.unwrap());

        // Second run is a no-op
        assert!(provisioner.migrate(&store).await.unwrap().is_empty());

        let reverted = provisioner.rollback(&store).await.unwrap();
        assert_eq!(reverted, vec!["0002_second", "0001_first"]);
        assert!(!store.table_exists("first").await.unwrap());
        assert!(provisioner.rollback(&store).await.unwrap().is_empty());
    }
}
