//! In-memory key-value store
//!
//! Rows are kept ordered by primary key, so primary and index queries page
//! deterministically. Reads are immediately consistent. Expired rows stay
//! visible until [`InMemoryStore::reap_expired`] runs, like a background TTL
//! reaper would behave.

use super::{
    check_batch, ContinuationToken, Item, KvError, KvResult, KvStore, PrimaryKey, QueryPage,
    QueryRequest, WriteRequest,
};
use crate::schema::{TableAdmin, TableSchema};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tokio::sync::RwLock;
use tracing::debug;

/// Default number of items per query page
pub const DEFAULT_PAGE_SIZE: usize = 100;

struct MemTable {
    schema: TableSchema,
    rows: BTreeMap<PrimaryKey, Item>,
}

/// In-memory [`KvStore`] and [`TableAdmin`]
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, MemTable>>,
    page_size: usize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Store whose queries never return more than `page_size` items per page
    pub fn with_page_size(page_size: usize) -> Self {
        InMemoryStore {
            tables: RwLock::new(HashMap::new()),
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Delete rows whose TTL attribute is strictly before `now` (epoch seconds).
    /// Returns the number of rows removed.
    pub async fn reap_expired(&self, now: i64) -> usize {
        let mut tables = self.tables.write().await;
        let mut reaped = 0;
        for table in tables.values_mut() {
            let before = table.rows.len();
            let schema = &table.schema;
            table
                .rows
                .retain(|_, item| !matches!(schema.expiry_of(item), Some(at) if at < now));
            reaped += before - table.rows.len();
        }
        if reaped > 0 {
            debug!("Reaped {} expired rows", reaped);
        }
        reaped
    }
}

fn table<'a>(tables: &'a HashMap<String, MemTable>, name: &str) -> KvResult<&'a MemTable> {
    tables
        .get(name)
        .ok_or_else(|| KvError::TableNotFound(name.to_string()))
}

fn table_mut<'a>(tables: &'a mut HashMap<String, MemTable>, name: &str) -> KvResult<&'a mut MemTable> {
    tables
        .get_mut(name)
        .ok_or_else(|| KvError::TableNotFound(name.to_string()))
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, table_name: &str, key: &PrimaryKey) -> KvResult<Option<Item>> {
        let tables = self.tables.read().await;
        Ok(table(&tables, table_name)?.rows.get(key).cloned())
    }

    async fn query(&self, request: QueryRequest) -> KvResult<QueryPage> {
        let tables = self.tables.read().await;
        let table = table(&tables, &request.table)?;

        let after = match &request.start {
            Some(token) => Some(token.last_key()?),
            None => None,
        };
        let limit = request.limit.unwrap_or(self.page_size).clamp(1, self.page_size);

        let mut matching: Box<dyn Iterator<Item = (&PrimaryKey, &Item)> + '_> = match &request.index {
            None => {
                let lower = match &after {
                    Some(key) if key.partition == request.key => Bound::Excluded(key.clone()),
                    _ => Bound::Included(PrimaryKey::new(request.key.clone(), String::new())),
                };
                let partition = request.key.clone();
                Box::new(
                    table
                        .rows
                        .range((lower, Bound::Unbounded))
                        .take_while(move |(key, _)| key.partition == partition),
                )
            }
            Some(index_name) => {
                let index = table.schema.index(index_name).ok_or_else(|| KvError::IndexNotFound {
                    table: request.table.clone(),
                    index: index_name.clone(),
                })?;
                let lower = match &after {
                    Some(key) => Bound::Excluded(key.clone()),
                    None => Bound::Unbounded,
                };
                let wanted = request.key.clone();
                Box::new(
                    table
                        .rows
                        .range((lower, Bound::Unbounded))
                        .filter(move |(_, item)| index.key_of(item) == Some(wanted.as_str())),
                )
            }
        };

        let mut page = QueryPage::default();
        let mut last = None;
        for (key, item) in matching.by_ref().take(limit) {
            page.items.push(if request.keys_only {
                table.schema.project_keys(item)
            } else {
                item.clone()
            });
            last = Some(key);
        }
        if let (Some(last), Some(_)) = (last, matching.next()) {
            page.next = Some(ContinuationToken::after(last)?);
        }

        debug!(
            "Query {}{} = {} returned {} items (more: {})",
            request.table,
            request.index.as_deref().map(|i| format!(".{}", i)).unwrap_or_default(),
            request.key,
            page.items.len(),
            page.next.is_some()
        );
        Ok(page)
    }

    async fn put(&self, table_name: &str, item: Item) -> KvResult<()> {
        let mut tables = self.tables.write().await;
        let table = table_mut(&mut tables, table_name)?;
        let key = table.schema.key_of(&item)?;
        table.rows.insert(key, item);
        Ok(())
    }

    async fn delete(&self, table_name: &str, key: &PrimaryKey) -> KvResult<()> {
        let mut tables = self.tables.write().await;
        table_mut(&mut tables, table_name)?.rows.remove(key);
        Ok(())
    }

    async fn batch_write(&self, table_name: &str, requests: Vec<WriteRequest>) -> KvResult<()> {
        let mut tables = self.tables.write().await;
        let table = table_mut(&mut tables, table_name)?;
        let keys = check_batch(&requests, |r| table.schema.request_key(r))?;

        for (key, request) in keys.into_iter().zip(requests) {
            match request {
                WriteRequest::Put(item) => {
                    table.rows.insert(key, item);
                }
                WriteRequest::Delete(_) => {
                    table.rows.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn approximate_count(&self, table_name: &str) -> KvResult<u64> {
        let tables = self.tables.read().await;
        Ok(table(&tables, table_name)?.rows.len() as u64)
    }
}

#[async_trait]
impl TableAdmin for InMemoryStore {
    async fn create_table(&self, schema: &TableSchema) -> KvResult<()> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(&schema.name) {
            return Err(KvError::TableExists(schema.name.clone()));
        }
        tables.insert(
            schema.name.clone(),
            MemTable {
                schema: schema.clone(),
                rows: BTreeMap::new(),
            },
        );
        debug!("Created in-memory table {}", schema.name);
        Ok(())
    }

    async fn delete_table(&self, name: &str) -> KvResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| KvError::TableNotFound(name.to_string()))
    }

    async fn table_exists(&self, name: &str) -> KvResult<bool> {
        Ok(self.tables.read().await.contains_key(name))
    }
}
