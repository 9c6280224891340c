//! Key-value store capability
//!
//! The edge store only needs a narrow slice of a key-value store:
//! - get/put/delete by primary key
//! - equality query on the primary partition key or a named secondary index,
//!   returned in bounded pages with continuation tokens
//! - batched put/delete with a fixed maximum operation count per call
//! - an approximate item count
//!
//! Two backends implement [`KvStore`]: [`memory::InMemoryStore`] and
//! [`rocks::RocksStore`].

pub mod memory;
pub mod rocks;

pub use memory::InMemoryStore;
pub use rocks::RocksStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Hard limit on operations per `batch_write` call
pub const MAX_BATCH_WRITE: usize = 25;

/// Key-value store errors
#[derive(Error, Debug)]
pub enum KvError {
    /// Table was never provisioned
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Table was already provisioned
    #[error("Table already exists: {0}")]
    TableExists(String),

    /// Secondary index is not defined on the table
    #[error("Index {index} not found on table {table}")]
    IndexNotFound { table: String, index: String },

    /// Item lacks one of the primary key attributes
    #[error("Item is missing key attribute: {0}")]
    MissingKey(String),

    /// Key contains bytes the backend cannot store
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Batch exceeds [`MAX_BATCH_WRITE`]
    #[error("Batch of {size} operations exceeds limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    /// The same primary key appears twice in one batch
    #[error("Batch contains duplicate key {0}")]
    DuplicateKey(PrimaryKey),

    /// Continuation token could not be parsed
    #[error("Invalid continuation token: {0}")]
    InvalidToken(String),

    /// RocksDB error
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Any other backend failure (network, throughput, injected faults)
    #[error("Backend error: {0}")]
    Backend(String),
}

pub type KvResult<T> = Result<T, KvError>;

/// A single attribute value of a stored item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Str(String),
    Num(f64),
    Int(i64),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Num(n) => Some(*n),
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Str(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Str(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Str(s.to_string())
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Num(n)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Int(i)
    }
}

/// A stored row: attribute name to value
pub type Item = BTreeMap<String, AttributeValue>;

/// Full primary key of a row (partition key + sort key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub partition: String,
    pub sort: String,
}

impl PrimaryKey {
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        PrimaryKey {
            partition: partition.into(),
            sort: sort.into(),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.partition, self.sort)
    }
}

/// Opaque cursor marking where the next page of a query resumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    /// Build a token resuming strictly after `key`
    pub fn after(key: &PrimaryKey) -> KvResult<Self> {
        serde_json::to_string(key)
            .map(ContinuationToken)
            .map_err(|e| KvError::InvalidToken(e.to_string()))
    }

    /// Recover the last key returned by the previous page
    pub fn last_key(&self) -> KvResult<PrimaryKey> {
        serde_json::from_str(&self.0).map_err(|e| KvError::InvalidToken(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ContinuationToken {
    fn from(raw: String) -> Self {
        ContinuationToken(raw)
    }
}

/// Equality query on the primary partition key or on a secondary index
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub table: String,
    /// `None` queries the primary partition key
    pub index: Option<String>,
    /// Value the key attribute must equal
    pub key: String,
    pub start: Option<ContinuationToken>,
    /// Upper bound on the page size; the backend may return fewer items
    pub limit: Option<usize>,
    /// Project only the primary key attributes
    pub keys_only: bool,
}

impl QueryRequest {
    /// Query rows whose partition key equals `key`
    pub fn primary(table: impl Into<String>, key: impl Into<String>) -> Self {
        QueryRequest {
            table: table.into(),
            index: None,
            key: key.into(),
            start: None,
            limit: None,
            keys_only: false,
        }
    }

    /// Query rows whose `index` key attribute equals `key`
    pub fn on_index(table: impl Into<String>, index: impl Into<String>, key: impl Into<String>) -> Self {
        QueryRequest {
            index: Some(index.into()),
            ..QueryRequest::primary(table, key)
        }
    }

    pub fn with_start(mut self, start: Option<ContinuationToken>) -> Self {
        self.start = start;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }
}

/// One page of query results
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub items: Vec<Item>,
    /// Present when more results remain
    pub next: Option<ContinuationToken>,
}

/// A single operation of a batched write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    /// Insert or overwrite an item
    Put(Item),
    /// Delete by primary key; deleting an absent key succeeds
    Delete(PrimaryKey),
}

/// Capability set the edge store needs from its backing store
///
/// Implementations must be safe for concurrent use. Secondary index reads
/// may be eventually consistent with respect to recent writes.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get an item by its full primary key
    async fn get(&self, table: &str, key: &PrimaryKey) -> KvResult<Option<Item>>;

    /// Run one page of an equality query
    async fn query(&self, request: QueryRequest) -> KvResult<QueryPage>;

    /// Insert or overwrite an item
    async fn put(&self, table: &str, item: Item) -> KvResult<()>;

    /// Delete an item by its primary key
    async fn delete(&self, table: &str, key: &PrimaryKey) -> KvResult<()>;

    /// Apply up to [`MAX_BATCH_WRITE`] puts/deletes in one call
    async fn batch_write(&self, table: &str, requests: Vec<WriteRequest>) -> KvResult<()>;

    /// Approximate number of items in the table; may lag recent writes
    async fn approximate_count(&self, table: &str) -> KvResult<u64>;
}

/// Reject batches the store would refuse before touching any row
pub(crate) fn check_batch(
    requests: &[WriteRequest],
    key_of: impl Fn(&WriteRequest) -> KvResult<PrimaryKey>,
) -> KvResult<Vec<PrimaryKey>> {
    if requests.len() > MAX_BATCH_WRITE {
        return Err(KvError::BatchTooLarge {
            size: requests.len(),
            limit: MAX_BATCH_WRITE,
        });
    }

    let mut keys = Vec::with_capacity(requests.len());
    for request in requests {
        let key = key_of(request)?;
        if keys.contains(&key) {
            return Err(KvError::DuplicateKey(key));
        }
        keys.push(key);
    }
    Ok(keys)
}
