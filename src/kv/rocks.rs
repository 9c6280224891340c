//! RocksDB-backed key-value store
//!
//! Layout:
//! - one column family per table (`t:<table>`), key = `pk \0 sk`,
//!   value = bincode-encoded [`Item`]
//! - one column family per secondary index (`i:<table>:<index>`),
//!   key = `index_key \0 pk \0 sk`, empty value
//! - table schemas persisted in the default column family under `schema:<table>`
//!
//! Index entries are written in the same `WriteBatch` as their row, so a
//! `batch_write` call is applied atomically. Writers hold `write_lock` from
//! reading the old rows until the batch is committed.

use super::{
    check_batch, ContinuationToken, Item, KvError, KvResult, KvStore, PrimaryKey, QueryPage,
    QueryRequest, WriteRequest,
};
use crate::schema::{TableAdmin, TableSchema};
use async_trait::async_trait;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch, DEFAULT_COLUMN_FAMILY_NAME,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

type Db = DBWithThreadMode<MultiThreaded>;

const SCHEMA_PREFIX: &str = "schema:";
const SEP: u8 = 0;
/// Default number of items per query page
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// RocksDB-based [`KvStore`] and [`TableAdmin`]
pub struct RocksStore {
    db: Db,
    schemas: RwLock<HashMap<String, TableSchema>>,
    write_lock: Mutex<()>,
    page_size: usize,
    path: PathBuf,
}

impl RocksStore {
    /// Open or create a store at `path`, restoring every provisioned table
    pub fn open(path: impl AsRef<Path>) -> KvResult<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening RocksDB edge store at: {:?}", path);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let cf_names = match Db::list_cf(&opts, &path) {
            Ok(names) => names,
            // Fresh directory
            Err(_) => vec![DEFAULT_COLUMN_FAMILY_NAME.to_string()],
        };
        let descriptors = cf_names
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Self::cf_options()));
        let db = Db::open_cf_descriptors(&opts, &path, descriptors)?;

        let mut schemas = HashMap::new();
        let iter = db.iterator(IteratorMode::From(SCHEMA_PREFIX.as_bytes(), Direction::Forward));
        for entry in iter {
            let (key, value) = entry?;
            if !key.starts_with(SCHEMA_PREFIX.as_bytes()) {
                break;
            }
            let schema: TableSchema = bincode::deserialize(&value)?;
            schemas.insert(schema.name.clone(), schema);
        }

        info!("RocksDB edge store opened with {} tables", schemas.len());

        Ok(RocksStore {
            db,
            schemas: RwLock::new(schemas),
            write_lock: Mutex::new(()),
            page_size: DEFAULT_PAGE_SIZE,
            path,
        })
    }

    /// Cap every query page at `page_size` items
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cf_options() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn table_cf_name(table: &str) -> String {
        format!("t:{}", table)
    }

    fn index_cf_name(table: &str, index: &str) -> String {
        format!("i:{}:{}", table, index)
    }

    fn schema_key(table: &str) -> String {
        format!("{}{}", SCHEMA_PREFIX, table)
    }

    fn schema(&self, table: &str) -> KvResult<TableSchema> {
        let schemas = self
            .schemas
            .read()
            .map_err(|_| KvError::Backend("schema lock poisoned".to_string()))?;
        schemas
            .get(table)
            .cloned()
            .ok_or_else(|| KvError::TableNotFound(table.to_string()))
    }

    fn lock_writes(&self) -> KvResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| KvError::Backend("write lock poisoned".to_string()))
    }

    fn cf(&self, name: &str) -> KvResult<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| KvError::Backend(format!("column family {} missing", name)))
    }

    fn check_part(part: &str) -> KvResult<&str> {
        if part.as_bytes().contains(&SEP) {
            return Err(KvError::InvalidKey(format!("{:?} contains a NUL byte", part)));
        }
        Ok(part)
    }

    fn row_key(key: &PrimaryKey) -> KvResult<Vec<u8>> {
        let mut raw = Vec::with_capacity(key.partition.len() + key.sort.len() + 1);
        raw.extend_from_slice(Self::check_part(&key.partition)?.as_bytes());
        raw.push(SEP);
        raw.extend_from_slice(Self::check_part(&key.sort)?.as_bytes());
        Ok(raw)
    }

    fn index_entry(index_key: &str, key: &PrimaryKey) -> KvResult<Vec<u8>> {
        let mut raw = Self::check_part(index_key)?.as_bytes().to_vec();
        raw.push(SEP);
        raw.extend_from_slice(&Self::row_key(key)?);
        Ok(raw)
    }

    fn parse_row_key(raw: &[u8]) -> KvResult<PrimaryKey> {
        let split = raw
            .iter()
            .position(|b| *b == SEP)
            .ok_or_else(|| KvError::InvalidKey("row key without separator".to_string()))?;
        let text = |bytes: &[u8]| {
            String::from_utf8(bytes.to_vec()).map_err(|e| KvError::InvalidKey(e.to_string()))
        };
        Ok(PrimaryKey::new(text(&raw[..split])?, text(&raw[split + 1..])?))
    }

    fn load(&self, table_cf: &Arc<BoundColumnFamily<'_>>, key: &PrimaryKey) -> KvResult<Option<Item>> {
        match self.db.get_cf(table_cf, Self::row_key(key)?)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Stage removal of a row and its index entries
    fn stage_delete(
        &self,
        batch: &mut WriteBatch,
        schema: &TableSchema,
        key: &PrimaryKey,
    ) -> KvResult<()> {
        let table_cf = self.cf(&Self::table_cf_name(&schema.name))?;
        if let Some(old) = self.load(&table_cf, key)? {
            for index in &schema.indexes {
                if let Some(index_key) = index.key_of(&old) {
                    let index_cf = self.cf(&Self::index_cf_name(&schema.name, &index.name))?;
                    batch.delete_cf(&index_cf, Self::index_entry(index_key, key)?);
                }
            }
        }
        batch.delete_cf(&table_cf, Self::row_key(key)?);
        Ok(())
    }

    /// Stage an overwrite of a row and the swap of its index entries
    fn stage_put(
        &self,
        batch: &mut WriteBatch,
        schema: &TableSchema,
        key: &PrimaryKey,
        item: &Item,
    ) -> KvResult<()> {
        self.stage_delete(batch, schema, key)?;
        let table_cf = self.cf(&Self::table_cf_name(&schema.name))?;
        for index in &schema.indexes {
            if let Some(index_key) = index.key_of(item) {
                let index_cf = self.cf(&Self::index_cf_name(&schema.name, &index.name))?;
                batch.put_cf(&index_cf, Self::index_entry(index_key, key)?, b"");
            }
        }
        batch.put_cf(&table_cf, Self::row_key(key)?, bincode::serialize(item)?);
        Ok(())
    }

    fn query_sync(&self, request: &QueryRequest) -> KvResult<QueryPage> {
        let schema = self.schema(&request.table)?;
        let after = match &request.start {
            Some(token) => Some(token.last_key()?),
            None => None,
        };
        let limit = request.limit.unwrap_or(self.page_size).clamp(1, self.page_size);
        let table_cf = self.cf(&Self::table_cf_name(&schema.name))?;

        let mut prefix = Self::check_part(&request.key)?.as_bytes().to_vec();
        prefix.push(SEP);

        let mut keys: Vec<PrimaryKey> = Vec::with_capacity(limit + 1);
        let mut rows: Vec<Item> = Vec::with_capacity(limit + 1);

        match &request.index {
            None => {
                let seek = match &after {
                    Some(key) => Self::row_key(key)?,
                    None => prefix.clone(),
                };
                for entry in self.db.iterator_cf(&table_cf, IteratorMode::From(&seek, Direction::Forward)) {
                    let (raw_key, value) = entry?;
                    if !raw_key.starts_with(&prefix) || rows.len() > limit {
                        break;
                    }
                    let key = Self::parse_row_key(&raw_key)?;
                    if after.as_ref() == Some(&key) {
                        continue;
                    }
                    keys.push(key);
                    rows.push(bincode::deserialize(&value)?);
                }
            }
            Some(index_name) => {
                let index = schema.index(index_name).ok_or_else(|| KvError::IndexNotFound {
                    table: request.table.clone(),
                    index: index_name.clone(),
                })?;
                let index_cf = self.cf(&Self::index_cf_name(&schema.name, &index.name))?;
                let seek = match &after {
                    Some(key) => Self::index_entry(&request.key, key)?,
                    None => prefix.clone(),
                };
                for entry in self.db.iterator_cf(&index_cf, IteratorMode::From(&seek, Direction::Forward)) {
                    let (raw_key, _) = entry?;
                    if !raw_key.starts_with(&prefix) || rows.len() > limit {
                        break;
                    }
                    let key = Self::parse_row_key(&raw_key[prefix.len()..])?;
                    if after.as_ref() == Some(&key) {
                        continue;
                    }
                    match self.load(&table_cf, &key)? {
                        Some(item) if index.key_of(&item) == Some(request.key.as_str()) => {
                            keys.push(key);
                            rows.push(item);
                        }
                        _ => debug!("Skipping stale index entry {} in {}", key, index.name),
                    }
                }
            }
        }

        let mut page = QueryPage::default();
        if rows.len() > limit {
            rows.truncate(limit);
            page.next = Some(ContinuationToken::after(&keys[limit - 1])?);
        }
        page.items = if request.keys_only {
            rows.iter().map(|item| schema.project_keys(item)).collect()
        } else {
            rows
        };
        Ok(page)
    }

    fn write_sync(&self, table: &str, requests: &[WriteRequest]) -> KvResult<()> {
        let schema = self.schema(table)?;
        let keys = check_batch(requests, |r| schema.request_key(r))?;

        let _guard = self.lock_writes()?;
        let mut batch = WriteBatch::default();
        for (key, request) in keys.iter().zip(requests) {
            match request {
                WriteRequest::Put(item) => self.stage_put(&mut batch, &schema, key, item)?,
                WriteRequest::Delete(_) => self.stage_delete(&mut batch, &schema, key)?,
            }
        }
        self.db.write(batch)?;
        debug!("Applied {} operations to {}", requests.len(), table);
        Ok(())
    }

    fn create_table_sync(&self, schema: &TableSchema) -> KvResult<()> {
        let mut schemas = self
            .schemas
            .write()
            .map_err(|_| KvError::Backend("schema lock poisoned".to_string()))?;
        if schemas.contains_key(&schema.name) {
            return Err(KvError::TableExists(schema.name.clone()));
        }

        self.db.create_cf(Self::table_cf_name(&schema.name), &Self::cf_options())?;
        for index in &schema.indexes {
            self.db
                .create_cf(Self::index_cf_name(&schema.name, &index.name), &Self::cf_options())?;
        }
        self.db.put(Self::schema_key(&schema.name), bincode::serialize(schema)?)?;
        schemas.insert(schema.name.clone(), schema.clone());

        info!("Created table {} with {} indexes", schema.name, schema.indexes.len());
        Ok(())
    }

    fn delete_table_sync(&self, name: &str) -> KvResult<()> {
        let mut schemas = self
            .schemas
            .write()
            .map_err(|_| KvError::Backend("schema lock poisoned".to_string()))?;
        let schema = schemas
            .get(name)
            .ok_or_else(|| KvError::TableNotFound(name.to_string()))?;

        // Column families already dropped stay dropped; the rest is retried on the next call
        for index in &schema.indexes {
            let cf_name = Self::index_cf_name(name, &index.name);
            if self.db.cf_handle(&cf_name).is_some() {
                self.db.drop_cf(&cf_name)?;
            }
        }
        let table_cf = Self::table_cf_name(name);
        if self.db.cf_handle(&table_cf).is_some() {
            self.db.drop_cf(&table_cf)?;
        }
        self.db.delete(Self::schema_key(name))?;
        schemas.remove(name);

        info!("Dropped table {}", name);
        Ok(())
    }

    /// Delete rows whose TTL attribute is strictly before `now` (epoch seconds).
    /// Returns the number of rows removed.
    pub fn reap_expired(&self, now: i64) -> KvResult<usize> {
        let schemas: Vec<TableSchema> = self
            .schemas
            .read()
            .map_err(|_| KvError::Backend("schema lock poisoned".to_string()))?
            .values()
            .cloned()
            .collect();

        let _guard = self.lock_writes()?;
        let mut reaped = 0;
        for schema in schemas.iter().filter(|s| s.ttl_attribute.is_some()) {
            let table_cf = self.cf(&Self::table_cf_name(&schema.name))?;
            let mut batch = WriteBatch::default();
            let mut count = 0;
            for entry in self.db.iterator_cf(&table_cf, IteratorMode::Start) {
                let (raw_key, value) = entry?;
                let item: Item = bincode::deserialize(&value)?;
                if matches!(schema.expiry_of(&item), Some(at) if at < now) {
                    self.stage_delete(&mut batch, schema, &Self::parse_row_key(&raw_key)?)?;
                    count += 1;
                }
            }
            if count > 0 {
                self.db.write(batch)?;
                debug!("Reaped {} expired rows from {}", count, schema.name);
            }
            reaped += count;
        }
        Ok(reaped)
    }

    /// Flush all column families to disk
    pub fn flush(&self) -> KvResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for RocksStore {
    async fn get(&self, table: &str, key: &PrimaryKey) -> KvResult<Option<Item>> {
        let schema = self.schema(table)?;
        let table_cf = self.cf(&Self::table_cf_name(&schema.name))?;
        self.load(&table_cf, key)
    }

    async fn query(&self, request: QueryRequest) -> KvResult<QueryPage> {
        self.query_sync(&request)
    }

    async fn put(&self, table: &str, item: Item) -> KvResult<()> {
        self.write_sync(table, &[WriteRequest::Put(item)])
    }

    async fn delete(&self, table: &str, key: &PrimaryKey) -> KvResult<()> {
        self.write_sync(table, &[WriteRequest::Delete(key.clone())])
    }

    async fn batch_write(&self, table: &str, requests: Vec<WriteRequest>) -> KvResult<()> {
        self.write_sync(table, &requests)
    }

    async fn approximate_count(&self, table: &str) -> KvResult<u64> {
        let schema = self.schema(table)?;
        let table_cf = self.cf(&Self::table_cf_name(&schema.name))?;
        Ok(self
            .db
            .property_int_value_cf(&table_cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0))
    }
}

#[async_trait]
impl TableAdmin for RocksStore {
    async fn create_table(&self, schema: &TableSchema) -> KvResult<()> {
        self.create_table_sync(schema)
    }

    async fn delete_table(&self, name: &str) -> KvResult<()> {
        self.delete_table_sync(name)
    }

    async fn table_exists(&self, name: &str) -> KvResult<bool> {
        Ok(self.schema(name).is_ok())
    }
}
