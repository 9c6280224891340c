//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use edgegraph::schema::edge_graph_definitions;
use edgegraph::{
    EdgeStore, EdgeStoreConfig, InMemoryStore, Item, KvError, KvResult, KvStore, ManualClock,
    PrimaryKey, Provisioner, QueryPage, QueryRequest, WriteRequest,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const NOW: i64 = 1_700_000_000;

/// In-memory store that counts calls and can reject chosen batch writes
pub struct FlakyStore {
    inner: InMemoryStore,
    calls: AtomicUsize,
    batch_calls: AtomicUsize,
    query_calls: AtomicUsize,
    failing_queries_from: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    failing_batches: Mutex<HashSet<usize>>,
    fail_all_batches: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        FlakyStore {
            inner: InMemoryStore::new(),
            calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            failing_queries_from: AtomicUsize::new(usize::MAX),
            batch_sizes: Mutex::new(Vec::new()),
            failing_batches: Mutex::new(HashSet::new()),
            fail_all_batches: AtomicBool::new(false),
        }
    }

    /// Reject the batch writes with these call indexes (0-based)
    pub fn fail_batches(&self, indexes: impl IntoIterator<Item = usize>) {
        self.failing_batches.lock().unwrap().extend(indexes);
    }

    /// Reject every query from the given call index (0-based) on
    pub fn fail_queries_from(&self, index: usize) {
        self.failing_queries_from.store(index, Ordering::SeqCst);
    }

    pub fn fail_all_batches(&self) {
        self.fail_all_batches.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvStore for FlakyStore {
    async fn get(&self, table: &str, key: &PrimaryKey) -> KvResult<Option<Item>> {
        self.hit();
        self.inner.get(table, key).await
    }

    async fn query(&self, request: QueryRequest) -> KvResult<QueryPage> {
        self.hit();
        let index = self.query_calls.fetch_add(1, Ordering::SeqCst);
        if index >= self.failing_queries_from.load(Ordering::SeqCst) {
            return Err(KvError::Backend(format!("injected failure on query {}", index)));
        }
        self.inner.query(request).await
    }

    async fn put(&self, table: &str, item: Item) -> KvResult<()> {
        self.hit();
        self.inner.put(table, item).await
    }

    async fn delete(&self, table: &str, key: &PrimaryKey) -> KvResult<()> {
        self.hit();
        self.inner.delete(table, key).await
    }

    async fn batch_write(&self, table: &str, requests: Vec<WriteRequest>) -> KvResult<()> {
        self.hit();
        let index = self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(requests.len());

        let failing = self.fail_all_batches.load(Ordering::SeqCst)
            || self.failing_batches.lock().unwrap().contains(&index);
        if failing {
            return Err(KvError::Backend(format!("injected failure on batch {}", index)));
        }
        self.inner.batch_write(table, requests).await
    }

    async fn approximate_count(&self, table: &str) -> KvResult<u64> {
        self.hit();
        self.inner.approximate_count(table).await
    }
}

/// Provisioned in-memory edge store on a manual clock
pub async fn memory_store() -> EdgeStore<InMemoryStore> {
    memory_store_with(EdgeStoreConfig::default()).await
}

pub async fn memory_store_with(config: EdgeStoreConfig) -> EdgeStore<InMemoryStore> {
    let kv = Arc::new(InMemoryStore::new());
    Provisioner::new(edge_graph_definitions(&config))
        .migrate(&*kv)
        .await
        .unwrap();
    EdgeStore::new(kv, config).with_clock(Arc::new(ManualClock::new(NOW)))
}

/// Provisioned flaky edge store on a manual clock
pub async fn flaky_store() -> EdgeStore<FlakyStore> {
    flaky_store_with(EdgeStoreConfig::default()).await
}

pub async fn flaky_store_with(config: EdgeStoreConfig) -> EdgeStore<FlakyStore> {
    let kv = Arc::new(FlakyStore::new());
    Provisioner::new(edge_graph_definitions(&config))
        .migrate(kv.inner())
        .await
        .unwrap();
    EdgeStore::new(kv, config).with_clock(Arc::new(ManualClock::new(NOW)))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
