//! Edge store
//!
//! Persists the graph in a single table with two secondary indexes:
//!
//! - out-edges of N: partition key `NODE#N`
//! - in-edges of N: reverse index key `EDGE#N`
//! - edges of area A: area index key `AREA#A`
//!
//! The store keeps no state between calls. Pages and batch chunks are
//! processed strictly one after another; a dropped future leaves already
//! applied chunks in place.

mod batch;
pub mod clock;
mod reader;

pub use clock::{Clock, ManualClock, SystemClock};

use crate::codec::{self, edge_key, edge_to_item, expiry_of, item_key, item_to_stored_edge};
use crate::config::EdgeStoreConfig;
use crate::error::{BatchError, EdgeStoreError, EdgeStoreResult};
use crate::graph::{Area, Edge, Node};
use crate::kv::{ContinuationToken, KvStore, QueryRequest, WriteRequest};
use async_trait::async_trait;
use batch::{dedupe, BatchWriter};
use std::sync::Arc;
use tracing::{debug, warn};

/// Graph persistence on top of a [`KvStore`]
pub struct EdgeStore<S: KvStore + ?Sized> {
    client: Arc<S>,
    config: EdgeStoreConfig,
    clock: Arc<dyn Clock>,
}

impl<S: KvStore + ?Sized> Clone for EdgeStore<S> {
    fn clone(&self) -> Self {
        EdgeStore {
            client: Arc::clone(&self.client),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: KvStore + ?Sized> EdgeStore<S> {
    pub fn new(client: Arc<S>, config: EdgeStoreConfig) -> Self {
        EdgeStore {
            client,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for expiry stamping and remaining-TTL reporting
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EdgeStoreConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<S> {
        &self.client
    }

    fn writer(&self) -> BatchWriter<'_, S> {
        BatchWriter::new(&*self.client, &self.config.table_name, self.config.chunk_size())
    }

    /// Insert or overwrite edges.
    ///
    /// Every edge gets `now + ttl` as its absolute expiry, with `now` read
    /// once per call. Edges sharing a `(from, to)` pair collapse to the last
    /// one in `edges`.
    pub async fn upsert_edges(&self, edges: &[Edge]) -> EdgeStoreResult<()> {
        if edges.is_empty() {
            return Ok(());
        }

        let now = self.clock.now();
        let requests = dedupe(edges.iter().map(|edge| {
            (
                edge_key(&edge.from, &edge.to),
                WriteRequest::Put(edge_to_item(edge, expiry_of(edge, now))),
            )
        }));
        debug!(
            "Upserting {} edges ({} after dedup) into {}",
            edges.len(),
            requests.len(),
            self.config.table_name
        );

        self.writer().submit("upsert edges", requests).await?;
        Ok(())
    }

    /// Point read of the `(from, to)` edge
    pub async fn get_edge(&self, from: &Node, to: &Node) -> EdgeStoreResult<Option<Edge>> {
        let key = edge_key(from, to);
        let item = self
            .client
            .get(&self.config.table_name, &key)
            .await
            .map_err(|e| EdgeStoreError::store("get", key.to_string(), e))?;

        match item {
            Some(item) => Ok(Some(item_to_stored_edge(&item)?.into_edge(self.clock.now()))),
            None => Ok(None),
        }
    }

    /// Edges leaving `node`
    pub async fn read_out_edges(&self, node: &Node) -> EdgeStoreResult<Vec<Edge>> {
        let request = QueryRequest::primary(&self.config.table_name, codec::encode_primary(node))
            .with_limit(self.config.page_size);
        reader::drain(&*self.client, request, self.clock.now()).await
    }

    /// Edges arriving at `node` (reverse index, eventually consistent)
    pub async fn read_in_edges(&self, node: &Node) -> EdgeStoreResult<Vec<Edge>> {
        let request = QueryRequest::on_index(
            &self.config.table_name,
            &self.config.reverse_index,
            codec::encode_reverse(node),
        )
        .with_limit(self.config.page_size);
        reader::drain(&*self.client, request, self.clock.now()).await
    }

    /// Edges tagged with `area` (area index, eventually consistent)
    pub async fn read_area_edges(&self, area: &Area) -> EdgeStoreResult<Vec<Edge>> {
        let request = QueryRequest::on_index(
            &self.config.table_name,
            &self.config.area_index,
            codec::encode_area(area),
        )
        .with_limit(self.config.page_size);
        reader::drain(&*self.client, request, self.clock.now()).await
    }

    /// Delete edges by `(from, to)`; score, area and TTL are ignored
    pub async fn remove_edges(&self, edges: &[Edge]) -> EdgeStoreResult<()> {
        if edges.is_empty() {
            return Ok(());
        }

        let requests = dedupe(edges.iter().map(|edge| {
            let key = edge_key(&edge.from, &edge.to);
            (key.clone(), WriteRequest::Delete(key))
        }));
        debug!(
            "Removing {} edges ({} after dedup) from {}",
            edges.len(),
            requests.len(),
            self.config.table_name
        );

        self.writer().submit("remove edges", requests).await?;
        Ok(())
    }

    /// Delete every edge touching `node`, in either direction
    pub async fn remove_node_edges(&self, node: &Node) -> EdgeStoreResult<()> {
        let mut edges = self
            .read_out_edges(node)
            .await
            .map_err(|e| EdgeStoreError::node("read out", node, e))?;
        let in_edges = self
            .read_in_edges(node)
            .await
            .map_err(|e| EdgeStoreError::node("read in", node, e))?;
        edges.extend(in_edges);

        if edges.is_empty() {
            debug!("Node {} has no edges to remove", node);
            return Ok(());
        }

        self.remove_edges(&edges)
            .await
            .map_err(|e| EdgeStoreError::node("remove", node, e))
    }

    /// Delete every edge leaving `node`, one page at a time.
    ///
    /// Each page is read keys-only and deleted before the next page is
    /// fetched. Chunk failures of all pages are collected and returned once
    /// the query is exhausted. If a later page cannot be read, the chunk
    /// failures collected so far travel with that error.
    pub async fn remove_out_edges(&self, node: &Node) -> EdgeStoreResult<()> {
        let partition = codec::encode_primary(node);
        let base = QueryRequest::primary(&self.config.table_name, partition.clone())
            .with_limit(self.config.page_size)
            .keys_only();

        let mut start = None;
        let mut failed: Option<BatchError> = None;
        loop {
            let requests = match self.out_keys_page(&base, start.take(), &partition).await {
                Ok((requests, next)) => {
                    start = next;
                    requests
                }
                Err(e) => {
                    let err = EdgeStoreError::node("read out", node, e);
                    return Err(match failed {
                        Some(pending) => EdgeStoreError::Interrupted {
                            source: Box::new(err),
                            pending,
                        },
                        None => err,
                    });
                }
            };

            if !requests.is_empty() {
                if let Err(err) = self.writer().submit("remove out-edges", requests).await {
                    match failed.as_mut() {
                        Some(acc) => {
                            let offset = acc.total_chunks;
                            acc.total_chunks += err.total_chunks;
                            acc.failures.extend(err.failures.into_iter().map(|mut f| {
                                f.index += offset;
                                f
                            }));
                        }
                        None => failed = Some(err),
                    }
                }
            }

            if start.is_none() {
                break;
            }
        }

        match failed {
            Some(err) => Err(EdgeStoreError::node("remove out", node, err.into())),
            None => Ok(()),
        }
    }

    /// One keys-only page of out-edges as delete requests, plus the resume token
    async fn out_keys_page(
        &self,
        base: &QueryRequest,
        start: Option<ContinuationToken>,
        partition: &str,
    ) -> EdgeStoreResult<(Vec<WriteRequest>, Option<ContinuationToken>)> {
        let page = self
            .client
            .query(base.clone().with_start(start))
            .await
            .map_err(|e| EdgeStoreError::store("query", partition, e))?;

        let requests = page
            .items
            .iter()
            .map(|item| item_key(item).map(WriteRequest::Delete))
            .collect::<EdgeStoreResult<Vec<_>>>()?;
        Ok((requests, page.next))
    }

    /// Approximate row count; advisory, so failures read as 0
    pub async fn size(&self) -> u64 {
        match self.client.approximate_count(&self.config.table_name).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Size of {} unavailable: {}", self.config.table_name, e);
                0
            }
        }
    }
}

/// Graph operations the linking use cases depend on
#[async_trait]
pub trait GraphBuilder: Send + Sync {
    async fn upsert_edges(&self, edges: &[Edge]) -> EdgeStoreResult<()>;

    async fn remove_edges(&self, edges: &[Edge]) -> EdgeStoreResult<()>;

    async fn read_in_edges(&self, node: &Node) -> EdgeStoreResult<Vec<Edge>>;

    async fn read_area_edges(&self, area: &Area) -> EdgeStoreResult<Vec<Edge>>;
}

#[async_trait]
impl<S: KvStore + ?Sized> GraphBuilder for EdgeStore<S> {
    async fn upsert_edges(&self, edges: &[Edge]) -> EdgeStoreResult<()> {
        EdgeStore::upsert_edges(self, edges).await
    }

    async fn remove_edges(&self, edges: &[Edge]) -> EdgeStoreResult<()> {
        EdgeStore::remove_edges(self, edges).await
    }

    async fn read_in_edges(&self, node: &Node) -> EdgeStoreResult<Vec<Edge>> {
        EdgeStore::read_in_edges(self, node).await
    }

    async fn read_area_edges(&self, area: &Area) -> EdgeStoreResult<Vec<Edge>> {
        EdgeStore::read_area_edges(self, area).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryStore;
    use crate::schema::{edge_table_schema, TableAdmin};
    use std::time::Duration;

    async fn store_with(config: EdgeStoreConfig, page_size: usize) -> EdgeStore<InMemoryStore> {
        let kv = InMemoryStore::with_page_size(page_size);
        kv.create_table(&edge_table_schema(&config)).await.unwrap();
        EdgeStore::new(Arc::new(kv), config).with_clock(Arc::new(ManualClock::new(1_000)))
    }

    #[tokio::test]
    async fn test_upsert_stamps_absolute_expiry() {
        let store = store_with(EdgeStoreConfig::default(), 100).await;
        let edge = Edge::new("A", "B").with_area("Area1").with_ttl(Duration::from_secs(60));
        store.upsert_edges(&[edge.clone()]).await.unwrap();

        let item = store
            .client()
            .get(&store.config().table_name, &edge_key(&edge.from, &edge.to))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item[codec::TTL_ATTR].as_i64(), Some(1_060));

        let read = store.get_edge(&edge.from, &edge.to).await.unwrap().unwrap();
        assert_eq!(read, edge);
    }

    #[tokio::test]
    async fn test_get_missing_edge() {
        let store = store_with(EdgeStoreConfig::default(), 100).await;
        assert!(store.get_edge(&"A".into(), &"B".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_small_chunks_and_pages() {
        let config = EdgeStoreConfig {
            max_batch_size: 3,
            page_size: Some(2),
            ..EdgeStoreConfig::default()
        };
        let store = store_with(config, 100).await;
        let edges: Vec<Edge> = (0..10)
            .map(|i| Edge::new("hub", format!("n{:02}", i)).with_area("A"))
            .collect();

        store.upsert_edges(&edges).await.unwrap();
        assert_eq!(store.read_out_edges(&"hub".into()).await.unwrap().len(), 10);
        assert_eq!(store.read_area_edges(&"A".into()).await.unwrap().len(), 10);

        store.remove_out_edges(&"hub".into()).await.unwrap();
        assert!(store.read_out_edges(&"hub".into()).await.unwrap().is_empty());
        assert_eq!(store.size().await, 0);
    }

    #[tokio::test]
    async fn test_size_degrades_to_zero() {
        let store = EdgeStore::new(Arc::new(InMemoryStore::new()), EdgeStoreConfig::default());
        // Table was never provisioned
        assert_eq!(store.size().await, 0);
        assert!(store.read_out_edges(&"A".into()).await.is_err());
    }
}
