//! Paginated reader: drains an equality query page by page

use crate::codec::item_to_stored_edge;
use crate::error::{EdgeStoreError, EdgeStoreResult};
use crate::graph::Edge;
use crate::kv::{KvStore, QueryRequest};
use tracing::debug;

/// Follow continuation tokens until the store reports no next page.
///
/// The first undecodable row fails the whole read. Edge TTLs are the time
/// remaining at `now`.
pub(crate) async fn drain<S: KvStore + ?Sized>(
    client: &S,
    request: QueryRequest,
    now: i64,
) -> EdgeStoreResult<Vec<Edge>> {
    let mut edges = Vec::new();
    let mut start = None;
    let mut pages = 0usize;

    loop {
        let page = client
            .query(request.clone().with_start(start))
            .await
            .map_err(|e| EdgeStoreError::store("query", &request.key, e))?;
        pages += 1;

        edges.reserve(page.items.len());
        for item in &page.items {
            edges.push(item_to_stored_edge(item)?.into_edge(now));
        }

        match page.next {
            Some(token) => start = Some(token),
            None => break,
        }
    }

    debug!(
        "Read {} edges for {} in {} pages",
        edges.len(),
        request.key,
        pages
    );
    Ok(edges)
}
