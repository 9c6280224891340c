//! Area matching

use crate::graph::{Area, Edge, Node};
use crate::store::GraphBuilder;
use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Undirected adjacency: each node maps to its neighbours in edge order
pub type Adjacency = HashMap<Node, Vec<Node>>;

/// External matching engine fed with one area's adjacency
#[async_trait]
pub trait MatchMaker: Send + Sync {
    async fn matches(&self, graph: &Adjacency) -> anyhow::Result<()>;
}

/// Build an undirected adjacency map: every edge adds `from -> to` and `to -> from`
pub fn build_adjacency(edges: &[Edge]) -> Adjacency {
    let mut graph = Adjacency::new();
    for edge in edges {
        graph.entry(edge.from.clone()).or_default().push(edge.to.clone());
        graph.entry(edge.to.clone()).or_default().push(edge.from.clone());
    }
    graph
}

/// Reads an area and passes its adjacency to a [`MatchMaker`]
pub struct AreaMatcher<G: ?Sized, M: ?Sized> {
    graph: Arc<G>,
    match_maker: Arc<M>,
}

impl<G, M> AreaMatcher<G, M>
where
    G: GraphBuilder + ?Sized,
    M: MatchMaker + ?Sized,
{
    pub fn new(graph: Arc<G>, match_maker: Arc<M>) -> Self {
        AreaMatcher { graph, match_maker }
    }

    /// One matching round; an empty area skips the match maker
    pub async fn tick(&self, area: &Area) -> anyhow::Result<()> {
        let edges = self
            .graph
            .read_area_edges(area)
            .await
            .with_context(|| format!("failed to read edges of area {}", area))?;
        if edges.is_empty() {
            debug!("Area {} has no edges", area);
            return Ok(());
        }

        let graph = build_adjacency(&edges);
        debug!("Area {}: matching {} nodes over {} edges", area, graph.len(), edges.len());
        self.match_maker.matches(&graph).await
    }
}
