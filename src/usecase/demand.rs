//! Demand linking

use crate::config::LinkPolicy;
use crate::graph::{Edge, Node};
use crate::store::GraphBuilder;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Finds the supplies able to serve a demand
#[async_trait]
pub trait SupplyReader: Send + Sync {
    async fn find_for(&self, demand: &Node) -> anyhow::Result<Vec<Node>>;
}

/// Links a demand to each matching supply with a `demand -> supply` edge
pub struct DemandLinker<R: ?Sized, G: ?Sized> {
    supplies: Arc<R>,
    graph: Arc<G>,
    policy: LinkPolicy,
}

impl<R, G> DemandLinker<R, G>
where
    R: SupplyReader + ?Sized,
    G: GraphBuilder + ?Sized,
{
    pub fn new(supplies: Arc<R>, graph: Arc<G>, policy: LinkPolicy) -> Self {
        DemandLinker {
            supplies,
            graph,
            policy,
        }
    }

    /// Upsert one edge per matching supply; no supplies means nothing to do
    pub async fn link(&self, demand: &Node) -> anyhow::Result<()> {
        let supplies = self
            .supplies
            .find_for(demand)
            .await
            .with_context(|| format!("failed to find supplies for demand {}", demand))?;
        if supplies.is_empty() {
            debug!("No supplies for demand {}", demand);
            return Ok(());
        }

        let edges: Vec<Edge> = supplies
            .into_iter()
            .map(|supply| {
                Edge::new(demand.clone(), supply)
                    .with_score(self.policy.score())
                    .with_area(self.policy.area())
                    .with_ttl(self.policy.ttl())
            })
            .collect();

        debug!("Linking demand {} to {} supplies", demand, edges.len());
        self.graph
            .upsert_edges(&edges)
            .await
            .with_context(|| format!("failed to link demand {}", demand))
    }
}
