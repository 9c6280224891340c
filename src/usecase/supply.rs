//! Supply linking

use super::join_errors;
use crate::config::LinkPolicy;
use crate::graph::{Edge, Node};
use crate::store::GraphBuilder;
use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Finds the demands a supply can serve
#[async_trait]
pub trait DemandReader: Send + Sync {
    async fn find_for(&self, supply: &Node) -> anyhow::Result<Vec<Node>>;
}

/// Keeps the in-edges of a supply in line with its current demands
pub struct SupplyLinker<R: ?Sized, G: ?Sized> {
    demands: Arc<R>,
    graph: Arc<G>,
    policy: LinkPolicy,
}

impl<R, G> SupplyLinker<R, G>
where
    R: DemandReader + ?Sized,
    G: GraphBuilder + ?Sized,
{
    pub fn new(demands: Arc<R>, graph: Arc<G>, policy: LinkPolicy) -> Self {
        SupplyLinker {
            demands,
            graph,
            policy,
        }
    }

    /// Upsert `demand -> supply` for every current demand and remove in-edges
    /// from demands that no longer match. Both steps run even if one fails.
    pub async fn link(&self, supply: &Node) -> anyhow::Result<()> {
        let demands = self
            .demands
            .find_for(supply)
            .await
            .with_context(|| format!("failed to find demands for supply {}", supply))?;
        if demands.is_empty() {
            debug!("No demands for supply {}", supply);
            return Ok(());
        }

        let current: HashSet<&Node> = demands.iter().collect();
        let stale: Vec<Edge> = self
            .graph
            .read_in_edges(supply)
            .await
            .with_context(|| format!("failed to read in-edges of supply {}", supply))?
            .into_iter()
            .filter(|edge| !current.contains(&edge.from))
            .collect();

        let fresh: Vec<Edge> = demands
            .iter()
            .map(|demand| {
                Edge::new(demand.clone(), supply.clone())
                    .with_score(self.policy.score())
                    .with_area(self.policy.area())
                    .with_ttl(self.policy.ttl())
            })
            .collect();

        debug!(
            "Supply {}: linking {} demands, removing {} stale edges",
            supply,
            fresh.len(),
            stale.len()
        );

        let mut errors = Vec::new();
        if let Err(e) = self.graph.upsert_edges(&fresh).await {
            errors.push(anyhow::Error::new(e).context(format!("failed to link supply {}", supply)));
        }
        if let Err(e) = self.graph.remove_edges(&stale).await {
            errors.push(
                anyhow::Error::new(e).context(format!("failed to unlink stale demands of supply {}", supply)),
            );
        }
        join_errors(errors)
    }
}
