//! Scored, area-tagged directed edge
//!
//! The pair `(from, to)` is the identity of an edge. Score, area and TTL are
//! mutable attributes of that identity: writing the same pair again replaces
//! them in place.

use super::types::{Area, Node, Score};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A directed edge in the graph
///
/// Edges have:
/// - A source node (`from`) and a target node (`to`)
/// - A score (edge weight)
/// - An area tag for the area query pattern
/// - A time-to-live, turned into an absolute expiry when written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node (edge goes FROM this node)
    pub from: Node,

    /// Target node (edge goes TO this node)
    pub to: Node,

    /// Weight of the edge
    pub score: Score,

    /// Area the edge belongs to
    pub area: Area,

    /// Time-to-live. Zero means the row is eligible for reaping right away.
    pub ttl: Duration,
}

impl Edge {
    /// Create a new directed edge with zero score, empty area and zero TTL
    pub fn new(from: impl Into<Node>, to: impl Into<Node>) -> Self {
        Edge {
            from: from.into(),
            to: to.into(),
            score: Score::default(),
            area: Area::default(),
            ttl: Duration::ZERO,
        }
    }

    pub fn with_score(mut self, score: impl Into<Score>) -> Self {
        self.score = score.into();
        self
    }

    pub fn with_area(mut self, area: impl Into<Area>) -> Self {
        self.area = area.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Check if both edges share the same `(from, to)` identity
    pub fn same_identity(&self, other: &Edge) -> bool {
        self.from == other.from && self.to == other.to
    }

    /// Check if this edge goes FROM a specific node
    pub fn starts_from(&self, node: &Node) -> bool {
        &self.from == node
    }

    /// Check if this edge goes TO a specific node
    pub fn ends_at(&self, node: &Node) -> bool {
        &self.to == node
    }

    /// Check if either endpoint is `node`
    pub fn touches(&self, node: &Node) -> bool {
        self.starts_from(node) || self.ends_at(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_edge() {
        let edge = Edge::new("A", "B")
            .with_score(10.0)
            .with_area("Area1")
            .with_ttl(Duration::from_secs(60));

        assert_eq!(edge.from, Node::new("A"));
        assert_eq!(edge.to, Node::new("B"));
        assert_eq!(edge.score, Score::new(10.0));
        assert_eq!(edge.area, Area::new("Area1"));
        assert_eq!(edge.ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_edge_direction() {
        let edge = Edge::new("A", "B");

        assert!(edge.starts_from(&Node::new("A")));
        assert!(edge.ends_at(&Node::new("B")));
        assert!(!edge.starts_from(&Node::new("B")));
        assert!(!edge.ends_at(&Node::new("A")));
        assert!(edge.touches(&Node::new("B")));
        assert!(!edge.touches(&Node::new("C")));
    }

    #[test]
    fn test_identity_ignores_attributes() {
        let a = Edge::new("A", "B").with_area("Area1").with_score(10.0);
        let b = Edge::new("A", "B").with_area("Area2").with_score(20.0);
        let reversed = Edge::new("B", "A");

        assert!(a.same_identity(&b));
        assert_ne!(a, b);
        assert!(!a.same_identity(&reversed));
    }
}
