//! Label types for the edge graph
//!
//! Nodes and areas have no storage of their own. They only exist as
//! components of encoded keys and as query parameters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque node identifier (e.g. a demand or supply id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Default)]
pub struct Node(String);

impl Node {
    pub fn new(id: impl Into<String>) -> Self {
        Node(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node(s)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node(s.to_string())
    }
}

/// Partition/category tag grouping edges for the area query pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Default)]
pub struct Area(String);

impl Area {
    pub fn new(area: impl Into<String>) -> Self {
        Area(area.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Area {
    fn from(s: String) -> Self {
        Area(s)
    }
}

impl From<&str> for Area {
    fn from(s: &str) -> Self {
        Area(s.to_string())
    }
}

/// Edge weight
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
pub struct Score(pub f64);

impl Score {
    pub fn new(score: f64) -> Self {
        Score(score)
    }

    pub fn as_f64(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<f64> for Score {
    fn from(score: f64) -> Self {
        Score(score)
    }
}
