//! Graph data model
//!
//! A directed, weighted graph whose edges carry:
//! - An identity made of the `(from, to)` node pair
//! - A score, an area tag and a time-to-live

pub mod edge;
pub mod types;

// Re-export main types
pub use edge::Edge;
pub use types::{Area, Node, Score};
