//! Edge store errors
//!
//! Four failure families:
//! - decode errors for malformed rows, which abort the whole read
//! - single store-call errors, wrapped with the operation and key
//! - aggregate batch errors, one cause per failed chunk
//! - node-level context for the cascading delete

use crate::graph::Node;
use crate::kv::KvError;
use std::fmt;
use thiserror::Error;

/// Edge store errors
#[derive(Error, Debug)]
pub enum EdgeStoreError {
    /// A stored row is missing an attribute or has the wrong type
    #[error("Failed to decode edge row: attribute '{attribute}' {reason}")]
    Decode {
        attribute: &'static str,
        reason: String,
    },

    /// A single round trip to the store failed
    #[error("Store {operation} failed for key {key}: {source}")]
    Store {
        operation: &'static str,
        key: String,
        #[source]
        source: KvError,
    },

    /// One or more chunks of a batched write failed
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// A node-level operation failed in one of its steps
    #[error("Failed to {action} edges of node {node}: {source}")]
    Node {
        action: &'static str,
        node: Node,
        #[source]
        source: Box<EdgeStoreError>,
    },

    /// A paged operation stopped early after some of its chunks had already failed
    #[error("{source} (earlier pages: {pending})")]
    Interrupted {
        #[source]
        source: Box<EdgeStoreError>,
        pending: BatchError,
    },
}

pub type EdgeStoreResult<T> = Result<T, EdgeStoreError>;

impl EdgeStoreError {
    pub(crate) fn store(operation: &'static str, key: impl Into<String>, source: KvError) -> Self {
        EdgeStoreError::Store {
            operation,
            key: key.into(),
            source,
        }
    }

    pub(crate) fn node(action: &'static str, node: &Node, source: EdgeStoreError) -> Self {
        EdgeStoreError::Node {
            action,
            node: node.clone(),
            source: Box::new(source),
        }
    }

    /// The aggregate batch error, if any, behind this error
    pub fn as_batch(&self) -> Option<&BatchError> {
        match self {
            EdgeStoreError::Batch(batch) => Some(batch),
            EdgeStoreError::Node { source, .. } => source.as_batch(),
            EdgeStoreError::Interrupted { pending, .. } => Some(pending),
            _ => None,
        }
    }
}

/// A chunk of a batched write that the store rejected
#[derive(Debug)]
pub struct ChunkFailure {
    /// Position of the chunk in submission order
    pub index: usize,
    /// Number of operations in the chunk
    pub operations: usize,
    pub source: KvError,
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk {} ({} operations): {}",
            self.index, self.operations, self.source
        )
    }
}

/// Failures of a multi-chunk write
///
/// Chunks not listed here were applied. Nothing is rolled back.
#[derive(Error, Debug)]
#[error("{operation}: {} of {total_chunks} chunks failed: {}", .failures.len(), join_failures(.failures))]
pub struct BatchError {
    pub operation: &'static str,
    pub total_chunks: usize,
    pub failures: Vec<ChunkFailure>,
}

impl BatchError {
    /// Underlying store errors, in chunk order
    pub fn causes(&self) -> impl Iterator<Item = &KvError> {
        self.failures.iter().map(|f| &f.source)
    }

    /// Number of operations that were not applied
    pub fn failed_operations(&self) -> usize {
        self.failures.iter().map(|f| f.operations).sum()
    }
}

fn join_failures(failures: &[ChunkFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
