//! Edgegraph
//!
//! A directed, weighted graph of string-identified nodes persisted in a
//! single key-value table with two secondary indexes, plus the linking use
//! cases that keep demands and supplies connected.
//!
//! # Architecture
//!
//! - `graph`: edge, node, area and score value types
//! - `codec`: tagged key encoding and item <-> edge conversion
//! - `kv`: the store capability (`KvStore`) with in-memory and RocksDB backends
//! - `schema`: table definitions and versioned provisioning
//! - `store`: the `EdgeStore` façade (chunked batch writes, paginated reads)
//! - `usecase`: demand/supply linking and area matching
//!
//! ## Example Usage
//!
//! ```rust
//! use edgegraph::{EdgeStore, EdgeStoreConfig, Edge, InMemoryStore, Provisioner};
//! use edgegraph::schema::edge_graph_definitions;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let config = EdgeStoreConfig::default();
//! let kv = Arc::new(InMemoryStore::new());
//! Provisioner::new(edge_graph_definitions(&config)).migrate(&*kv).await.unwrap();
//!
//! let store = EdgeStore::new(kv, config);
//! store.upsert_edges(&[Edge::new("A", "B").with_area("Area1")]).await.unwrap();
//!
//! let out = store.read_out_edges(&"A".into()).await.unwrap();
//! assert_eq!(out.len(), 1);
//! # });
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod error;
pub mod graph;
pub mod kv;
pub mod schema;
pub mod store;
pub mod usecase;

// Re-export main types for convenience
pub use graph::{Area, Edge, Node, Score};

pub use config::{ConfigError, ConfigResult, EdgeStoreConfig, LinkPolicy};

pub use error::{BatchError, ChunkFailure, EdgeStoreError, EdgeStoreResult};

pub use kv::{
    AttributeValue, ContinuationToken, InMemoryStore, Item, KvError, KvResult, KvStore,
    PrimaryKey, QueryPage, QueryRequest, RocksStore, WriteRequest,
};

pub use schema::{
    ProvisionError, ProvisionResult, Provisioner, SchemaDefinition, TableAdmin, TableSchema,
};

pub use store::{Clock, EdgeStore, GraphBuilder, ManualClock, SystemClock};

pub use usecase::{
    AreaMatcher, DemandLinker, DemandReader, MatchMaker, SupplyLinker, SupplyReader,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
        assert_eq!(ver, "0.1.0");
    }
}
