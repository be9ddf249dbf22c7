//! recgraph Store - Embedded in-memory graph engine
//!
//! Implements the `GraphEngine` contract from `recgraph-core`:
//! - Namespaced triple storage with typed predicates and type definitions
//! - Unique-value enforcement and automatic schema inference
//! - A DQL interpreter for the query shapes the record layer emits
//! - Term, fulltext, trigram-regexp and cosine vector search
//! - Bulk load of DQL schema files and N-Quad RDF
//! - JSON snapshot persistence

pub mod cache;
pub mod dql;
pub mod graph;
pub mod index;
pub mod mutation;
pub mod rdf;
pub mod store;

pub use cache::{CacheStats, QueryCache};
pub use graph::{Namespace, Node};
pub use store::{MemoryStore, SNAPSHOT_FILE};
