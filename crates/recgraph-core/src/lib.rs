//! recgraph Core - Value model, storage contract and shared types
//!
//! This crate defines the abstractions shared by every recgraph crate:
//! - The tagged `Value` union and `PredicateKind` classification
//! - Geospatial, datetime and float-vector binary encodings
//! - The storage engine contract (`GraphEngine`) and its mutation/schema types
//! - Cancellation `Context`
//! - Common error types
//! - Configuration management

pub mod config;
pub mod context;
pub mod geo;
pub mod storage;
pub mod value;

pub use config::{ConfigError, EngineConfig};
pub use context::Context;
pub use geo::{Point, Polygon};
pub use storage::{
    GraphEngine, LoadStats, Mutation, NQuad, Object, SchemaChange, SchemaUpdate, Subject,
    TypeUpdate, VectorIndexSpec,
};
pub use value::{PredicateKind, Value};

use thiserror::Error;

/// Predicate holding the type names of a node
pub const TYPE_PREDICATE: &str = "dgraph.type";

/// Default namespace, always present
pub const DEFAULT_NAMESPACE: u64 = 0;

// ============================================================================
// Error Types
// ============================================================================

/// Error substrings that mark an error as caused by cancellation
const CANCELLATION_MARKERS: [&str; 3] = [
    "context canceled",
    "context deadline exceeded",
    "operation was canceled",
];

/// Core error types for recgraph operations
#[derive(Error, Debug)]
pub enum RecgraphError {
    // ---- schema / metadata ----
    #[error("field {0} has no json tag")]
    MissingJsonTag(String),

    #[error("malformed readFrom tag on field {field}: {tag}")]
    MalformedReverseTag { field: String, tag: String },

    #[error("vector constraint on field {field} requires a float vector, got {kind}")]
    VectorKindMismatch { field: String, kind: PredicateKind },

    #[error("unique constraint not defined for any field on type {0}")]
    NoUniqueConstraint(String),

    #[error("expected struct, got {0}")]
    ExpectedStruct(String),

    #[error("type {0} has no gid field")]
    MissingGid(String),

    // ---- identity ----
    #[error("no object found")]
    NoObjectFound,

    #[error("type not found")]
    TypeNotFound(String),

    #[error("namespace {0} not found")]
    NamespaceNotFound(u64),

    // ---- codec ----
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("geo marshalling failed: {0}")]
    Geo(String),

    #[error("codec error: {0}")]
    Codec(String),

    // ---- query ----
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    // ---- engine ----
    #[error("{0}")]
    Engine(String),

    #[error("engine is closed")]
    Closed,

    // ---- cancellation ----
    #[error("context canceled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    // ---- infrastructure ----
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RecgraphError {
    /// Build an engine error from any displayable message
    pub fn engine(msg: impl std::fmt::Display) -> Self {
        Self::Engine(msg.to_string())
    }

    /// Whether this error was caused by cancellation rather than a real failure.
    ///
    /// Workload drivers use this to ignore errors raised during orderly shutdown.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Cancelled | Self::DeadlineExceeded => true,
            other => {
                let msg = other.to_string();
                CANCELLATION_MARKERS.iter().any(|m| msg.contains(m))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RecgraphError>;

// ============================================================================
// Naming
// ============================================================================

/// Fully qualified predicate name for a field of a record type
pub fn predicate_name(type_name: &str, field: &str) -> String {
    format!("{type_name}.{field}")
}

/// Render a uid the way the engine prints it in JSON
pub fn format_uid(uid: u64) -> String {
    format!("{uid:#x}")
}

/// Parse a uid printed as `0x..` hex (or plain decimal)
pub fn parse_uid(text: &str) -> Result<u64> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    parsed.map_err(|_| RecgraphError::Codec(format!("invalid uid {text:?}")))
}

// ============================================================================
// Tests
// ============================================================================
