//! recgraph - Typed records over an embedded graph store
//!
//! Plain serde structs are persisted as graph nodes: each field becomes a
//! predicate `<Type>.<field>`, nested records become uid edges and
//! `readFrom` fields expose inbound edges as read-only lists.
//!
//! ```ignore
//! let engine = Engine::open(EngineConfig::new("./data"))?;
//! let ctx = Context::background();
//!
//! let (gid, user) = engine.create(&ctx, &User { name: "A".into(), ..Default::default() }).await?;
//! let (_, same): (u64, User) = engine.get(&ctx, gid).await?;
//! let (_, adults): (_, Vec<User>) = engine
//!     .query_records(&ctx, &QueryParams::new().with_filter(Filter::new("age").greater_or_equal(18)))
//!     .await?;
//! engine.close().await?;
//! ```
//!
//! Modules:
//! - `record`: the [`Record`] trait and field shapes
//! - `tags`: struct tag parsing
//! - `schema`: type descriptors and schema derivation
//! - `codec`: field value encoding
//! - `shape`: reshaping engine JSON into records
//! - `crud`: record operations
//! - `engine`: [`Engine`] and [`Namespace`] handles

pub mod codec;
pub mod crud;
pub mod engine;
pub mod record;
pub mod schema;
pub mod shape;
pub mod tags;

pub use crud::{ConstrainedField, Identifier};
pub use engine::{Engine, Namespace};
pub use record::{Field, Point, Polygon, Record, RecordMeta, Shape, Shaped};
pub use schema::{FieldInfo, TypeDescriptor};
pub use tags::Constraint;

pub use recgraph_core::{
    ConfigError, Context, EngineConfig, GraphEngine, LoadStats, PredicateKind, RecgraphError,
    Result, DEFAULT_NAMESPACE,
};
pub use recgraph_query::{
    Filter, Pagination, QueryFunc, QueryParams, Sorting, StringPredicate, TextPredicate,
    VectorPredicate,
};
pub use recgraph_store::MemoryStore;

/// DQL combinators for [`QueryParams::with_func`]
pub mod func {
    pub use recgraph_query::func::*;
}
