//! recgraph Query - DQL combinators and record query compilation
//!
//! Two layers:
//! - `func`: deferred DQL predicate builders (`eq`, `allofterms`,
//!   `similar_to`, ...) composed with `and` / `or` / `not`
//! - `filter` and `builder`: the record-oriented front end (`Filter`,
//!   `Pagination`, `Sorting`, `QueryParams`) compiled into full `obj` / `objs`
//!   queries against a type's predicates

pub mod builder;
pub mod filter;
pub mod func;

pub use builder::{object_query, objects_query, reverse_block, TypeSchema};
pub use filter::{
    Filter, Pagination, QueryParams, Sorting, StringPredicate, TextPredicate, VectorPredicate,
};
pub use func::{
    allofterms, alloftext, and, anyofterms, anyoftext, eq, ge, group, gt, has, le, lt, not, or,
    quote, regexp, similar_to, type_of, uid, QueryFunc,
};
