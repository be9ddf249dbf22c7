//! DQL subset: lexer, parser and evaluator
//!
//! Accepted: named blocks with a root function, `first` / `offset` /
//! `orderasc` / `orderdesc`, `@filter` with `AND` / `OR` / `NOT`, and
//! selections of `uid`, predicates, `~reverse` predicates and
//! `expand(_all_)`.

pub mod eval;
pub mod lexer;
pub mod parser;

pub use eval::evaluate;
pub use parser::{parse, Query};
