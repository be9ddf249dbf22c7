//! DQL predicate combinators
//!
//! Each builder returns a `QueryFunc`, a thunk that renders its DQL fragment
//! only when an enclosing query is composed. The same leaf can be reused in
//! several `and` / `or` sites.

use std::fmt;
use std::sync::Arc;

/// Deferred DQL fragment
#[derive(Clone)]
pub struct QueryFunc(Arc<dyn Fn() -> String + Send + Sync>);

impl QueryFunc {
    /// Wrap a rendering closure
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Fragment that renders to a fixed string
    pub fn raw(fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        Self::new(move || fragment.clone())
    }

    /// Render the fragment
    pub fn render(&self) -> String {
        (self.0)()
    }
}

impl fmt::Debug for QueryFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("QueryFunc").field(&self.render()).finish()
    }
}

impl fmt::Display for QueryFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Quote a string literal for DQL
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ============================================================================
// Leaves
// ============================================================================

/// `uid(<n>)`
pub fn uid(gid: u64) -> QueryFunc {
    QueryFunc::new(move || format!("uid({gid})"))
}

/// `type("<T>")`
pub fn type_of(type_name: impl Into<String>) -> QueryFunc {
    let type_name = type_name.into();
    QueryFunc::new(move || format!("type({})", quote(&type_name)))
}

/// `has(<attr>)`
pub fn has(attr: impl Into<String>) -> QueryFunc {
    let attr = attr.into();
    QueryFunc::new(move || format!("has({attr})"))
}

fn compare(op: &'static str, attr: String, value: String) -> QueryFunc {
    QueryFunc::new(move || format!("{op}({attr}, {value})"))
}

/// `eq(<attr>, <value>)`; `value` is emitted verbatim, quote strings with [`quote`]
pub fn eq(attr: impl Into<String>, value: impl fmt::Display) -> QueryFunc {
    compare("eq", attr.into(), value.to_string())
}

/// `le(<attr>, <value>)`
pub fn le(attr: impl Into<String>, value: impl fmt::Display) -> QueryFunc {
    compare("le", attr.into(), value.to_string())
}

/// `ge(<attr>, <value>)`
pub fn ge(attr: impl Into<String>, value: impl fmt::Display) -> QueryFunc {
    compare("ge", attr.into(), value.to_string())
}

/// `gt(<attr>, <value>)`
pub fn gt(attr: impl Into<String>, value: impl fmt::Display) -> QueryFunc {
    compare("gt", attr.into(), value.to_string())
}

/// `lt(<attr>, <value>)`
pub fn lt(attr: impl Into<String>, value: impl fmt::Display) -> QueryFunc {
    compare("lt", attr.into(), value.to_string())
}

fn text_match(op: &'static str, attr: String, text: String) -> QueryFunc {
    QueryFunc::new(move || format!("{op}({attr}, {})", quote(&text)))
}

/// `allofterms(<attr>, "<terms>")`
pub fn allofterms(attr: impl Into<String>, terms: impl Into<String>) -> QueryFunc {
    text_match("allofterms", attr.into(), terms.into())
}

/// `anyofterms(<attr>, "<terms>")`
pub fn anyofterms(attr: impl Into<String>, terms: impl Into<String>) -> QueryFunc {
    text_match("anyofterms", attr.into(), terms.into())
}

/// `alloftext(<attr>, "<text>")`
pub fn alloftext(attr: impl Into<String>, text: impl Into<String>) -> QueryFunc {
    text_match("alloftext", attr.into(), text.into())
}

/// `anyoftext(<attr>, "<text>")`
pub fn anyoftext(attr: impl Into<String>, text: impl Into<String>) -> QueryFunc {
    text_match("anyoftext", attr.into(), text.into())
}

/// `regexp(<attr>, /<pattern>/)`
pub fn regexp(attr: impl Into<String>, pattern: impl Into<String>) -> QueryFunc {
    let attr = attr.into();
    let pattern = pattern.into();
    QueryFunc::new(move || format!("regexp({attr}, /{pattern}/)"))
}

/// `similar_to(<attr>, <topK>, "[<f0>,<f1>,…]")`
pub fn similar_to(attr: impl Into<String>, top_k: u64, vector: &[f32]) -> QueryFunc {
    let attr = attr.into();
    let vector = vector.to_vec();
    QueryFunc::new(move || {
        let rendered = vector
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!("similar_to({attr}, {top_k}, \"[{rendered}]\")")
    })
}

// ============================================================================
// Composition
// ============================================================================

fn join(funcs: Vec<QueryFunc>, sep: &'static str) -> QueryFunc {
    QueryFunc::new(move || {
        funcs
            .iter()
            .map(QueryFunc::render)
            .collect::<Vec<_>>()
            .join(sep)
    })
}

/// Join fragments with ` AND `
pub fn and(funcs: impl IntoIterator<Item = QueryFunc>) -> QueryFunc {
    join(funcs.into_iter().collect(), " AND ")
}

/// Join fragments with ` OR `
pub fn or(funcs: impl IntoIterator<Item = QueryFunc>) -> QueryFunc {
    join(funcs.into_iter().collect(), " OR ")
}

/// Prefix a fragment with `NOT `
pub fn not(func: QueryFunc) -> QueryFunc {
    QueryFunc::new(move || format!("NOT {}", func.render()))
}

/// Parenthesize a fragment, for mixing `and` and `or`
pub fn group(func: QueryFunc) -> QueryFunc {
    QueryFunc::new(move || format!("({})", func.render()))
}
