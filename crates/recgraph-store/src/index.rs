//! Tokenizers, value ordering and vector distance
//!
//! Indexes are evaluated on the fly rather than materialized: a term or text
//! function tokenizes both sides and compares token sets.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use recgraph_core::value::{decode_datetime, unpack_f32};
use recgraph_core::{format_uid, RecgraphError, Result, Value};
use regex::{Regex, RegexBuilder};
use rust_stemmers::{Algorithm, Stemmer};
use unicode_segmentation::UnicodeSegmentation;

/// English stop words dropped by the fulltext tokenizer
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
    "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
    "these", "they", "this", "to", "was", "will", "with",
];

// ============================================================================
// Tokenizers
// ============================================================================

/// `term` tokenizer: lowercased unicode words
pub fn term_tokens(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .unicode_words()
        .map(str::to_string)
        .collect()
}

/// `fulltext` tokenizer: lowercased words, stop words removed, stemmed
pub fn fulltext_tokens(text: &str) -> BTreeSet<String> {
    let stemmer = Stemmer::create(Algorithm::English);
    text.to_lowercase()
        .unicode_words()
        .filter(|w| !STOP_WORDS.contains(w))
        .map(|w| stemmer.stem(w).to_string())
        .collect()
}

/// Build a regex from a DQL `/pattern/flags` literal
pub fn compile_regex(pattern: &str, flags: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .build()
        .map_err(|e| RecgraphError::engine(format!("invalid regular expression {pattern:?}: {e}")))
}

// ============================================================================
// Values
// ============================================================================

/// Total-ish ordering between two values of the same kind
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Str(x) | Value::Default(x), Value::Str(y) | Value::Default(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Double(y)) => (*x as f64).partial_cmp(y),
        (Value::Double(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Double(x), Value::Double(y)) => x.partial_cmp(y),
        (Value::Uid(x), Value::Uid(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => {
            let x = decode_datetime(x).ok()?;
            let y = decode_datetime(y).ok()?;
            Some(x.cmp(&y))
        }
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        (Value::Geo(x), Value::Geo(y)) => (x == y).then_some(Ordering::Equal),
        (Value::VFloat(x), Value::VFloat(y)) => (x == y).then_some(Ordering::Equal),
        _ => None,
    }
}

/// Human-readable rendering used in engine error messages
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Str(s) | Value::Default(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Uid(u) => format_uid(*u),
        Value::Bool(b) => b.to_string(),
        Value::Double(f) => f.to_string(),
        Value::DateTime(b) => decode_datetime(b)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default(),
        Value::VFloat(b) => unpack_f32(b)
            .map(|v| format!("{v:?}"))
            .unwrap_or_default(),
        Value::Bytes(b) | Value::Geo(b) => format!("{} bytes", b.len()),
    }
}

/// Text a term, text or regexp function matches against
pub fn text_of(value: &Value) -> Option<&str> {
    match value {
        Value::Str(s) | Value::Default(s) => Some(s),
        _ => None,
    }
}

// ============================================================================
// Vector distance
// ============================================================================

/// Dot product of two vectors
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm of a vector
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    dot_product(v, v).sqrt()
}

/// Cosine distance (1 - cosine similarity); vectors need not be normalized
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    let norms = l2_norm(a) * l2_norm(b);
    if norms <= f32::EPSILON {
        return 1.0;
    }
    1.0 - dot_product(a, b) / norms
}

/// Squared Euclidean distance
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Distance under a named metric; unknown metrics fall back to cosine
pub fn distance(metric: &str, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        "euclidean" => squared_euclidean(a, b).sqrt(),
        "dotproduct" => -dot_product(a, b),
        _ => cosine_distance(a, b),
    }
}
