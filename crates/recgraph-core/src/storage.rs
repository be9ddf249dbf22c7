//! Storage engine contract
//!
//! The record layer never touches posting lists directly: it talks to a
//! `GraphEngine`, which accepts schema changes, N-Quad mutations and DQL
//! queries scoped to a namespace.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{PredicateKind, Result, Value};

// ============================================================================
// Schema
// ============================================================================

/// Vector index declaration attached to a float-vector predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorIndexSpec {
    /// Index kind, e.g. `hnsw`
    pub name: String,
    /// Index options as key/value pairs, e.g. `metric=cosine`
    pub options: Vec<(String, String)>,
}

impl VectorIndexSpec {
    /// HNSW index with cosine metric
    pub fn hnsw_cosine() -> Self {
        Self {
            name: "hnsw".to_string(),
            options: vec![("metric".to_string(), "cosine".to_string())],
        }
    }

    /// Metric option, defaulting to cosine
    pub fn metric(&self) -> &str {
        self.options
            .iter()
            .find(|(k, _)| k == "metric")
            .map(|(_, v)| v.as_str())
            .unwrap_or("cosine")
    }
}

/// Declaration of a single predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaUpdate {
    /// Fully qualified predicate name
    pub predicate: String,
    /// Value kind
    pub kind: PredicateKind,
    /// Whether the predicate holds a list of values
    #[serde(default)]
    pub list: bool,
    /// Index tokenizers (`exact`, `term`, `hash`, `fulltext`, `trigram`)
    #[serde(default)]
    pub tokenizers: Vec<String>,
    /// Reject values already held by another node
    #[serde(default)]
    pub unique: bool,
    /// Serialize concurrent writes to the same indexed value
    #[serde(default)]
    pub upsert: bool,
    /// Maintain a reverse edge index
    #[serde(default)]
    pub reverse: bool,
    /// Vector indexes
    #[serde(default)]
    pub vector_specs: Vec<VectorIndexSpec>,
}

impl SchemaUpdate {
    /// Un-indexed predicate of the given kind
    pub fn new(predicate: impl Into<String>, kind: PredicateKind) -> Self {
        Self {
            predicate: predicate.into(),
            kind,
            list: false,
            tokenizers: Vec::new(),
            unique: false,
            upsert: false,
            reverse: false,
            vector_specs: Vec::new(),
        }
    }

    /// Whether the predicate is indexed with the given tokenizer
    pub fn has_tokenizer(&self, tokenizer: &str) -> bool {
        self.tokenizers.iter().any(|t| t == tokenizer)
    }

    /// Render the predicate in DQL schema syntax
    pub fn to_dql(&self) -> String {
        let mut out = format!("{}: ", self.predicate);
        if self.list {
            out.push_str(&format!("[{}]", self.kind.schema_name()));
        } else {
            out.push_str(self.kind.schema_name());
        }
        if !self.tokenizers.is_empty() {
            out.push_str(&format!(" @index({})", self.tokenizers.join(", ")));
        }
        for spec in &self.vector_specs {
            let opts = spec
                .options
                .iter()
                .map(|(k, v)| format!("{k}:\"{v}\""))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(" @index({}({opts}))", spec.name));
        }
        if self.reverse {
            out.push_str(" @reverse");
        }
        if self.unique {
            out.push_str(" @unique");
        }
        if self.upsert {
            out.push_str(" @upsert");
        }
        out.push_str(" .");
        out
    }
}

/// Declaration of a node type and the predicates it owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeUpdate {
    pub name: String,
    pub fields: Vec<String>,
}

/// A batch of schema declarations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaChange {
    pub predicates: Vec<SchemaUpdate>,
    pub types: Vec<TypeUpdate>,
}

impl SchemaChange {
    /// Whether the batch declares nothing
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty() && self.types.is_empty()
    }

    /// Look up a predicate declaration
    pub fn predicate(&self, name: &str) -> Option<&SchemaUpdate> {
        self.predicates.iter().find(|p| p.predicate == name)
    }

    /// Look up a type declaration
    pub fn type_def(&self, name: &str) -> Option<&TypeUpdate> {
        self.types.iter().find(|t| t.name == name)
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// Subject of an N-Quad
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    /// Existing node
    Uid(u64),
    /// Node allocated by the mutation, identified by its blank label
    Blank(String),
}

/// Object of an N-Quad
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Scalar value
    Value(Value),
    /// Edge to an existing node
    Uid(u64),
    /// Edge to a node allocated by the same mutation
    Blank(String),
    /// Wildcard, only meaningful in deletions
    Star,
}

/// A single `<subject> <predicate> <object>` statement
#[derive(Debug, Clone, PartialEq)]
pub struct NQuad {
    pub subject: Subject,
    pub predicate: String,
    pub object: Object,
}

impl NQuad {
    /// Statement with a scalar object
    pub fn value(subject: Subject, predicate: impl Into<String>, value: Value) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object: Object::Value(value),
        }
    }

    /// Statement with an edge object
    pub fn edge(subject: Subject, predicate: impl Into<String>, object: Object) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }

    /// `<uid> <predicate> *`
    pub fn delete_predicate(uid: u64, predicate: impl Into<String>) -> Self {
        Self {
            subject: Subject::Uid(uid),
            predicate: predicate.into(),
            object: Object::Star,
        }
    }

    /// `<uid> * *`
    pub fn delete_node(uid: u64) -> Self {
        Self::delete_predicate(uid, "*")
    }
}

/// Set and delete statements applied atomically; deletions run first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mutation {
    pub set: Vec<NQuad>,
    pub del: Vec<NQuad>,
}

impl Mutation {
    /// Whether the mutation does nothing
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.del.is_empty()
    }
}

/// Summary of a bulk load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Predicates declared by the schema file
    pub predicates: usize,
    /// Types declared by the schema file
    pub types: usize,
    /// N-Quads applied
    pub nquads: usize,
    /// Nodes allocated for blank labels
    pub nodes: usize,
}

// ============================================================================
// Engine trait
// ============================================================================

/// Operations the record layer needs from a graph storage engine
#[async_trait]
pub trait GraphEngine: Send + Sync {
    /// Apply schema declarations; re-declaring an identical predicate is a no-op
    async fn alter_schema(&self, ns: u64, change: &SchemaChange) -> Result<()>;

    /// Current schema of a namespace
    async fn schema(&self, ns: u64) -> Result<SchemaChange>;

    /// Apply a mutation, returning the uids allocated for blank labels
    async fn mutate(&self, ns: u64, mutation: Mutation) -> Result<HashMap<String, u64>>;

    /// Run a DQL query, returning the JSON response
    async fn query(&self, ns: u64, dql: &str) -> Result<serde_json::Value>;

    /// Allocate a new namespace
    async fn create_namespace(&self) -> Result<u64>;

    /// Whether a namespace exists
    async fn namespace_exists(&self, ns: u64) -> Result<bool>;

    /// Remove every namespace's data and schema
    async fn drop_all(&self) -> Result<()>;

    /// Remove a namespace's data, keeping its schema
    async fn drop_data(&self, ns: u64) -> Result<()>;

    /// Bulk-load a DQL schema and an N-Quad document into a namespace
    async fn load(&self, ns: u64, schema: &str, rdf: &str) -> Result<LoadStats>;

    /// Flush and release the engine
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_predicate_dql() {
        let mut update = SchemaUpdate::new("User.clerk_id", PredicateKind::String);
        update.tokenizers = vec!["exact".to_string()];
        update.unique = true;
        update.upsert = true;
        assert_eq!(
            update.to_dql(),
            "User.clerk_id: string @index(exact) @unique @upsert ."
        );
    }

    #[test]
    fn test_vector_predicate_dql() {
        let mut update = SchemaUpdate::new("Document.textVec", PredicateKind::VFloat);
        update.vector_specs = vec![VectorIndexSpec::hnsw_cosine()];
        assert_eq!(
            update.to_dql(),
            "Document.textVec: float32vector @index(hnsw(metric:\"cosine\")) ."
        );
        assert_eq!(update.vector_specs[0].metric(), "cosine");
    }

    #[test]
    fn test_list_uid_dql() {
        let mut update = SchemaUpdate::new("Project.members", PredicateKind::Uid);
        update.list = true;
        update.reverse = true;
        assert_eq!(update.to_dql(), "Project.members: [uid] @reverse .");
    }

    #[test]
    fn test_delete_node_quad() {
        let quad = NQuad::delete_node(5);
        assert_eq!(quad.subject, Subject::Uid(5));
        assert_eq!(quad.predicate, "*");
        assert_eq!(quad.object, Object::Star);
    }
}
