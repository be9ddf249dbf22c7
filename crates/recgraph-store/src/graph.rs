//! Namespace state: schema, type definitions and nodes
//!
//! A node is nothing more than its postings. Scalar postings hold a
//! [`Value`]; edges hold `Value::Uid`. A node with no postings does not exist.

use std::collections::BTreeMap;

use recgraph_core::{SchemaChange, SchemaUpdate, TypeUpdate, Value, TYPE_PREDICATE};
use serde::{Deserialize, Serialize};

fn first_uid() -> u64 {
    1
}

/// Postings of one node, keyed by predicate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub preds: BTreeMap<String, Vec<Value>>,
}

impl Node {
    /// Values held under a predicate
    pub fn values(&self, predicate: &str) -> &[Value] {
        self.preds.get(predicate).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Targets of a uid predicate
    pub fn edges<'a>(&'a self, predicate: &str) -> impl Iterator<Item = u64> + 'a {
        self.values(predicate).iter().filter_map(|v| match v {
            Value::Uid(u) => Some(*u),
            _ => None,
        })
    }

    /// Type names from `dgraph.type`
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.values(TYPE_PREDICATE).iter().filter_map(|v| match v {
            Value::Str(s) | Value::Default(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.types().any(|t| t == type_name)
    }

    pub fn has(&self, predicate: &str) -> bool {
        !self.values(predicate).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.preds.values().all(Vec::is_empty)
    }

    /// Insert a value; lists keep distinct values, scalars are replaced
    pub fn set(&mut self, predicate: &str, value: Value, list: bool) {
        let values = self.preds.entry(predicate.to_string()).or_default();
        if list {
            if !values.contains(&value) {
                values.push(value);
            }
        } else {
            *values = vec![value];
        }
    }

    /// Remove one value, or every value when `value` is `None`
    pub fn remove(&mut self, predicate: &str, value: Option<&Value>) {
        match value {
            None => {
                self.preds.remove(predicate);
            }
            Some(value) => {
                if let Some(values) = self.preds.get_mut(predicate) {
                    values.retain(|v| v != value);
                    if values.is_empty() {
                        self.preds.remove(predicate);
                    }
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.preds.clear();
    }
}

/// Everything stored for one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(default)]
    pub predicates: BTreeMap<String, SchemaUpdate>,
    #[serde(default)]
    pub types: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub nodes: BTreeMap<u64, Node>,
    #[serde(default = "first_uid")]
    pub next_uid: u64,
}

impl Default for Namespace {
    fn default() -> Self {
        Self {
            predicates: BTreeMap::new(),
            types: BTreeMap::new(),
            nodes: BTreeMap::new(),
            next_uid: first_uid(),
        }
    }
}

impl Namespace {
    /// Merge schema declarations; later declarations replace earlier ones
    pub fn alter(&mut self, change: &SchemaChange) {
        for update in &change.predicates {
            self.predicates
                .insert(update.predicate.clone(), update.clone());
        }
        for ty in &change.types {
            self.types.insert(ty.name.clone(), ty.fields.clone());
        }
    }

    /// Current schema as a change batch
    pub fn schema(&self) -> SchemaChange {
        SchemaChange {
            predicates: self.predicates.values().cloned().collect(),
            types: self
                .types
                .iter()
                .map(|(name, fields)| TypeUpdate {
                    name: name.clone(),
                    fields: fields.clone(),
                })
                .collect(),
        }
    }

    pub fn predicate(&self, name: &str) -> Option<&SchemaUpdate> {
        self.predicates.get(name)
    }

    /// Predicates `expand(_all_)` yields for a node: the fields of its types
    pub fn expand_predicates(&self, node: &Node) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for ty in node.types() {
            if let Some(fields) = self.types.get(ty) {
                for field in fields {
                    if !out.contains(field) {
                        out.push(field.clone());
                    }
                }
            }
        }
        out
    }

    /// Remove every node, keeping schema and the uid lease
    pub fn drop_data(&mut self) {
        self.nodes.clear();
    }
}
