//! Staged mutation application
//!
//! A mutation is first applied to an overlay of copied nodes. Only when every
//! statement converts cleanly and no unique constraint is violated is the
//! overlay committed, so a failed mutation leaves the namespace untouched.

use std::collections::{BTreeMap, HashMap};

use recgraph_core::{
    Mutation, NQuad, Object, PredicateKind, RecgraphError, Result, SchemaUpdate, Subject, Value,
    TYPE_PREDICATE,
};

use crate::graph::{Namespace, Node};
use crate::index::display_value;

/// Outcome of staging a mutation, ready to commit
#[derive(Debug, Default)]
pub struct Staged {
    nodes: BTreeMap<u64, Node>,
    predicates: Vec<SchemaUpdate>,
    next_uid: u64,
    pub assigned: HashMap<String, u64>,
}

impl Staged {
    /// Number of nodes allocated for blank labels
    pub fn allocated(&self) -> usize {
        self.assigned.len()
    }

    /// Write the overlay into the namespace
    pub fn commit(self, ns: &mut Namespace) {
        for update in self.predicates {
            ns.predicates.insert(update.predicate.clone(), update);
        }
        for (uid, node) in self.nodes {
            if node.is_empty() {
                ns.nodes.remove(&uid);
            } else {
                ns.nodes.insert(uid, node);
            }
        }
        ns.next_uid = self.next_uid;
    }
}

struct Txn<'a> {
    base: &'a Namespace,
    auto_schema: bool,
    staged: Staged,
    /// `(uid, predicate)` pairs written under a unique predicate
    unique_writes: Vec<(u64, String)>,
}

/// Stage `mutation` against `base`
pub fn stage(base: &Namespace, mutation: Mutation, auto_schema: bool) -> Result<Staged> {
    let mut txn = Txn {
        base,
        auto_schema,
        staged: Staged {
            next_uid: base.next_uid.max(1),
            ..Staged::default()
        },
        unique_writes: Vec::new(),
    };

    for quad in mutation.del {
        txn.delete(quad)?;
    }
    for quad in mutation.set {
        txn.set(quad)?;
    }
    txn.check_unique()?;

    Ok(txn.staged)
}

impl<'a> Txn<'a> {
    fn node_mut(&mut self, uid: u64) -> &mut Node {
        let base = self.base;
        self.staged
            .nodes
            .entry(uid)
            .or_insert_with(|| base.nodes.get(&uid).cloned().unwrap_or_default())
    }

    fn predicate(&self, name: &str) -> Option<&SchemaUpdate> {
        self.staged
            .predicates
            .iter()
            .find(|p| p.predicate == name)
            .or_else(|| self.base.predicate(name))
    }

    fn resolve(&mut self, label: &str) -> u64 {
        if let Some(uid) = self.staged.assigned.get(label) {
            return *uid;
        }
        let uid = self.staged.next_uid;
        self.staged.next_uid += 1;
        self.staged.assigned.insert(label.to_string(), uid);
        uid
    }

    fn subject_uid(&mut self, subject: &Subject) -> u64 {
        match subject {
            Subject::Uid(uid) => *uid,
            Subject::Blank(label) => self.resolve(label),
        }
    }

    fn delete(&mut self, quad: NQuad) -> Result<()> {
        let uid = match quad.subject {
            Subject::Uid(uid) => uid,
            Subject::Blank(label) => {
                return Err(RecgraphError::engine(format!(
                    "blank node _:{label} is not allowed in a deletion"
                )))
            }
        };

        if quad.predicate == "*" {
            self.node_mut(uid).clear();
            return Ok(());
        }

        let kind = self.predicate(&quad.predicate).map(|p| p.kind);
        let value = match quad.object {
            Object::Star => None,
            Object::Uid(target) => Some(Value::Uid(target)),
            Object::Value(v) => Some(match kind {
                Some(kind) if quad.predicate != TYPE_PREDICATE => v.convert(kind)?,
                _ => v,
            }),
            Object::Blank(label) => {
                return Err(RecgraphError::engine(format!(
                    "blank node _:{label} is not allowed in a deletion"
                )))
            }
        };
        self.node_mut(uid).remove(&quad.predicate, value.as_ref());
        Ok(())
    }

    fn set(&mut self, quad: NQuad) -> Result<()> {
        if quad.predicate == "*" {
            return Err(RecgraphError::engine("predicate * is only valid in deletions"));
        }
        let uid = self.subject_uid(&quad.subject);

        if quad.predicate == TYPE_PREDICATE {
            let name = match quad.object {
                Object::Value(Value::Str(s) | Value::Default(s)) => s,
                other => {
                    return Err(RecgraphError::engine(format!(
                        "{TYPE_PREDICATE} expects a string, got {other:?}"
                    )))
                }
            };
            self.node_mut(uid).set(TYPE_PREDICATE, Value::Str(name), true);
            return Ok(());
        }

        let object = match quad.object {
            Object::Star => {
                return Err(RecgraphError::engine("* is only valid in deletions"));
            }
            Object::Blank(label) => Value::Uid(self.resolve(&label)),
            Object::Uid(target) => Value::Uid(target),
            Object::Value(v) => v,
        };

        let declared = self.predicate(&quad.predicate).cloned();
        let schema = match declared {
            Some(schema) => schema,
            None => self.infer(&quad.predicate, &object)?,
        };

        let value = match (&object, schema.kind) {
            (Value::Uid(_), PredicateKind::Uid) => object,
            (Value::Uid(_), kind) => {
                return Err(RecgraphError::engine(format!(
                    "input for predicate {} of type {kind} is uid",
                    quad.predicate
                )))
            }
            _ => object.convert(schema.kind)?,
        };

        if schema.unique {
            self.unique_writes.push((uid, quad.predicate.clone()));
        }
        self.node_mut(uid).set(&quad.predicate, value, schema.list);
        Ok(())
    }

    fn infer(&mut self, predicate: &str, object: &Value) -> Result<SchemaUpdate> {
        if !self.auto_schema {
            return Err(RecgraphError::engine(format!(
                "schema not defined for predicate: {predicate}"
            )));
        }
        let kind = match object.kind() {
            PredicateKind::Default => PredicateKind::String,
            kind => kind,
        };
        let mut update = SchemaUpdate::new(predicate, kind);
        update.list = kind == PredicateKind::Uid;
        self.staged.predicates.push(update.clone());
        Ok(update)
    }

    fn value_held_elsewhere(&self, uid: u64, predicate: &str, value: &Value) -> bool {
        let staged = self
            .staged
            .nodes
            .iter()
            .filter(|(other, _)| **other != uid)
            .any(|(_, node)| node.values(predicate).contains(value));
        if staged {
            return true;
        }
        self.base
            .nodes
            .iter()
            .filter(|(other, _)| **other != uid && !self.staged.nodes.contains_key(other))
            .any(|(_, node)| node.values(predicate).contains(value))
    }

    fn check_unique(&self) -> Result<()> {
        for (uid, predicate) in &self.unique_writes {
            let Some(node) = self.staged.nodes.get(uid) else {
                continue;
            };
            for value in node.values(predicate) {
                if self.value_held_elsewhere(*uid, predicate, value) {
                    return Err(RecgraphError::engine(format!(
                        "could not insert duplicate value [{}] for predicate [{predicate}]",
                        display_value(value)
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recgraph_core::SchemaChange;

    fn user_namespace() -> Namespace {
        let mut clerk = SchemaUpdate::new("User.clerk_id", PredicateKind::String);
        clerk.tokenizers = vec!["exact".into()];
        clerk.unique = true;
        clerk.upsert = true;
        let mut ns = Namespace::default();
        ns.alter(&SchemaChange {
            predicates: vec![SchemaUpdate::new("User.age", PredicateKind::Int), clerk],
            types: Vec::new(),
        });
        ns
    }

    fn create_user(label: &str, clerk: &str) -> Mutation {
        let subject = Subject::Blank(label.to_string());
        Mutation {
            set: vec![
                NQuad::value(subject.clone(), TYPE_PREDICATE, Value::Str("User".into())),
                NQuad::value(subject, "User.clerk_id", Value::Str(clerk.into())),
            ],
            del: Vec::new(),
        }
    }

    #[test]
    fn test_blank_nodes_get_fresh_uids() {
        let mut ns = user_namespace();
        let staged = stage(&ns, create_user("a", "1"), true).unwrap();
        assert_eq!(staged.assigned["a"], 1);
        staged.commit(&mut ns);
        let staged = stage(&ns, create_user("b", "2"), true).unwrap();
        assert_eq!(staged.assigned["b"], 2);
    }

    #[test]
    fn test_duplicate_unique_value_rejected() {
        let mut ns = user_namespace();
        stage(&ns, create_user("a", "1"), true).unwrap().commit(&mut ns);
        let err = stage(&ns, create_user("b", "1"), true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "could not insert duplicate value [1] for predicate [User.clerk_id]"
        );
        assert_eq!(ns.nodes.len(), 1);
    }

    #[test]
    fn test_default_value_converted_to_kind() {
        let mut ns = user_namespace();
        let m = Mutation {
            set: vec![NQuad::value(
                Subject::Blank("a".into()),
                "User.age",
                Value::Default("42".into()),
            )],
            del: Vec::new(),
        };
        stage(&ns, m, true).unwrap().commit(&mut ns);
        assert_eq!(ns.nodes[&1].values("User.age"), &[Value::Int(42)]);
    }

    #[test]
    fn test_unknown_predicate_without_auto_schema() {
        let ns = Namespace::default();
        let m = Mutation {
            set: vec![NQuad::value(
                Subject::Blank("a".into()),
                "Thing.name",
                Value::Str("x".into()),
            )],
            del: Vec::new(),
        };
        assert!(stage(&ns, m.clone(), false).is_err());
        let staged = stage(&ns, m, true).unwrap();
        assert_eq!(staged.predicates[0].kind, PredicateKind::String);
    }

    #[test]
    fn test_delete_node_then_rewrite_same_unique_value() {
        let mut ns = user_namespace();
        stage(&ns, create_user("a", "1"), true).unwrap().commit(&mut ns);
        let m = Mutation {
            set: vec![NQuad::value(Subject::Uid(1), "User.clerk_id", Value::Str("1".into()))],
            del: vec![NQuad::delete_node(1)],
        };
        stage(&ns, m, true).unwrap().commit(&mut ns);
        assert_eq!(ns.nodes[&1].values("User.clerk_id").len(), 1);
        assert!(!ns.nodes[&1].has(TYPE_PREDICATE));

        stage(&ns, Mutation { set: Vec::new(), del: vec![NQuad::delete_node(1)] }, true)
            .unwrap()
            .commit(&mut ns);
        assert!(ns.nodes.is_empty());
    }
}
