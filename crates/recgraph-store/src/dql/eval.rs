//! Query evaluation against a namespace snapshot
//!
//! Functions are compiled once per block into [`Matcher`]s and then tested
//! node by node. Output follows the engine's JSON conventions: hex uids,
//! RFC 3339 datetimes, GeoJSON geometries, base64 binaries and arrays for
//! list predicates and vectors.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::SecondsFormat;
use recgraph_core::geo::wkb_to_geojson;
use recgraph_core::value::{decode_datetime, unpack_f32};
use recgraph_core::{format_uid, parse_uid, PredicateKind, RecgraphError, Result, Value, TYPE_PREDICATE};
use regex::Regex;
use serde_json::{Map, Number, Value as Json};

use super::parser::{Arg, Block, FilterExpr, Func, Query, Selection};
use crate::graph::{Namespace, Node};
use crate::index::{self, compare, fulltext_tokens, term_tokens, text_of};

/// Evaluate every block of a parsed query
pub fn evaluate(ns: &Namespace, query: &Query) -> Result<Json> {
    let mut out = Map::new();
    for block in &query.blocks {
        let rows = Evaluator { ns }.block(block)?;
        out.insert(block.name.clone(), Json::Array(rows));
    }
    Ok(Json::Object(out))
}

// ============================================================================
// Matchers
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Eq,
    Le,
    Ge,
    Lt,
    Gt,
}

impl CmpOp {
    fn accepts(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Gt => ord == Ordering::Greater,
        }
    }
}

/// A compiled function
enum Matcher {
    Type(String),
    Has(String),
    Uids(Vec<u64>),
    Compare {
        attr: String,
        op: CmpOp,
        values: Vec<Value>,
    },
    Tokens {
        attr: String,
        tokens: BTreeSet<String>,
        all: bool,
        fulltext: bool,
    },
    Regex {
        attr: String,
        re: Regex,
    },
    /// Nearest neighbours, closest first
    Nearest(Vec<u64>),
}

impl Matcher {
    fn matches(&self, uid: u64, node: Option<&Node>) -> bool {
        match self {
            Matcher::Uids(uids) => return uids.contains(&uid),
            Matcher::Nearest(uids) => return uids.contains(&uid),
            _ => {}
        }
        let Some(node) = node else {
            return false;
        };
        match self {
            Matcher::Type(name) => node.has_type(name),
            Matcher::Has(attr) => node.has(attr),
            Matcher::Compare { attr, op, values } => node.values(attr).iter().any(|held| {
                values
                    .iter()
                    .any(|lit| compare(held, lit).is_some_and(|ord| op.accepts(ord)))
            }),
            Matcher::Tokens {
                attr,
                tokens,
                all,
                fulltext,
            } => node.values(attr).iter().filter_map(text_of).any(|text| {
                let held = if *fulltext {
                    fulltext_tokens(text)
                } else {
                    term_tokens(text)
                };
                if *all {
                    tokens.iter().all(|t| held.contains(t))
                } else {
                    tokens.iter().any(|t| held.contains(t))
                }
            }),
            Matcher::Regex { attr, re } => node
                .values(attr)
                .iter()
                .filter_map(text_of)
                .any(|text| re.is_match(text)),
            Matcher::Uids(_) | Matcher::Nearest(_) => false,
        }
    }
}

enum Cond {
    Leaf(Matcher),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
    Not(Box<Cond>),
}

impl Cond {
    fn matches(&self, uid: u64, node: Option<&Node>) -> bool {
        match self {
            Cond::Leaf(m) => m.matches(uid, node),
            Cond::And(a, b) => a.matches(uid, node) && b.matches(uid, node),
            Cond::Or(a, b) => a.matches(uid, node) || b.matches(uid, node),
            Cond::Not(a) => !a.matches(uid, node),
        }
    }
}

fn unsupported(msg: impl std::fmt::Display) -> RecgraphError {
    RecgraphError::engine(msg)
}

fn attr_arg(func: &Func) -> Result<String> {
    func.args
        .first()
        .and_then(Arg::text)
        .map(str::to_string)
        .ok_or_else(|| unsupported(format!("function {} needs a predicate argument", func.name)))
}

fn text_arg(func: &Func, idx: usize) -> Result<&str> {
    func.args
        .get(idx)
        .and_then(Arg::text)
        .ok_or_else(|| unsupported(format!("function {} is missing argument {}", func.name, idx + 1)))
}

/// Flatten literal arguments from position 1 on, expanding `[a, b]` lists
fn literal_args(func: &Func) -> Vec<&str> {
    let mut out = Vec::new();
    for arg in func.args.iter().skip(1) {
        match arg {
            Arg::List(items) => out.extend(items.iter().filter_map(Arg::text)),
            other => out.extend(other.text()),
        }
    }
    out
}

// ============================================================================
// Evaluator
// ============================================================================

struct Evaluator<'a> {
    ns: &'a Namespace,
}

impl<'a> Evaluator<'a> {
    fn kind_of(&self, attr: &str) -> Option<PredicateKind> {
        if attr == TYPE_PREDICATE {
            return Some(PredicateKind::String);
        }
        self.ns.predicate(attr).map(|p| p.kind)
    }

    fn require_tokenizer(&self, attr: &str, tokenizer: &str) -> Result<()> {
        let indexed = self
            .ns
            .predicate(attr)
            .is_some_and(|p| p.has_tokenizer(tokenizer));
        if indexed {
            Ok(())
        } else {
            Err(unsupported(format!(
                "Attribute {attr} is not indexed with type {tokenizer}"
            )))
        }
    }

    fn compile(&self, func: &Func) -> Result<Matcher> {
        let op = match func.name.as_str() {
            "type" => return Ok(Matcher::Type(text_arg(func, 0)?.to_string())),
            "has" => return Ok(Matcher::Has(attr_arg(func)?)),
            "uid" => {
                let mut uids = Vec::new();
                for arg in &func.args {
                    let items = match arg {
                        Arg::List(items) => items.iter().collect::<Vec<_>>(),
                        other => vec![other],
                    };
                    for item in items {
                        let text = item
                            .text()
                            .ok_or_else(|| unsupported("uid() takes uid literals"))?;
                        uids.push(parse_uid(text)?);
                    }
                }
                return Ok(Matcher::Uids(uids));
            }
            "allofterms" | "anyofterms" | "alloftext" | "anyoftext" => {
                return self.compile_tokens(func)
            }
            "regexp" => {
                let attr = attr_arg(func)?;
                self.require_tokenizer(&attr, "trigram")?;
                let re = match func.args.get(1) {
                    Some(Arg::Regex { pattern, flags }) => index::compile_regex(pattern, flags)?,
                    _ => return Err(unsupported("regexp() expects /pattern/ as second argument")),
                };
                return Ok(Matcher::Regex { attr, re });
            }
            "similar_to" => return self.compile_similar_to(func),
            "eq" => CmpOp::Eq,
            "le" => CmpOp::Le,
            "ge" => CmpOp::Ge,
            "lt" => CmpOp::Lt,
            "gt" => CmpOp::Gt,
            other => return Err(unsupported(format!("unsupported function {other}"))),
        };

        let attr = attr_arg(func)?;
        let literals = literal_args(func);
        if literals.is_empty() {
            return Err(unsupported(format!("function {} needs a value", func.name)));
        }
        let values = match self.kind_of(&attr) {
            Some(kind) => literals
                .into_iter()
                .map(|l| Value::Default(l.to_string()).convert(kind))
                .collect::<Result<Vec<_>>>()?,
            // unknown predicate: nothing can match
            None => Vec::new(),
        };
        Ok(Matcher::Compare { attr, op, values })
    }

    fn compile_tokens(&self, func: &Func) -> Result<Matcher> {
        let attr = attr_arg(func)?;
        let fulltext = func.name.ends_with("text");
        let all = func.name.starts_with("all");
        self.require_tokenizer(&attr, if fulltext { "fulltext" } else { "term" })?;
        let text = text_arg(func, 1)?;
        let tokens = if fulltext {
            fulltext_tokens(text)
        } else {
            term_tokens(text)
        };
        Ok(Matcher::Tokens {
            attr,
            tokens,
            all,
            fulltext,
        })
    }

    fn compile_similar_to(&self, func: &Func) -> Result<Matcher> {
        let attr = attr_arg(func)?;
        let spec = self
            .ns
            .predicate(&attr)
            .and_then(|p| p.vector_specs.first())
            .ok_or_else(|| unsupported(format!("Attribute {attr} is not indexed with a vector index")))?;
        let metric = spec.metric().to_string();

        let top_k: usize = text_arg(func, 1)?
            .parse()
            .map_err(|_| unsupported("similar_to() expects an integer top k"))?;
        let query: Vec<f32> = match func.args.get(2) {
            Some(Arg::List(items)) => items
                .iter()
                .filter_map(Arg::text)
                .map(|t| t.parse::<f32>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| unsupported("similar_to() vector must hold numbers"))?,
            Some(arg) => {
                let text = arg
                    .text()
                    .ok_or_else(|| unsupported("similar_to() expects a vector literal"))?;
                serde_json::from_str(text)
                    .map_err(|e| unsupported(format!("invalid vector literal {text:?}: {e}")))?
            }
            None => return Err(unsupported("similar_to() is missing its vector")),
        };

        let mut scored: Vec<(f32, u64)> = Vec::new();
        for (uid, node) in &self.ns.nodes {
            for value in node.values(&attr) {
                if let Value::VFloat(bytes) = value {
                    let stored = unpack_f32(bytes)?;
                    if stored.len() == query.len() {
                        scored.push((index::distance(&metric, &query, &stored), *uid));
                    }
                }
            }
        }
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(top_k);
        Ok(Matcher::Nearest(scored.into_iter().map(|(_, uid)| uid).collect()))
    }

    fn compile_filter(&self, expr: &FilterExpr) -> Result<Cond> {
        Ok(match expr {
            FilterExpr::Func(f) => Cond::Leaf(self.compile(f)?),
            FilterExpr::And(a, b) => {
                Cond::And(Box::new(self.compile_filter(a)?), Box::new(self.compile_filter(b)?))
            }
            FilterExpr::Or(a, b) => {
                Cond::Or(Box::new(self.compile_filter(a)?), Box::new(self.compile_filter(b)?))
            }
            FilterExpr::Not(a) => Cond::Not(Box::new(self.compile_filter(a)?)),
        })
    }

    fn block(&self, block: &Block) -> Result<Vec<Json>> {
        let root = self.compile(&block.root)?;
        let mut uids: Vec<u64> = match &root {
            Matcher::Uids(uids) => {
                let mut uids = uids.clone();
                uids.sort_unstable();
                uids.dedup();
                uids
            }
            Matcher::Nearest(uids) => uids.clone(),
            m => self
                .ns
                .nodes
                .iter()
                .filter(|(uid, node)| m.matches(**uid, Some(*node)))
                .map(|(uid, _)| *uid)
                .collect(),
        };

        if let Some(filter) = &block.filter {
            let cond = self.compile_filter(filter)?;
            uids.retain(|uid| cond.matches(*uid, self.ns.nodes.get(uid)));
        }

        if !block.order.is_empty() {
            uids.sort_by(|a, b| {
                for order in &block.order {
                    let ord = self.order_key(*a, &order.attr, *b);
                    let ord = if order.desc { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = block.offset.unwrap_or(0);
        let first = block.first.unwrap_or(usize::MAX);
        let rows = uids
            .into_iter()
            .skip(offset)
            .take(first)
            .map(|uid| self.render(uid, &block.selections))
            .collect::<Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter(|row| !row.is_empty())
            .map(Json::Object)
            .collect())
    }

    /// Ordering between two nodes by `attr`; nodes lacking it sort last
    fn order_key(&self, a: u64, attr: &str, b: u64) -> Ordering {
        let first = |uid: u64| {
            self.ns
                .nodes
                .get(&uid)
                .and_then(|n| n.values(attr).first())
        };
        match (first(a), first(b)) {
            (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    fn render(&self, uid: u64, selections: &[Selection]) -> Result<Map<String, Json>> {
        let node = self.ns.nodes.get(&uid);
        let mut out = Map::new();

        for selection in selections {
            match selection {
                Selection::Uid { alias } => {
                    out.insert(alias.clone(), Json::String(format_uid(uid)));
                }
                Selection::ExpandAll { children } => {
                    let Some(node) = node else { continue };
                    for pred in self.ns.expand_predicates(node) {
                        if let Some(json) = self.forward(node, &pred, None, children.as_deref())? {
                            out.insert(pred, json);
                        }
                    }
                }
                Selection::Predicate {
                    alias,
                    name,
                    reverse,
                    filter,
                    children,
                } => {
                    let key = alias.clone().unwrap_or_else(|| {
                        if *reverse {
                            format!("~{name}")
                        } else {
                            name.clone()
                        }
                    });
                    let json = if *reverse {
                        self.reverse(uid, name, filter.as_ref(), children.as_deref())?
                    } else {
                        match node {
                            Some(node) => {
                                self.forward(node, name, filter.as_ref(), children.as_deref())?
                            }
                            None => None,
                        }
                    };
                    if let Some(json) = json {
                        out.insert(key, json);
                    }
                }
            }
        }

        Ok(out)
    }

    fn forward(
        &self,
        node: &Node,
        pred: &str,
        filter: Option<&FilterExpr>,
        children: Option<&[Selection]>,
    ) -> Result<Option<Json>> {
        let values = node.values(pred);
        if values.is_empty() {
            return Ok(None);
        }
        let schema = self.ns.predicate(pred);
        let list = pred == TYPE_PREDICATE || schema.is_some_and(|p| p.list);
        let is_edge = schema.map(|p| p.kind == PredicateKind::Uid).unwrap_or_else(|| {
            values.iter().all(|v| matches!(v, Value::Uid(_)))
        });

        if is_edge {
            let Some(children) = children else {
                return Ok(None);
            };
            let targets: Vec<u64> = node.edges(pred).collect();
            let objects = self.nested(targets, filter, children)?;
            if objects.is_empty() {
                return Ok(None);
            }
            return Ok(Some(if list {
                Json::Array(objects)
            } else {
                objects.into_iter().next().unwrap_or(Json::Null)
            }));
        }

        let mut rendered = values.iter().map(to_json).collect::<Result<Vec<_>>>()?;
        Ok(Some(if list {
            Json::Array(rendered)
        } else {
            rendered.swap_remove(0)
        }))
    }

    fn reverse(
        &self,
        uid: u64,
        pred: &str,
        filter: Option<&FilterExpr>,
        children: Option<&[Selection]>,
    ) -> Result<Option<Json>> {
        let Some(children) = children else {
            return Ok(None);
        };
        let sources: Vec<u64> = self
            .ns
            .nodes
            .iter()
            .filter(|(_, n)| n.edges(pred).any(|target| target == uid))
            .map(|(source, _)| *source)
            .collect();
        let objects = self.nested(sources, filter, children)?;
        Ok((!objects.is_empty()).then_some(Json::Array(objects)))
    }

    fn nested(
        &self,
        mut uids: Vec<u64>,
        filter: Option<&FilterExpr>,
        children: &[Selection],
    ) -> Result<Vec<Json>> {
        if let Some(filter) = filter {
            let cond = self.compile_filter(filter)?;
            uids.retain(|uid| cond.matches(*uid, self.ns.nodes.get(uid)));
        }
        let mut out = Vec::with_capacity(uids.len());
        for uid in uids {
            let row = self.render(uid, children)?;
            if !row.is_empty() {
                out.push(Json::Object(row));
            }
        }
        Ok(out)
    }
}

// ============================================================================
// Output encoding
// ============================================================================

/// Shortest decimal form of an `f32`, widened without binary noise
fn f32_json(f: f32) -> Json {
    f.to_string()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Json::Number)
        .unwrap_or(Json::Null)
}

/// Render a stored value as engine JSON
pub fn to_json(value: &Value) -> Result<Json> {
    Ok(match value {
        Value::Str(s) | Value::Default(s) => Json::String(s.clone()),
        Value::Int(i) => Json::from(*i),
        Value::Uid(u) => Json::String(format_uid(*u)),
        Value::Bool(b) => Json::Bool(*b),
        Value::Double(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        Value::VFloat(bytes) => Json::Array(unpack_f32(bytes)?.into_iter().map(f32_json).collect()),
        Value::Bytes(bytes) => Json::String(STANDARD.encode(bytes)),
        Value::DateTime(bytes) => Json::String(
            decode_datetime(bytes)?.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        ),
        Value::Geo(bytes) => wkb_to_geojson(bytes)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dql::parse;
    use recgraph_core::value::pack_f32;
    use recgraph_core::{SchemaChange, SchemaUpdate, TypeUpdate, VectorIndexSpec};

    fn fixture() -> Namespace {
        let mut name = SchemaUpdate::new("User.name", PredicateKind::String);
        name.tokenizers = vec!["term".into(), "trigram".into()];
        let mut bio = SchemaUpdate::new("User.bio", PredicateKind::String);
        bio.tokenizers = vec!["fulltext".into()];
        let mut vec = SchemaUpdate::new("User.vec", PredicateKind::VFloat);
        vec.vector_specs = vec![VectorIndexSpec::hnsw_cosine()];
        let mut friend = SchemaUpdate::new("User.friend", PredicateKind::Uid);
        friend.list = false;

        let mut ns = Namespace::default();
        ns.alter(&SchemaChange {
            predicates: vec![
                name,
                bio,
                vec,
                friend,
                SchemaUpdate::new("User.age", PredicateKind::Int),
            ],
            types: vec![TypeUpdate {
                name: "User".into(),
                fields: vec![
                    "User.name".into(),
                    "User.age".into(),
                    "User.bio".into(),
                    "User.vec".into(),
                    "User.friend".into(),
                ],
            }],
        });

        let people = [
            ("Alice", 30, "runs marathons", [1.0, 0.0]),
            ("Bob", 20, "likes graph databases", [0.0, 1.0]),
            ("Carol", 40, "running and cycling", [0.9, 0.1]),
        ];
        for (i, (n, age, bio, v)) in people.iter().enumerate() {
            let mut node = Node::default();
            node.set(TYPE_PREDICATE, Value::Str("User".into()), true);
            node.set("User.name", Value::Str(n.to_string()), false);
            node.set("User.age", Value::Int(*age), false);
            node.set("User.bio", Value::Str(bio.to_string()), false);
            node.set("User.vec", Value::VFloat(pack_f32(v)), false);
            ns.nodes.insert(i as u64 + 1, node);
        }
        if let Some(alice) = ns.nodes.get_mut(&1) {
            alice.set("User.friend", Value::Uid(2), false);
        }
        ns.next_uid = 4;
        ns
    }

    fn run(ns: &Namespace, dql: &str) -> Json {
        evaluate(ns, &parse(dql).unwrap()).unwrap()
    }

    fn names(json: &Json, block: &str) -> Vec<String> {
        json[block]
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["User.name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_type_root_with_filter_and_order() {
        let ns = fixture();
        let out = run(
            &ns,
            "{ q(func: type(\"User\"), orderdesc: User.age, first: 2) @filter(ge(User.age, 25)) { User.name } }",
        );
        assert_eq!(names(&out, "q"), vec!["Carol", "Alice"]);
    }

    #[test]
    fn test_expand_all_inlines_one_level() {
        let ns = fixture();
        let out = run(
            &ns,
            "{ obj(func: uid(1)) { gid: uid expand(_all_) { gid: uid expand(_all_) dgraph.type } dgraph.type } }",
        );
        let row = &out["obj"][0];
        assert_eq!(row["gid"], "0x1");
        assert_eq!(row["User.age"], 30);
        assert_eq!(row["dgraph.type"], serde_json::json!(["User"]));
        assert_eq!(row["User.friend"]["User.name"], "Bob");
        assert_eq!(row["User.vec"], serde_json::json!([1.0, 0.0]));
    }

    #[test]
    fn test_uid_edge_without_child_block_is_omitted() {
        let ns = fixture();
        let out = run(&ns, "{ obj(func: uid(1)) { expand(_all_) } }");
        assert!(out["obj"][0].get("User.friend").is_none());
    }

    #[test]
    fn test_reverse_edge() {
        let ns = fixture();
        let out = run(&ns, "{ obj(func: uid(2)) { fans: ~User.friend { User.name } } }");
        assert_eq!(out["obj"][0]["fans"][0]["User.name"], "Alice");
    }

    #[test]
    fn test_missing_uid_keeps_gid_only() {
        let ns = fixture();
        let out = run(&ns, "{ obj(func: uid(0x9)) { gid: uid expand(_all_) dgraph.type } }");
        assert_eq!(out["obj"][0], serde_json::json!({"gid": "0x9"}));
    }

    #[test]
    fn test_term_text_and_regexp() {
        let ns = fixture();
        let out = run(&ns, "{ q(func: anyofterms(User.name, \"bob carol\")) { User.name } }");
        assert_eq!(names(&out, "q"), vec!["Bob", "Carol"]);

        let out = run(&ns, "{ q(func: alloftext(User.bio, \"run\")) { User.name } }");
        assert_eq!(names(&out, "q"), vec!["Alice", "Carol"]);

        let out = run(&ns, "{ q(func: regexp(User.name, /^a/i)) { User.name } }");
        assert_eq!(names(&out, "q"), vec!["Alice"]);
    }

    #[test]
    fn test_unindexed_term_query_rejected() {
        let ns = fixture();
        let query = parse("{ q(func: allofterms(User.bio, \"graph\")) { uid } }").unwrap();
        let err = evaluate(&ns, &query).unwrap_err();
        assert!(err.to_string().contains("not indexed with type term"));
    }

    #[test]
    fn test_similar_to_orders_by_distance() {
        let ns = fixture();
        let out = run(
            &ns,
            "{ q(func: similar_to(User.vec, 2, \"[1.0, 0.05]\")) @filter(type(\"User\")) { User.name } }",
        );
        assert_eq!(names(&out, "q"), vec!["Alice", "Carol"]);
    }

    #[test]
    fn test_not_and_or() {
        let ns = fixture();
        let out = run(
            &ns,
            "{ q(func: has(User.name)) @filter(NOT eq(User.name, \"Bob\") AND (lt(User.age, 35) OR gt(User.age, 35))) { User.name } }",
        );
        assert_eq!(names(&out, "q"), vec!["Alice", "Carol"]);
    }

    #[test]
    fn test_to_json_encodings() {
        assert_eq!(to_json(&Value::Bytes(vec![1, 2, 3])).unwrap(), "AQID");
        assert_eq!(
            to_json(&Value::VFloat(pack_f32(&[0.1]))).unwrap(),
            serde_json::json!([0.1])
        );
    }
}
