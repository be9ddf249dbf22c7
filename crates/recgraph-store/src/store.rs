//! In-memory implementation of the storage contract
//!
//! All namespaces live behind one `RwLock`. Queries take the read lock;
//! mutations, schema changes and loads take the write lock, which makes each
//! mutation atomic with respect to readers. A JSON snapshot of the whole
//! store is written to the data directory on close and read back on open.
//! A store dropped with unsaved changes writes the snapshot from `Drop`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use recgraph_core::{
    EngineConfig, GraphEngine, LoadStats, Mutation, NQuad, Object, RecgraphError, Result,
    SchemaChange, DEFAULT_NAMESPACE,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStats, QueryCache};
use crate::dql::evaluate;
use crate::graph::Namespace;
use crate::mutation::stage;
use crate::rdf::{parse_nquads, parse_schema};

/// Snapshot file written inside the data directory
pub const SNAPSHOT_FILE: &str = "recgraph.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct State {
    namespaces: BTreeMap<u64, Namespace>,
    next_namespace: u64,
}

impl Default for State {
    fn default() -> Self {
        let mut namespaces = BTreeMap::new();
        namespaces.insert(DEFAULT_NAMESPACE, Namespace::default());
        Self {
            namespaces,
            next_namespace: DEFAULT_NAMESPACE + 1,
        }
    }
}

/// Embedded graph store
pub struct MemoryStore {
    directory: Option<PathBuf>,
    auto_schema: bool,
    state: RwLock<State>,
    cache: QueryCache,
    closed: AtomicBool,
    /// Set by every write since the last snapshot
    dirty: AtomicBool,
}

impl MemoryStore {
    /// Open a store persisted under `config.directory`
    pub fn open(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.directory)?;

        let snapshot = config.directory.join(SNAPSHOT_FILE);
        let state = if snapshot.exists() {
            let bytes = std::fs::read(&snapshot)?;
            let state: State = serde_json::from_slice(&bytes)?;
            debug!(
                "Loaded snapshot {} with {} namespace(s)",
                snapshot.display(),
                state.namespaces.len()
            );
            state
        } else {
            State::default()
        };

        Ok(Self {
            directory: Some(config.directory.clone()),
            auto_schema: config.auto_schema,
            state: RwLock::new(state),
            cache: QueryCache::new(config.cache_size_mb),
            closed: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
        })
    }

    /// Volatile store that never touches the filesystem
    pub fn in_memory(auto_schema: bool, cache_size_mb: u64) -> Self {
        Self {
            directory: None,
            auto_schema,
            state: RwLock::new(State::default()),
            cache: QueryCache::new(cache_size_mb),
            closed: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
        }
    }

    /// Data directory, if persistent
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Parsed-query cache statistics
    pub fn cache_stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(RecgraphError::Closed)
        } else {
            Ok(())
        }
    }

    fn read<R>(&self, ns: u64, f: impl FnOnce(&Namespace) -> Result<R>) -> Result<R> {
        self.ensure_open()?;
        let state = self.state.read();
        let namespace = state
            .namespaces
            .get(&ns)
            .ok_or(RecgraphError::NamespaceNotFound(ns))?;
        f(namespace)
    }

    fn write<R>(&self, ns: u64, f: impl FnOnce(&mut Namespace) -> Result<R>) -> Result<R> {
        self.ensure_open()?;
        let mut state = self.state.write();
        let namespace = state
            .namespaces
            .get_mut(&ns)
            .ok_or(RecgraphError::NamespaceNotFound(ns))?;
        self.dirty.store(true, Ordering::Release);
        f(namespace)
    }

    /// Whether writes happened since the last snapshot
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Write the snapshot file, replacing any previous one
    pub fn persist(&self) -> Result<()> {
        let Some(dir) = &self.directory else {
            return Ok(());
        };
        let bytes = {
            let state = self.state.read();
            self.dirty.store(false, Ordering::Release);
            serde_json::to_vec(&*state)?
        };
        let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, dir.join(SNAPSHOT_FILE))?;
        Ok(())
    }

    /// Convert literal values to their declared kinds, dropping the ones that
    /// do not convert
    fn coerce_for_load(ns: &Namespace, quads: Vec<NQuad>) -> (Vec<NQuad>, usize) {
        let mut skipped = 0;
        let kept = quads
            .into_iter()
            .filter_map(|mut quad| {
                let kind = ns.predicate(&quad.predicate).map(|p| p.kind);
                if let (Some(kind), Object::Value(value)) = (kind, &quad.object) {
                    match value.clone().convert(kind) {
                        Ok(converted) => quad.object = Object::Value(converted),
                        Err(e) => {
                            debug!("Skipping <{}> value: {}", quad.predicate, e);
                            skipped += 1;
                            return None;
                        }
                    }
                }
                Some(quad)
            })
            .collect();
        (kept, skipped)
    }
}

#[async_trait]
impl GraphEngine for MemoryStore {
    async fn alter_schema(&self, ns: u64, change: &SchemaChange) -> Result<()> {
        self.write(ns, |namespace| {
            namespace.alter(change);
            Ok(())
        })
    }

    async fn schema(&self, ns: u64) -> Result<SchemaChange> {
        self.read(ns, |namespace| Ok(namespace.schema()))
    }

    async fn mutate(&self, ns: u64, mutation: Mutation) -> Result<HashMap<String, u64>> {
        let auto_schema = self.auto_schema;
        self.write(ns, |namespace| {
            let staged = stage(namespace, mutation, auto_schema)?;
            let assigned = staged.assigned.clone();
            staged.commit(namespace);
            Ok(assigned)
        })
    }

    async fn query(&self, ns: u64, dql: &str) -> Result<serde_json::Value> {
        self.ensure_open()?;
        let query = self.cache.get_or_parse(dql)?;
        self.read(ns, |namespace| evaluate(namespace, &query))
    }

    async fn create_namespace(&self) -> Result<u64> {
        self.ensure_open()?;
        let mut state = self.state.write();
        let id = state.next_namespace;
        state.next_namespace += 1;
        state.namespaces.insert(id, Namespace::default());
        self.dirty.store(true, Ordering::Release);
        Ok(id)
    }

    async fn namespace_exists(&self, ns: u64) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.state.read().namespaces.contains_key(&ns))
    }

    async fn drop_all(&self) -> Result<()> {
        self.ensure_open()?;
        *self.state.write() = State::default();
        self.dirty.store(true, Ordering::Release);
        self.cache.clear();
        Ok(())
    }

    async fn drop_data(&self, ns: u64) -> Result<()> {
        self.write(ns, |namespace| {
            namespace.drop_data();
            Ok(())
        })
    }

    async fn load(&self, ns: u64, schema: &str, rdf: &str) -> Result<LoadStats> {
        let change = parse_schema(schema)?;
        let quads = parse_nquads(rdf)?;
        let auto_schema = self.auto_schema;

        self.write(ns, |namespace| {
            namespace.alter(&change);
            let (quads, skipped) = Self::coerce_for_load(namespace, quads);
            let nquads = quads.len();
            let staged = stage(
                namespace,
                Mutation {
                    set: quads,
                    del: Vec::new(),
                },
                auto_schema,
            )?;
            let nodes = staged.allocated();
            staged.commit(namespace);
            if skipped > 0 {
                debug!("Skipped {} unconvertible value(s) during load", skipped);
            }
            Ok(LoadStats {
                predicates: change.predicates.len(),
                types: change.types.len(),
                nquads,
                nodes,
            })
        })
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.persist()?;
        if let Some(dir) = &self.directory {
            info!("Closed store at {}", dir.display());
        }
        Ok(())
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        if self.closed.load(Ordering::Acquire) || !self.is_dirty() {
            return;
        }
        let Some(dir) = self.directory.clone().filter(|d| d.is_dir()) else {
            return;
        };
        warn!("Store at {} dropped without close, writing snapshot", dir.display());
        if let Err(e) = self.persist() {
            error!("Failed to write snapshot at {}: {}", dir.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recgraph_core::{PredicateKind, SchemaUpdate, Subject, TypeUpdate, Value, TYPE_PREDICATE};

    fn user_schema() -> SchemaChange {
        SchemaChange {
            predicates: vec![
                SchemaUpdate::new("User.name", PredicateKind::String),
                SchemaUpdate::new("User.age", PredicateKind::Int),
            ],
            types: vec![TypeUpdate {
                name: "User".into(),
                fields: vec!["User.name".into(), "User.age".into()],
            }],
        }
    }

    fn create_user(name: &str, age: i64) -> Mutation {
        let subject = Subject::Blank("u".into());
        Mutation {
            set: vec![
                NQuad::value(subject.clone(), TYPE_PREDICATE, Value::Str("User".into())),
                NQuad::value(subject.clone(), "User.name", Value::Str(name.into())),
                NQuad::value(subject, "User.age", Value::Int(age)),
            ],
            del: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = MemoryStore::in_memory(true, 1);
        let ns1 = store.create_namespace().await.unwrap();
        assert_ne!(ns1, DEFAULT_NAMESPACE);

        store.alter_schema(ns1, &user_schema()).await.unwrap();
        store.mutate(ns1, create_user("B", 20)).await.unwrap();

        let dql = "{ me(func: has(User.name)) { uid User.name User.age } }";
        let out = store.query(ns1, dql).await.unwrap();
        assert_eq!(out["me"][0]["User.name"], "B");
        assert_eq!(out["me"][0]["User.age"], 20);

        let out = store.query(DEFAULT_NAMESPACE, dql).await.unwrap();
        assert_eq!(out["me"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_unknown_namespace() {
        let store = MemoryStore::in_memory(true, 1);
        let err = store.schema(42).await.unwrap_err();
        assert!(matches!(err, RecgraphError::NamespaceNotFound(42)));
        assert!(!store.namespace_exists(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path());

        let store = MemoryStore::open(&config).unwrap();
        store.alter_schema(0, &user_schema()).await.unwrap();
        let assigned = store.mutate(0, create_user("A", 10)).await.unwrap();
        store.close().await.unwrap();
        assert!(matches!(store.schema(0).await, Err(RecgraphError::Closed)));

        let reopened = MemoryStore::open(&config).unwrap();
        let dql = format!("{{ q(func: uid({})) {{ User.name }} }}", assigned["u"]);
        let out = reopened.query(0, &dql).await.unwrap();
        assert_eq!(out["q"][0]["User.name"], "A");
    }

    #[tokio::test]
    async fn test_drop_without_close_keeps_writes() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path());

        let assigned = {
            let store = MemoryStore::open(&config).unwrap();
            assert!(!store.is_dirty());
            store.alter_schema(0, &user_schema()).await.unwrap();
            let assigned = store.mutate(0, create_user("A", 10)).await.unwrap();
            assert!(store.is_dirty());
            assigned
        };
        assert!(dir.path().join(SNAPSHOT_FILE).exists());

        let reopened = MemoryStore::open(&config).unwrap();
        let dql = format!("{{ q(func: uid({})) {{ User.name }} }}", assigned["u"]);
        let out = reopened.query(0, &dql).await.unwrap();
        assert_eq!(out["q"][0]["User.name"], "A");

        reopened.persist().unwrap();
        assert!(!reopened.is_dirty());
    }

    #[tokio::test]
    async fn test_drop_all_and_drop_data() {
        let store = MemoryStore::in_memory(true, 1);
        let ns1 = store.create_namespace().await.unwrap();
        store.alter_schema(0, &user_schema()).await.unwrap();
        store.mutate(0, create_user("A", 10)).await.unwrap();

        store.drop_data(0).await.unwrap();
        let out = store.query(0, "{ q(func: type(\"User\")) { uid } }").await.unwrap();
        assert_eq!(out["q"], serde_json::json!([]));
        assert!(store.schema(0).await.unwrap().predicate("User.name").is_some());

        store.drop_all().await.unwrap();
        assert!(store.schema(0).await.unwrap().is_empty());
        assert!(!store.namespace_exists(ns1).await.unwrap());
    }

    #[tokio::test]
    async fn test_load_schema_and_rdf() {
        let store = MemoryStore::in_memory(true, 1);
        let schema = "name: string @index(term) .\nrating: int .\nstarring: [uid] .";
        let rdf = "_:a <name> \"Alien\" .\n_:a <rating> \"8\" .\n_:a <starring> _:b .\n_:b <name> \"Ripley\" .\n_:a <rating> \"bad\"^^<xs:string> .";
        let stats = store.load(0, schema, rdf).await.unwrap();
        assert_eq!(stats.predicates, 3);
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.nquads, 4);

        let out = store
            .query(0, "{ q(func: allofterms(name, \"alien\")) { name rating starring { name } } }")
            .await
            .unwrap();
        assert_eq!(out["q"][0]["rating"], 8);
        assert_eq!(out["q"][0]["starring"][0]["name"], "Ripley");
    }
}
