//! Engine and namespace handles
//!
//! An [`Engine`] owns one storage backend. Every call into the backend goes
//! through [`EngineInner::call`], which checks that the engine is open, takes
//! a permit from the pool and races the call against the caller's
//! [`Context`].

use std::collections::HashSet;
use std::future::Future;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flate2::read::GzDecoder;
use parking_lot::RwLock;
use recgraph_core::{
    Context, EngineConfig, GraphEngine, LoadStats, Mutation, RecgraphError, Result, SchemaChange,
    DEFAULT_NAMESPACE,
};
use recgraph_query::QueryParams;
use recgraph_store::rdf::parse_schema;
use recgraph_store::MemoryStore;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::crud::{self, Identifier};
use crate::record::{Record, RecordMeta};
use crate::schema::{DescriptorCache, TypeDescriptor};

// ============================================================================
// Shared state
// ============================================================================

pub(crate) struct EngineInner {
    store: Arc<dyn GraphEngine>,
    config: EngineConfig,
    descriptors: DescriptorCache,
    /// `(namespace, type)` pairs whose schema has been applied
    applied: RwLock<HashSet<(u64, &'static str)>>,
    permits: Semaphore,
    closed: AtomicBool,
}

impl EngineInner {
    /// Route a lifecycle event to the configured subscriber
    fn emit(&self, event: impl FnOnce()) {
        match &self.config.logger {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, event),
            None => event(),
        }
    }

    async fn call<T, F>(&self, ctx: &Context, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(RecgraphError::Closed);
        }
        let _permit = ctx
            .run(async {
                self.permits
                    .acquire()
                    .await
                    .map_err(|_| RecgraphError::Closed)
            })
            .await?;
        ctx.run(fut).await
    }

    pub(crate) fn descriptor(&self, meta: fn() -> RecordMeta) -> Result<Arc<TypeDescriptor>> {
        self.descriptors.get(meta)
    }

    pub(crate) async fn query(&self, ctx: &Context, ns: u64, dql: &str) -> Result<serde_json::Value> {
        self.call(ctx, self.store.query(ns, dql)).await
    }

    pub(crate) async fn mutate(
        &self,
        ctx: &Context,
        ns: u64,
        mutation: Mutation,
    ) -> Result<std::collections::HashMap<String, u64>> {
        self.call(ctx, self.store.mutate(ns, mutation)).await
    }

    /// Apply the schema of a type and every type reachable from it, once per namespace
    pub(crate) async fn ensure_schema(
        &self,
        ctx: &Context,
        ns: u64,
        descriptor: &Arc<TypeDescriptor>,
    ) -> Result<()> {
        let mut pending = vec![Arc::clone(descriptor)];
        let mut seen = HashSet::new();
        let mut change = SchemaChange::default();
        let mut names = Vec::new();

        while let Some(current) = pending.pop() {
            if !seen.insert(current.name())
                || self.applied.read().contains(&(ns, current.name()))
            {
                continue;
            }
            for nested in current.nested() {
                pending.push(self.descriptors.get(nested)?);
            }
            let derived = current.schema_change()?;
            change.predicates.extend(derived.predicates);
            change.types.extend(derived.types);
            names.push(current.name());
        }

        if change.is_empty() {
            return Ok(());
        }
        self.call(ctx, self.store.alter_schema(ns, &change)).await?;
        self.emit(|| debug!("Applied schema for {:?} in namespace {}", names, ns));
        self.applied
            .write()
            .extend(names.into_iter().map(|name| (ns, name)));
        Ok(())
    }

    /// Fail with `type not found` unless the namespace declares `type_name`
    pub(crate) async fn require_type(&self, ctx: &Context, ns: u64, type_name: &'static str) -> Result<()> {
        if self.applied.read().contains(&(ns, type_name)) {
            return Ok(());
        }
        let schema = self.call(ctx, self.store.schema(ns)).await?;
        if schema.type_def(type_name).is_none() {
            return Err(RecgraphError::TypeNotFound(type_name.to_string()));
        }
        Ok(())
    }

    async fn load(&self, ctx: &Context, ns: u64, schema_path: &Path, rdf_path: &Path) -> Result<LoadStats> {
        let schema = ctx.run(read_text(schema_path)).await?;
        let rdf = ctx.run(read_text(rdf_path)).await?;
        let stats = self.call(ctx, self.store.load(ns, &schema, &rdf)).await?;
        self.emit(|| {
            info!(
                "Loaded {} N-Quad(s), {} predicate(s), {} type(s) into namespace {}",
                stats.nquads, stats.predicates, stats.types, ns
            )
        });
        Ok(stats)
    }
}

/// Read a text file, gunzipping it when the name ends in `.gz`
async fn read_text(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        return tokio::task::spawn_blocking(move || -> Result<String> {
            let mut text = String::new();
            GzDecoder::new(bytes.as_slice()).read_to_string(&mut text)?;
            Ok(text)
        })
        .await
        .map_err(RecgraphError::engine)?;
    }
    String::from_utf8(bytes)
        .map_err(|e| RecgraphError::Codec(format!("{} is not UTF-8: {e}", path.display())))
}

// ============================================================================
// Engine
// ============================================================================

/// Handle to an open storage backend
///
/// Cheap to clone; clones share the backend, caches and call pool. Record
/// operations on the engine itself run in namespace 0.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Open the embedded store under `config.directory`
    pub fn open(config: EngineConfig) -> Result<Self> {
        let store = MemoryStore::open(&config)?;
        Self::with_store(config, Arc::new(store))
    }

    /// Wrap an arbitrary backend
    pub fn with_store(config: EngineConfig, store: Arc<dyn GraphEngine>) -> Result<Self> {
        config.validate()?;
        let inner = EngineInner {
            store,
            descriptors: DescriptorCache::new(),
            applied: RwLock::new(HashSet::new()),
            permits: Semaphore::new(config.pool_size),
            closed: AtomicBool::new(false),
            config,
        };
        inner.emit(|| info!("Opened engine at {}", inner.config.directory.display()));
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Flush and release the backend; later calls fail with `engine is closed`
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.permits.close();
        self.inner.store.close().await?;
        self.inner
            .emit(|| info!("Closed engine at {}", self.inner.config.directory.display()));
        Ok(())
    }

    /// Remove every namespace's data and schema
    pub async fn drop_all(&self, ctx: &Context) -> Result<()> {
        self.inner.call(ctx, self.inner.store.drop_all()).await?;
        self.inner.applied.write().clear();
        self.inner.emit(|| info!("Dropped all data"));
        Ok(())
    }

    /// Bulk-load a schema file and an RDF file into namespace 0
    pub async fn load(
        &self,
        ctx: &Context,
        schema_path: impl AsRef<Path>,
        rdf_path: impl AsRef<Path>,
    ) -> Result<LoadStats> {
        self.default_namespace()
            .load(ctx, schema_path, rdf_path)
            .await
    }

    /// Allocate a new namespace
    pub async fn create_namespace(&self, ctx: &Context) -> Result<Namespace> {
        let id = self.inner.call(ctx, self.inner.store.create_namespace()).await?;
        self.inner.emit(|| info!("Created namespace {}", id));
        Ok(self.handle(id))
    }

    /// Handle to an existing namespace
    pub async fn namespace(&self, ctx: &Context, id: u64) -> Result<Namespace> {
        if !self
            .inner
            .call(ctx, self.inner.store.namespace_exists(id))
            .await?
        {
            return Err(RecgraphError::NamespaceNotFound(id));
        }
        Ok(self.handle(id))
    }

    /// Namespace 0
    pub fn default_namespace(&self) -> Namespace {
        self.handle(DEFAULT_NAMESPACE)
    }

    fn handle(&self, id: u64) -> Namespace {
        Namespace {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Run raw DQL against namespace 0
    pub async fn query(&self, ctx: &Context, dql: &str) -> Result<serde_json::Value> {
        self.inner.query(ctx, DEFAULT_NAMESPACE, dql).await
    }

    pub async fn create<T: Record>(&self, ctx: &Context, value: &T) -> Result<(u64, T)> {
        crud::create(&self.inner, ctx, DEFAULT_NAMESPACE, value).await
    }

    pub async fn create_many<T: Record>(&self, ctx: &Context, values: &[T]) -> Result<(Vec<u64>, Vec<T>)> {
        crud::create_many(&self.inner, ctx, DEFAULT_NAMESPACE, values).await
    }

    pub async fn get<T: Record>(&self, ctx: &Context, id: impl Into<Identifier>) -> Result<(u64, T)> {
        crud::get(&self.inner, ctx, DEFAULT_NAMESPACE, id.into()).await
    }

    pub async fn upsert<T: Record>(&self, ctx: &Context, value: &T) -> Result<(u64, T, bool)> {
        crud::upsert(&self.inner, ctx, DEFAULT_NAMESPACE, value).await
    }

    pub async fn update<T: Record>(&self, ctx: &Context, value: &T) -> Result<T> {
        crud::update(&self.inner, ctx, DEFAULT_NAMESPACE, value).await
    }

    pub async fn delete<T: Record>(&self, ctx: &Context, id: impl Into<Identifier>) -> Result<(u64, T)> {
        crud::delete(&self.inner, ctx, DEFAULT_NAMESPACE, id.into()).await
    }

    pub async fn query_records<T: Record>(
        &self,
        ctx: &Context,
        params: &QueryParams,
    ) -> Result<(Vec<u64>, Vec<T>)> {
        crud::query(&self.inner, ctx, DEFAULT_NAMESPACE, params).await
    }
}

// ============================================================================
// Namespace
// ============================================================================

/// Handle scoping every operation to one namespace
#[derive(Clone)]
pub struct Namespace {
    id: u64,
    inner: Arc<EngineInner>,
}

impl Namespace {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run raw DQL, returning the engine's JSON response
    pub async fn query(&self, ctx: &Context, dql: &str) -> Result<serde_json::Value> {
        self.inner.query(ctx, self.id, dql).await
    }

    /// Remove this namespace's data, keeping its schema
    pub async fn drop_data(&self, ctx: &Context) -> Result<()> {
        self.inner.call(ctx, self.inner.store.drop_data(self.id)).await?;
        self.inner
            .emit(|| info!("Dropped data of namespace {}", self.id));
        Ok(())
    }

    /// Apply a DQL schema document
    pub async fn alter_schema(&self, ctx: &Context, schema: &str) -> Result<()> {
        let change = parse_schema(schema)?;
        self.inner
            .call(ctx, self.inner.store.alter_schema(self.id, &change))
            .await?;
        self.inner.emit(|| {
            debug!(
                "Altered schema of namespace {}: {} predicate(s), {} type(s)",
                self.id,
                change.predicates.len(),
                change.types.len()
            )
        });
        Ok(())
    }

    /// Bulk-load a schema file and an RDF file; `.gz` files are decompressed
    pub async fn load(
        &self,
        ctx: &Context,
        schema_path: impl AsRef<Path>,
        rdf_path: impl AsRef<Path>,
    ) -> Result<LoadStats> {
        self.inner
            .load(ctx, self.id, schema_path.as_ref(), rdf_path.as_ref())
            .await
    }

    pub async fn create<T: Record>(&self, ctx: &Context, value: &T) -> Result<(u64, T)> {
        crud::create(&self.inner, ctx, self.id, value).await
    }

    pub async fn create_many<T: Record>(&self, ctx: &Context, values: &[T]) -> Result<(Vec<u64>, Vec<T>)> {
        crud::create_many(&self.inner, ctx, self.id, values).await
    }

    pub async fn get<T: Record>(&self, ctx: &Context, id: impl Into<Identifier>) -> Result<(u64, T)> {
        crud::get(&self.inner, ctx, self.id, id.into()).await
    }

    pub async fn upsert<T: Record>(&self, ctx: &Context, value: &T) -> Result<(u64, T, bool)> {
        crud::upsert(&self.inner, ctx, self.id, value).await
    }

    pub async fn update<T: Record>(&self, ctx: &Context, value: &T) -> Result<T> {
        crud::update(&self.inner, ctx, self.id, value).await
    }

    pub async fn delete<T: Record>(&self, ctx: &Context, id: impl Into<Identifier>) -> Result<(u64, T)> {
        crud::delete(&self.inner, ctx, self.id, id.into()).await
    }

    pub async fn query_records<T: Record>(
        &self,
        ctx: &Context,
        params: &QueryParams,
    ) -> Result<(Vec<u64>, Vec<T>)> {
        crud::query(&self.inner, ctx, self.id, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn engine() -> Engine {
        Engine::with_store(
            EngineConfig::new("mem").with_pool_size(2),
            Arc::new(MemoryStore::in_memory(true, 1)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_closed_engine_rejects_calls() {
        let engine = engine();
        let ctx = Context::background();
        engine.close().await.unwrap();
        engine.close().await.unwrap();
        assert!(engine.is_closed());
        let err = engine.query(&ctx, "{ q(func: has(a)) { uid } }").await.unwrap_err();
        assert!(matches!(err, RecgraphError::Closed));
        assert_eq!(err.to_string(), "engine is closed");
    }

    #[tokio::test]
    async fn test_namespaces() {
        let engine = engine();
        let ctx = Context::background();
        let ns = engine.create_namespace(&ctx).await.unwrap();
        assert_ne!(ns.id(), DEFAULT_NAMESPACE);
        assert_eq!(engine.namespace(&ctx, ns.id()).await.unwrap().id(), ns.id());
        assert!(matches!(
            engine.namespace(&ctx, 999).await,
            Err(RecgraphError::NamespaceNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let engine = engine();
        let ctx = Context::background();
        ctx.cancel();
        let err = engine.query(&ctx, "{ q(func: has(a)) { uid } }").await.unwrap_err();
        assert!(err.is_cancellation());

        let ctx = Context::with_timeout(Duration::from_secs(5));
        assert!(engine.query(&ctx, "{ q(func: has(a)) { uid } }").await.is_ok());
    }

    #[tokio::test]
    async fn test_alter_schema_and_raw_query() {
        let engine = engine();
        let ctx = Context::background();
        let ns = engine.default_namespace();
        ns.alter_schema(&ctx, "name: string @index(term) .\ntype Person {\n  name\n}\n")
            .await
            .unwrap();
        ns.query(&ctx, "{ q(func: anyofterms(name, \"x\")) { uid } }")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_load_plain_and_gzip() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("s.schema");
        std::fs::write(&schema, "name: string @index(exact) .\n").unwrap();

        let rdf = dir.path().join("d.rdf.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(b"_:a <name> \"alice\" .\n_:b <name> \"bob\" .\n")
            .unwrap();
        std::fs::write(&rdf, encoder.finish().unwrap()).unwrap();

        let engine = engine();
        let ctx = Context::background();
        let stats = engine.load(&ctx, &schema, &rdf).await.unwrap();
        assert_eq!(stats.nquads, 2);
        assert_eq!(stats.nodes, 2);

        let out = engine
            .query(&ctx, "{ q(func: eq(name, \"bob\")) { name } }")
            .await
            .unwrap();
        assert_eq!(out["q"][0]["name"], "bob");
    }
}
