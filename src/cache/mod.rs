//! Persistent, fingerprint-keyed storage of node values.
//!
//! A [`PersistentCache`] pairs a namespace with a [`CacheStore`] backend. Values
//! are keyed by node name and transitive fingerprint, so any change to a node
//! or anything upstream of it makes old entries unreachable without explicit
//! invalidation.

pub mod config;
pub mod fingerprint;
pub mod store;

#[cfg(feature = "file-cache")]
pub mod file_store;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

pub use config::{default_cache_dir, CacheBackend, CacheConfig};
#[cfg(feature = "file-cache")]
pub use file_store::FileCacheStore;
pub use fingerprint::{compute_fingerprints, Fingerprint};
pub use store::{CacheError, CacheKey, CacheStore, MemoryCacheStore};

use crate::composer::Composer;
use crate::domain::QualifiedName;
use crate::error::{ComposerError, ComposerResult};
use crate::graph::{assemble_lenient, traversal, NameResolver};

/// Hit and write counters of a cache handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

/// Namespaced handle to a cache backend. Cloning shares the backend and the
/// counters.
#[derive(Clone)]
pub struct PersistentCache {
    namespace: Arc<str>,
    store: Arc<dyn CacheStore>,
    counters: Arc<Counters>,
}

impl PersistentCache {
    pub fn new(namespace: impl Into<String>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            namespace: Arc::from(namespace.into()),
            store,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn memory(namespace: impl Into<String>) -> Self {
        Self::new(namespace, Arc::new(MemoryCacheStore::new()))
    }

    #[cfg(feature = "file-cache")]
    pub fn file(
        namespace: impl Into<String>,
        dir: impl AsRef<std::path::Path>,
    ) -> Result<Self, CacheError> {
        Ok(Self::new(namespace, Arc::new(FileCacheStore::new(dir)?)))
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        match &config.backend {
            CacheBackend::Memory => Ok(Self::memory(config.namespace.clone())),
            #[cfg(feature = "file-cache")]
            CacheBackend::File { dir } => Self::file(config.namespace.clone(), dir),
            #[cfg(not(feature = "file-cache"))]
            CacheBackend::File { .. } => Err(CacheError::Storage(
                "file cache backend requires the `file-cache` feature".to_string(),
            )),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Stored value for `key`. A corrupted entry is reported and treated as a
    /// miss; storing the recomputed value replaces it.
    pub fn lookup(&self, key: &CacheKey) -> Result<Option<Value>, CacheError> {
        let found = match self.store.get(&self.namespace, key) {
            Ok(found) => found,
            Err(CacheError::Corrupted(detail)) => {
                tracing::warn!(node = %key.name, %detail, "discarding corrupted cache entry");
                None
            }
            Err(e) => return Err(e),
        };
        let counter = if found.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(found)
    }

    pub fn contains(&self, key: &CacheKey) -> Result<bool, CacheError> {
        self.store.contains(&self.namespace, key)
    }

    pub fn store(&self, key: &CacheKey, value: &Value) -> Result<(), CacheError> {
        self.store.put(&self.namespace, key, value)?;
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(node = %key.name, fingerprint = %key.fingerprint, "cached value");
        Ok(())
    }

    pub fn invalidate(&self, names: &[QualifiedName]) -> Result<(), CacheError> {
        self.store.delete_names(&self.namespace, names)
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        self.store.clear(&self.namespace)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for PersistentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentCache")
            .field("namespace", &self.namespace)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Composer {
    /// Drop cached values of the named nodes and of everything downstream of
    /// them. Nodes upstream keep their entries. A no-op without a cache.
    pub fn cache_invalidate<I, S>(&self, names: I) -> ComposerResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(cache) = self.persistent_cache() else {
            return Ok(());
        };

        let resolver = NameResolver::new(self);
        let mut roots = Vec::new();
        for name in names {
            let name = QualifiedName::parse(name.as_ref())?;
            roots.push(resolver.resolve_target(&name)?);
        }

        let (graph, _) = assemble_lenient(self);
        let closure: Vec<QualifiedName> = traversal::descendants(&graph, &roots)
            .into_iter()
            .collect();
        tracing::debug!(
            namespace = cache.namespace(),
            count = closure.len(),
            "invalidating cached values"
        );
        cache.invalidate(&closure).map_err(ComposerError::from)
    }

    /// Drop every cached value in this composer's namespace.
    pub fn cache_clear(&self) -> ComposerResult<()> {
        match self.persistent_cache() {
            Some(cache) => cache.clear().map_err(ComposerError::from),
            None => Ok(()),
        }
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.persistent_cache().map(PersistentCache::stats)
    }

    /// Current fingerprints of the named nodes and their dependencies.
    pub fn fingerprints<I, S>(
        &self,
        names: I,
    ) -> ComposerResult<std::collections::BTreeMap<QualifiedName, Fingerprint>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let resolver = NameResolver::new(self);
        let mut roots = Vec::new();
        for name in names {
            let name = QualifiedName::parse(name.as_ref())?;
            roots.push(resolver.resolve_target(&name)?);
        }

        let graph = self.calculation_graph()?;
        let closure: BTreeSet<QualifiedName> = traversal::ancestors(&graph, &roots);
        let order = traversal::topological_order(&graph, &closure).ok_or_else(|| {
            ComposerError::Cycle {
                cycle: closure.iter().map(ToString::to_string).collect(),
            }
        })?;
        let fingerprints = compute_fingerprints(self, &graph, &order)?;
        Ok(fingerprints.into_iter().collect())
    }
}
