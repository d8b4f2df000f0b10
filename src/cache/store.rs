use std::collections::HashMap;

use dashmap::DashMap;
use serde_json::Value;

use super::fingerprint::Fingerprint;
use crate::domain::QualifiedName;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache storage error: {0}")]
    Storage(String),
    #[error("Cache serialization error: {0}")]
    Serialization(String),
    #[error("Cache entry corrupted: {0}")]
    Corrupted(String),
}

/// Identity of a stored value: the node it belongs to and the fingerprint of
/// the definition that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub name: QualifiedName,
    pub fingerprint: Fingerprint,
}

impl CacheKey {
    pub fn new(name: QualifiedName, fingerprint: Fingerprint) -> Self {
        Self { name, fingerprint }
    }
}

/// Backend for persisted node values. Entries are write-once: a second `put`
/// for an existing key keeps the first value.
pub trait CacheStore: Send + Sync {
    fn get(&self, namespace: &str, key: &CacheKey) -> Result<Option<Value>, CacheError>;
    fn put(&self, namespace: &str, key: &CacheKey, value: &Value) -> Result<(), CacheError>;
    /// Drop every entry of the given nodes, whatever their fingerprint.
    fn delete_names(&self, namespace: &str, names: &[QualifiedName]) -> Result<(), CacheError>;
    fn clear(&self, namespace: &str) -> Result<(), CacheError>;

    fn contains(&self, namespace: &str, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.get(namespace, key)?.is_some())
    }
}

#[derive(Default)]
pub struct MemoryCacheStore {
    data: DashMap<String, HashMap<CacheKey, Value>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, namespace: &str, key: &CacheKey) -> Result<Option<Value>, CacheError> {
        Ok(self
            .data
            .get(namespace)
            .and_then(|entries| entries.get(key).cloned()))
    }

    fn put(&self, namespace: &str, key: &CacheKey, value: &Value) -> Result<(), CacheError> {
        self.data
            .entry(namespace.to_string())
            .or_default()
            .entry(key.clone())
            .or_insert_with(|| value.clone());
        Ok(())
    }

    fn delete_names(&self, namespace: &str, names: &[QualifiedName]) -> Result<(), CacheError> {
        if let Some(mut entries) = self.data.get_mut(namespace) {
            entries.retain(|key, _| !names.contains(&key.name));
        }
        Ok(())
    }

    fn clear(&self, namespace: &str) -> Result<(), CacheError> {
        self.data.remove(namespace);
        Ok(())
    }

    fn contains(&self, namespace: &str, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self
            .data
            .get(namespace)
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false))
    }
}
