use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::IgnoredAny;
use serde_json::Value;
use tempfile::NamedTempFile;

use super::store::{CacheError, CacheKey, CacheStore};
use crate::domain::QualifiedName;

/// Directory-backed store laid out as `<dir>/<namespace>/<node>/<fingerprint>.json`.
///
/// Writes go through a temporary file in the target directory followed by a
/// rename, so readers never observe a partial entry. Writers share the lock;
/// invalidation and clearing take it exclusively.
pub struct FileCacheStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FileCacheStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::Storage(e.to_string()))?;
        Ok(Self {
            dir,
            lock: RwLock::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf, CacheError> {
        if namespace.is_empty()
            || namespace == "."
            || namespace == ".."
            || namespace.contains(['/', '\\'])
        {
            return Err(CacheError::Storage(format!(
                "invalid cache namespace '{}'",
                namespace
            )));
        }
        Ok(self.dir.join(namespace))
    }

    fn slot_dir(&self, namespace: &str, name: &QualifiedName) -> Result<PathBuf, CacheError> {
        Ok(self.namespace_dir(namespace)?.join(name.to_string()))
    }

    fn path_for(&self, namespace: &str, key: &CacheKey) -> Result<PathBuf, CacheError> {
        Ok(self
            .slot_dir(namespace, &key.name)?
            .join(format!("{}.json", key.fingerprint)))
    }
}

fn remove_dir_if_present(path: &Path) -> Result<(), CacheError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::Storage(e.to_string())),
    }
}

/// Whether `path` holds a readable entry. A slot that fails to parse is
/// rewritten by the next `put`.
fn holds_entry(path: &Path) -> bool {
    std::fs::read(path)
        .map(|bytes| serde_json::from_slice::<IgnoredAny>(&bytes).is_ok())
        .unwrap_or(false)
}

impl CacheStore for FileCacheStore {
    fn get(&self, namespace: &str, key: &CacheKey) -> Result<Option<Value>, CacheError> {
        let path = self.path_for(namespace, key)?;
        let _guard = self.lock.read();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Storage(e.to_string())),
        };

        let value = serde_json::from_slice::<Value>(&bytes)
            .map_err(|e| CacheError::Corrupted(format!("{}: {}", path.display(), e)))?;
        Ok(Some(value))
    }

    fn put(&self, namespace: &str, key: &CacheKey, value: &Value) -> Result<(), CacheError> {
        let slot = self.slot_dir(namespace, &key.name)?;
        let path = self.path_for(namespace, key)?;
        let bytes =
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;

        let _guard = self.lock.read();
        if holds_entry(&path) {
            return Ok(());
        }
        std::fs::create_dir_all(&slot).map_err(|e| CacheError::Storage(e.to_string()))?;

        let mut tmp =
            NamedTempFile::new_in(&slot).map_err(|e| CacheError::Storage(e.to_string()))?;
        tmp.write_all(&bytes)
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        match tmp.persist(&path) {
            Ok(_) => Ok(()),
            // Another writer got there first with the same content.
            Err(_) if holds_entry(&path) => Ok(()),
            Err(e) => Err(CacheError::Storage(e.error.to_string())),
        }
    }

    fn delete_names(&self, namespace: &str, names: &[QualifiedName]) -> Result<(), CacheError> {
        let _guard = self.lock.write();
        for name in names {
            remove_dir_if_present(&self.slot_dir(namespace, name)?)?;
        }
        Ok(())
    }

    fn clear(&self, namespace: &str) -> Result<(), CacheError> {
        let dir = self.namespace_dir(namespace)?;
        let _guard = self.lock.write();
        remove_dir_if_present(&dir)
    }

    fn contains(&self, namespace: &str, key: &CacheKey) -> Result<bool, CacheError> {
        let path = self.path_for(namespace, key)?;
        let _guard = self.lock.read();
        Ok(path.is_file())
    }
}
