use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where persisted values live.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheBackend {
    #[default]
    Memory,
    File {
        #[serde(default = "default_cache_dir")]
        dir: PathBuf,
    },
}

/// Configuration for a persistent cache attached to a composer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheConfig {
    pub namespace: String,
    #[serde(default)]
    pub backend: CacheBackend,
}

impl CacheConfig {
    pub fn memory(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            backend: CacheBackend::Memory,
        }
    }

    pub fn file(namespace: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            namespace: namespace.into(),
            backend: CacheBackend::File { dir: dir.into() },
        }
    }
}

/// Directory used by development caches when none is given.
pub fn default_cache_dir() -> PathBuf {
    PathBuf::from(".fnwire_cache")
}
