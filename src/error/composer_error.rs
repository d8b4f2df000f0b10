//! Composer-level error types.

use super::NodeError;
use crate::cache::CacheError;
use thiserror::Error;

/// Errors raised while building, assembling or executing a composer.
#[derive(Debug, Error)]
pub enum ComposerError {
    #[error("Naming error: {0}")]
    Naming(String),
    #[error("Unresolved dependency '{dependency}' required by '{node}'")]
    UnresolvedDependency { node: String, dependency: String },
    #[error("Link cycle detected: {}", chain.join(" -> "))]
    LinkCycle { chain: Vec<String> },
    #[error("Cycle detected in graph: {}", cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },
    #[error("Node execution error: node={node}, error={source}")]
    NodeExecution {
        node: String,
        #[source]
        source: NodeError,
    },
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ComposerError {
    /// The qualified name of the node a failure is attributed to, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            ComposerError::UnresolvedDependency { node, .. }
            | ComposerError::NodeExecution { node, .. } => Some(node),
            ComposerError::NodeNotFound(node) => Some(node),
            _ => None,
        }
    }
}
