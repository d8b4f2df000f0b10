//! Error types for the composer.
//!
//! - [`NodeError`]: failures raised by an individual node function.
//! - [`ComposerError`]: build, assembly, execution and cache errors surfaced to callers.

pub mod composer_error;
pub mod node_error;

pub use composer_error::ComposerError;
pub use node_error::NodeError;

/// Convenience alias for composer-level results.
pub type ComposerResult<T> = Result<T, ComposerError>;
/// Convenience alias for node function results.
pub type NodeResult<T> = Result<T, NodeError>;
