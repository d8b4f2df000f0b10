//! # fnwire: compose calculations from small named functions
//!
//! A [`Composer`] is an immutable model of named nodes. Function nodes declare
//! the names of their inputs; those names are resolved against other nodes in
//! the model, searching from the node's own namespace outward to the root.
//! Parameters are plain values. Sub-models are merged under a namespace prefix
//! and links redirect a name to another node, so a model can be assembled out
//! of reusable pieces without the pieces knowing about each other. An input
//! can also be optional with a default ([`NodeFn::optional`]) or collect every
//! node sharing a name prefix ([`NodeFn::collect`]).
//!
//! Evaluation is lazy: only what the requested targets depend on runs, each
//! node at most once per calculation. An optional persistent cache keys values
//! by a transitive fingerprint of the node and everything upstream of it.
//!
//! # Quick Start
//!
//! ```rust
//! use fnwire::{Composer, NodeFn};
//! use serde_json::json;
//!
//! let model = Composer::new()
//!     .register("a", NodeFn::new(Vec::<String>::new(), |_| Ok(json!(5))))?
//!     .register("b", NodeFn::new(["a"], |i| Ok(json!(i.i64("a")? * 5))))?
//!     .register("c", NodeFn::new(["a", "b"], |i| Ok(json!(i.i64("a")? * i.i64("b")?))))?;
//!
//! assert_eq!(model.call("c")?, json!(125));
//! # Ok::<(), fnwire::ComposerError>(())
//! ```
//!
//! # Feature Flags
//!
//! | Flag | Description |
//! |------|-------------|
//! | `file-cache` | File-system cache store (`FileCacheStore`, `Composer::development_cache`). On by default. |

pub mod cache;
pub mod composer;
pub mod core;
pub mod domain;
pub mod error;
pub mod graph;

#[cfg(feature = "file-cache")]
pub use crate::cache::FileCacheStore;
pub use crate::cache::{
    CacheBackend, CacheConfig, CacheError, CacheKey, CacheStats, CacheStore, Fingerprint,
    MemoryCacheStore, PersistentCache,
};
pub use crate::composer::{Composer, TestOutcome};
pub use crate::core::{
    Calculation, EngineConfig, ExecutionEvent, ExecutionPlan, NodeInstruction, PlanStep,
};
pub use crate::domain::{InputKind, InputSpec, NodeFn, NodeInputs, NodeKind, QualifiedName, SEPARATOR};
pub use crate::error::{ComposerError, ComposerResult, NodeError, NodeResult};
pub use crate::graph::{
    CalculationGraph, Diagnostic, DiagnosticLevel, GraphDescription, ValidationReport,
};
