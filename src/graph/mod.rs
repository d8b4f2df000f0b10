//! Name resolution and the calculation graph.
//!
//! The [`CalculationGraph`] is assembled from a [`Composer`](crate::Composer)
//! by [`build_graph`]: every function node's raw input names are resolved by
//! the [`NameResolver`] into edges `dependency -> dependent`, and the result is
//! checked for cycles. [`traversal`] answers closure and ordering queries used
//! by the execution engine and the cache.

pub mod builder;
pub mod export;
pub mod resolver;
pub mod traversal;
pub mod types;
pub mod validator;

pub use builder::*;
pub use export::{GraphDescription, GraphEdgeInfo, GraphNodeInfo, LinkInfo, UnboundInfo};
pub use resolver::NameResolver;
pub use types::*;
pub use validator::{Diagnostic, DiagnosticLevel, ValidationReport};
