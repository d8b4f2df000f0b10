//! Addressing scheme and node model shared by every other layer.
//!
//! Submodules:
//! - [`name`]: qualified names and the namespace separator.
//! - [`node`]: function and parameter nodes, and the callable wrapper [`NodeFn`].
//! - [`inputs`]: the resolved argument set handed to a node function.

pub mod inputs;
pub mod name;
pub mod node;

pub use inputs::NodeInputs;
pub use name::{QualifiedName, SEPARATOR};
pub use node::{Dependency, FunctionNode, InputKind, InputSpec, Node, NodeFn, NodeKind, ParameterNode};
