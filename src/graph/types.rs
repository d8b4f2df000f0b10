use crate::domain::{NodeKind, QualifiedName};

/// Graph node
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub name: QualifiedName,
    pub kind: NodeKind,
}

/// Graph edge, pointing from a dependency to the node that consumes it.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    /// Raw input name on the consuming node
    pub input: String,
}

/// One resolved input of a function node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResolvedDependency {
    /// Raw input name as declared by the function
    pub input: String,
    /// Key within a collected input, `None` for a plain input
    pub member: Option<String>,
    /// Node the input resolved to
    pub name: QualifiedName,
}

/// Qualified name to petgraph `NodeIndex` mapping
pub type NodeIndexMap = std::collections::HashMap<QualifiedName, petgraph::stable_graph::NodeIndex>;
