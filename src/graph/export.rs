//! Plain structural dump of the calculation graph for external renderers.

use serde::{Deserialize, Serialize};

use crate::composer::Composer;
use crate::domain::{Node, NodeKind};
use crate::error::ComposerError;

use super::builder::assemble_lenient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNodeInfo {
    pub name: String,
    pub kind: NodeKind,
    pub namespace: Vec<String>,
    pub leaf: String,
}

/// `dependent` consumes `dependency` through its input `input`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdgeInfo {
    pub dependent: String,
    pub dependency: String,
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub alias: String,
    pub target: String,
}

/// An input that could not be resolved; renderers typically highlight these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnboundInfo {
    pub node: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDescription {
    pub nodes: Vec<GraphNodeInfo>,
    pub edges: Vec<GraphEdgeInfo>,
    pub links: Vec<LinkInfo>,
    pub unbound: Vec<UnboundInfo>,
}

impl GraphDescription {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Composer {
    /// Describe nodes, resolved edges and links. Never fails: unresolvable
    /// inputs are listed under `unbound`.
    pub fn graph_description(&self) -> GraphDescription {
        let (graph, errors) = assemble_lenient(self);

        let nodes = self
            .node_table()
            .iter()
            .map(|(name, node)| GraphNodeInfo {
                name: name.to_string(),
                kind: node.kind(),
                namespace: name.namespace().to_vec(),
                leaf: name.leaf_name().to_string(),
            })
            .collect();

        let mut edges = Vec::new();
        for (name, node) in self.node_table() {
            if let Node::Function(_) = node {
                for dep in graph.dependencies(name) {
                    edges.push(GraphEdgeInfo {
                        dependent: name.to_string(),
                        dependency: dep.name.to_string(),
                        input: dep.input.clone(),
                    });
                }
            }
        }

        let links = self
            .link_table()
            .iter()
            .map(|(alias, target)| LinkInfo {
                alias: alias.to_string(),
                target: target.to_string(),
            })
            .collect();

        let unbound = errors
            .iter()
            .map(|e| UnboundInfo {
                node: e.node().unwrap_or_default().to_string(),
                reason: match e {
                    ComposerError::UnresolvedDependency { dependency, .. } => dependency.clone(),
                    other => other.to_string(),
                },
            })
            .collect();

        GraphDescription {
            nodes,
            edges,
            links,
            unbound,
        }
    }
}
