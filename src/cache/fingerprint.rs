//! Transitive content fingerprints.
//!
//! A node's fingerprint hashes its own definition together with its resolved
//! inputs, each as the sorted `(input, member, dependency name, dependency
//! fingerprint)` entry. Binding an input to a different node changes the
//! fingerprint even when the set of upstream nodes stays the same.
//! Computed bottom-up, any change upstream reaches every descendant.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::composer::Composer;
use crate::domain::{InputKind, Node, QualifiedName};
use crate::error::{ComposerError, ComposerResult};
use crate::graph::{CalculationGraph, ResolvedDependency};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash of a node's own definition: the callable's definition text and
/// declared inputs for functions, the serialized value for parameters.
pub fn definition_digest(node: &Node) -> Vec<u8> {
    let mut hasher = Sha256::new();
    match node {
        Node::Function(f) => {
            hasher.update(b"function\0");
            hasher.update(f.func().definition().as_bytes());
            hasher.update([0]);
            for input in f.func().inputs() {
                hasher.update(input.name.as_bytes());
                match &input.kind {
                    InputKind::Required => hasher.update(b"\0required\0"),
                    InputKind::Optional(default) => {
                        hasher.update(b"\0optional\0");
                        hasher.update(serde_json::to_vec(default).unwrap_or_default());
                        hasher.update([0]);
                    }
                    InputKind::Collect => hasher.update(b"\0collect\0"),
                }
            }
        }
        Node::Parameter(p) => {
            hasher.update(b"parameter\0");
            hasher.update(serde_json::to_vec(p.value()).unwrap_or_default());
        }
    }
    hasher.finalize().to_vec()
}

/// Combine a definition digest with the fingerprints of resolved dependencies.
pub fn combine(
    definition: &[u8],
    dependencies: &[(&ResolvedDependency, &Fingerprint)],
) -> Fingerprint {
    let mut sorted = dependencies.to_vec();
    sorted.sort();

    let mut hasher = Sha256::new();
    hasher.update(definition);
    for (dep, fingerprint) in sorted {
        hasher.update(dep.input.as_bytes());
        hasher.update([0]);
        if let Some(member) = &dep.member {
            hasher.update(member.as_bytes());
        }
        hasher.update([0]);
        hasher.update(dep.name.to_string().as_bytes());
        hasher.update([0]);
        hasher.update(fingerprint.as_str().as_bytes());
        hasher.update([0]);
    }
    Fingerprint(format!("{:x}", hasher.finalize()))
}

/// Fingerprints of every node in `order`, which must be a topological order
/// closed under dependencies.
pub fn compute_fingerprints(
    composer: &Composer,
    graph: &CalculationGraph,
    order: &[QualifiedName],
) -> ComposerResult<HashMap<QualifiedName, Fingerprint>> {
    let mut fingerprints: HashMap<QualifiedName, Fingerprint> = HashMap::with_capacity(order.len());
    for name in order {
        let node = composer
            .node_table()
            .get(name)
            .ok_or_else(|| ComposerError::NodeNotFound(name.to_string()))?;

        let mut deps = Vec::new();
        for dep in graph.dependencies(name) {
            let fingerprint = fingerprints
                .get(&dep.name)
                .ok_or_else(|| ComposerError::NodeNotFound(dep.name.to_string()))?;
            deps.push((dep, fingerprint));
        }
        let fingerprint = combine(&definition_digest(node), &deps);
        fingerprints.insert(name.clone(), fingerprint);
    }
    Ok(fingerprints)
}
