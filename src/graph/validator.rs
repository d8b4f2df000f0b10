use std::collections::{BTreeSet, HashMap};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use serde::{Deserialize, Serialize};

use crate::composer::Composer;
use crate::domain::QualifiedName;
use crate::error::ComposerError;

use super::builder::assemble_lenient;
use super::resolver::NameResolver;
use super::traversal::ancestors;
use super::types::{GraphEdge, GraphNode};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

/// Depth-first search with a recursion-stack marker. Returns the first cycle
/// found as a node sequence that starts and ends on the same node.
///
/// Start nodes and successors are visited in name order so the reported
/// cycle is stable across runs.
pub fn find_cycle(graph: &StableDiGraph<GraphNode, GraphEdge>) -> Option<Vec<QualifiedName>> {
    let name = |idx: NodeIndex| graph.node_weight(idx).map(|n| n.name.clone());
    let sorted_successors = |idx: NodeIndex| -> Vec<NodeIndex> {
        let mut succ: Vec<NodeIndex> = graph
            .neighbors_directed(idx, petgraph::Direction::Outgoing)
            .collect();
        succ.sort_by(|a, b| graph[*b].name.cmp(&graph[*a].name));
        succ.dedup();
        succ
    };

    let mut starts: Vec<NodeIndex> = graph.node_indices().collect();
    starts.sort_by(|a, b| graph[*a].name.cmp(&graph[*b].name));

    let mut marks: HashMap<NodeIndex, Mark> = HashMap::new();
    for start in starts {
        if marks.contains_key(&start) {
            continue;
        }
        marks.insert(start, Mark::OnStack);
        // Each frame holds a node and its not yet visited successors, popped
        // from the back (smallest name first).
        let mut stack: Vec<(NodeIndex, Vec<NodeIndex>)> = vec![(start, sorted_successors(start))];

        loop {
            let next = match stack.last_mut() {
                Some((_, successors)) => successors.pop(),
                None => break,
            };
            match next {
                Some(next) => match marks.get(&next) {
                    Some(Mark::OnStack) => {
                        let pos = stack.iter().position(|(n, _)| *n == next)?;
                        let mut cycle: Vec<QualifiedName> =
                            stack[pos..].iter().filter_map(|(n, _)| name(*n)).collect();
                        cycle.extend(name(next));
                        return Some(cycle);
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(next, Mark::OnStack);
                        stack.push((next, sorted_successors(next)));
                    }
                },
                None => {
                    if let Some((done, _)) = stack.pop() {
                        marks.insert(done, Mark::Done);
                    }
                }
            }
        }
    }
    None
}

/// Severity level of a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

/// A single structural finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub code: String,
    pub message: String,
    pub node: Option<String>,
}

/// Aggregated result of [`Composer::check`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let is_valid = !diagnostics.iter().any(|d| d.level == DiagnosticLevel::Error);
        Self {
            is_valid,
            diagnostics,
        }
    }

    /// Return only the error-level diagnostics.
    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .collect()
    }

    /// Return only the warning-level diagnostics.
    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .collect()
    }
}

impl From<&ComposerError> for Diagnostic {
    fn from(err: &ComposerError) -> Self {
        let code = match err {
            ComposerError::UnresolvedDependency { .. } => "unresolved_dependency",
            ComposerError::LinkCycle { .. } => "link_cycle",
            ComposerError::Cycle { .. } => "cycle",
            ComposerError::NodeNotFound(_) => "node_not_found",
            ComposerError::Naming(_) => "naming",
            _ => "error",
        };
        Diagnostic {
            level: DiagnosticLevel::Error,
            code: code.to_string(),
            message: err.to_string(),
            node: err.node().map(str::to_string),
        }
    }
}

impl Composer {
    /// Report every structural problem without failing.
    ///
    /// With `targets`, only the targets' ancestor closure is examined; unknown
    /// targets are reported as `node_not_found`.
    pub fn check(&self, targets: Option<&[&str]>) -> ValidationReport {
        let (graph, errors) = assemble_lenient(self);
        let mut diagnostics = Vec::new();

        let scope: Option<BTreeSet<QualifiedName>> = targets.map(|targets| {
            let resolver = NameResolver::new(self);
            let mut roots = Vec::new();
            for target in targets {
                match QualifiedName::parse(target).and_then(|t| resolver.resolve_target(&t)) {
                    Ok(root) => roots.push(root),
                    Err(e) => diagnostics.push(Diagnostic::from(&e)),
                }
            }
            ancestors(&graph, &roots)
        });
        let in_scope = |node: Option<&str>| match (&scope, node) {
            (Some(scope), Some(node)) => QualifiedName::parse(node)
                .map(|n| scope.contains(&n))
                .unwrap_or(false),
            _ => true,
        };

        diagnostics.extend(
            errors
                .iter()
                .filter(|e| in_scope(e.node()))
                .map(Diagnostic::from),
        );

        // Link cycles are reported even when no node references the alias.
        if scope.is_none() {
            let cycle_key = |chain: &[String]| {
                let mut key = chain.to_vec();
                key.sort();
                key.dedup();
                key
            };
            let mut reported: BTreeSet<Vec<String>> = errors
                .iter()
                .filter_map(|e| match e {
                    ComposerError::LinkCycle { chain } => Some(cycle_key(chain)),
                    _ => None,
                })
                .collect();
            let resolver = NameResolver::new(self);
            for (alias, _) in self.links() {
                if let Err(e) = resolver.follow_links(alias) {
                    if let ComposerError::LinkCycle { chain } = &e {
                        if reported.insert(cycle_key(chain)) {
                            diagnostics.push(Diagnostic::from(&e));
                        }
                    }
                }
            }
        }

        if let Some(cycle) = find_cycle(&graph.graph) {
            let within = scope
                .as_ref()
                .map(|s| cycle.iter().any(|n| s.contains(n)))
                .unwrap_or(true);
            if within {
                let err = ComposerError::Cycle {
                    cycle: cycle.iter().map(ToString::to_string).collect(),
                };
                diagnostics.push(Diagnostic::from(&err));
            }
        }

        ValidationReport::from_diagnostics(diagnostics)
    }
}
