use std::collections::{BTreeSet, HashMap, VecDeque};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;

use crate::composer::Composer;
use crate::domain::{Node, NodeKind, QualifiedName};
use crate::error::{ComposerError, ComposerResult};

use super::resolver::NameResolver;
use super::types::*;
use super::validator::find_cycle;

/// The resolved dependency graph of a model.
///
/// Edges point from a dependency to the node consuming it. Construction
/// through [`build_graph`] guarantees every dependency resolved and the graph
/// is acyclic.
#[derive(Debug)]
pub struct CalculationGraph {
    pub graph: StableDiGraph<GraphNode, GraphEdge>,
    pub node_index_map: NodeIndexMap,
    dependencies: HashMap<QualifiedName, Vec<ResolvedDependency>>,
}

impl CalculationGraph {
    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.node_index_map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.node_index_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_index_map.is_empty()
    }

    pub fn index_of(&self, name: &QualifiedName) -> ComposerResult<NodeIndex> {
        self.node_index_map
            .get(name)
            .copied()
            .ok_or_else(|| ComposerError::NodeNotFound(name.to_string()))
    }

    pub fn name_of(&self, idx: NodeIndex) -> Option<&QualifiedName> {
        self.graph.node_weight(idx).map(|n| &n.name)
    }

    pub fn kind_of(&self, name: &QualifiedName) -> Option<NodeKind> {
        let idx = self.node_index_map.get(name)?;
        self.graph.node_weight(*idx).map(|n| n.kind)
    }

    /// Resolved inputs of `name`, in declaration order. Empty for parameters.
    pub fn dependencies(&self, name: &QualifiedName) -> &[ResolvedDependency] {
        self.dependencies
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Names of the nodes that consume `name` directly.
    pub fn dependents(&self, name: &QualifiedName) -> Vec<QualifiedName> {
        let Some(idx) = self.node_index_map.get(name) else {
            return Vec::new();
        };
        let dependents: BTreeSet<QualifiedName> = self
            .graph
            .edges_directed(*idx, petgraph::Direction::Outgoing)
            .filter_map(|e| self.name_of(e.target()).cloned())
            .collect();
        dependents.into_iter().collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &QualifiedName> {
        self.graph.node_weights().map(|n| &n.name)
    }
}

/// Build the calculation graph over every node of `composer`.
///
/// Fails on the first unresolved dependency or link cycle, then on any
/// dependency cycle.
pub fn build_graph(composer: &Composer) -> ComposerResult<CalculationGraph> {
    let (graph, mut errors) = assemble(composer, None);
    if !errors.is_empty() {
        return Err(errors.remove(0));
    }
    ensure_acyclic(&graph)?;
    tracing::debug!(nodes = graph.len(), "calculation graph assembled");
    Ok(graph)
}

/// Build the graph restricted to what `roots` reach through their inputs.
/// Problems outside that closure are not reported.
pub fn build_graph_for(
    composer: &Composer,
    roots: &[QualifiedName],
) -> ComposerResult<CalculationGraph> {
    let (graph, mut errors) = assemble(composer, Some(roots));
    if !errors.is_empty() {
        return Err(errors.remove(0));
    }
    ensure_acyclic(&graph)?;
    Ok(graph)
}

/// Assemble as much of the graph as resolves, collecting every resolution
/// error instead of stopping at the first. Cycles are not checked.
pub fn assemble_lenient(composer: &Composer) -> (CalculationGraph, Vec<ComposerError>) {
    assemble(composer, None)
}

fn ensure_acyclic(graph: &CalculationGraph) -> ComposerResult<()> {
    match find_cycle(&graph.graph) {
        Some(cycle) => Err(ComposerError::Cycle {
            cycle: cycle.iter().map(ToString::to_string).collect(),
        }),
        None => Ok(()),
    }
}

fn assemble(
    composer: &Composer,
    roots: Option<&[QualifiedName]>,
) -> (CalculationGraph, Vec<ComposerError>) {
    let resolver = NameResolver::new(composer);
    let nodes = composer.node_table();
    let mut errors = Vec::new();

    // 1. Pick the nodes to resolve
    let selected: Vec<(&QualifiedName, &Node)> = match roots {
        None => nodes.iter().collect(),
        Some(roots) => {
            let mut reached: BTreeSet<&QualifiedName> = BTreeSet::new();
            let mut queue: VecDeque<&QualifiedName> = roots
                .iter()
                .filter_map(|r| nodes.get_key_value(r).map(|(k, _)| k))
                .collect();
            while let Some(name) = queue.pop_front() {
                if !reached.insert(name) {
                    continue;
                }
                let Some(Node::Function(function)) = nodes.get(name) else {
                    continue;
                };
                let (resolved, _) = resolver.resolve_inputs(name, function);
                for dep in resolved {
                    if let Some((key, _)) = nodes.get_key_value(&dep.name) {
                        queue.push_back(key);
                    }
                }
            }
            reached
                .into_iter()
                .filter_map(|name| nodes.get(name).map(|node| (name, node)))
                .collect()
        }
    };

    // 2. Add nodes
    let mut graph = StableDiGraph::<GraphNode, GraphEdge>::new();
    let mut node_index_map: NodeIndexMap = HashMap::new();
    for (name, node) in &selected {
        let idx = graph.add_node(GraphNode {
            name: (*name).clone(),
            kind: node.kind(),
        });
        node_index_map.insert((*name).clone(), idx);
    }

    // 3. Resolve inputs into edges
    let mut dependencies: HashMap<QualifiedName, Vec<ResolvedDependency>> = HashMap::new();
    for (name, node) in &selected {
        let Node::Function(function) = node else {
            continue;
        };
        let (resolved, failed) = resolver.resolve_inputs(name, function);
        for dep in &resolved {
            if let (Some(source), Some(target)) =
                (node_index_map.get(&dep.name), node_index_map.get(*name))
            {
                graph.add_edge(
                    *source,
                    *target,
                    GraphEdge {
                        input: dep.input.clone(),
                    },
                );
            }
        }
        errors.extend(failed);
        dependencies.insert((*name).clone(), resolved);
    }

    (
        CalculationGraph {
            graph,
            node_index_map,
            dependencies,
        },
        errors,
    )
}
