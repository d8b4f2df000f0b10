use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::visit::{Dfs, Reversed};

use crate::domain::QualifiedName;

use super::builder::CalculationGraph;

/// `roots` plus every node they depend on, directly or transitively.
/// Names absent from the graph are ignored.
pub fn ancestors(graph: &CalculationGraph, roots: &[QualifiedName]) -> BTreeSet<QualifiedName> {
    let reversed = Reversed(&graph.graph);
    collect_reachable(graph, roots, |start, out| {
        let mut dfs = Dfs::new(reversed, start);
        while let Some(idx) = dfs.next(reversed) {
            out.extend(graph.name_of(idx).cloned());
        }
    })
}

/// `roots` plus every node depending on them, directly or transitively.
pub fn descendants(graph: &CalculationGraph, roots: &[QualifiedName]) -> BTreeSet<QualifiedName> {
    collect_reachable(graph, roots, |start, out| {
        let mut dfs = Dfs::new(&graph.graph, start);
        while let Some(idx) = dfs.next(&graph.graph) {
            out.extend(graph.name_of(idx).cloned());
        }
    })
}

fn collect_reachable<F>(
    graph: &CalculationGraph,
    roots: &[QualifiedName],
    mut walk: F,
) -> BTreeSet<QualifiedName>
where
    F: FnMut(petgraph::stable_graph::NodeIndex, &mut BTreeSet<QualifiedName>),
{
    let mut reached = BTreeSet::new();
    for root in roots {
        if reached.contains(root) {
            continue;
        }
        if let Some(idx) = graph.node_index_map.get(root) {
            walk(*idx, &mut reached);
        }
    }
    reached
}

/// Topological order over `subset`: every node comes after all of its
/// dependencies. Among ready nodes the smallest name goes first, so the order
/// is the same for the same model and subset.
///
/// Returns `None` if `subset` contains a cycle.
pub fn topological_order(
    graph: &CalculationGraph,
    subset: &BTreeSet<QualifiedName>,
) -> Option<Vec<QualifiedName>> {
    let mut pending: HashMap<&QualifiedName, usize> = HashMap::new();
    let mut consumers: BTreeMap<&QualifiedName, Vec<&QualifiedName>> = BTreeMap::new();
    for name in subset {
        let deps: BTreeSet<&QualifiedName> = graph
            .dependencies(name)
            .iter()
            .map(|d| &d.name)
            .filter(|d| subset.contains(*d))
            .collect();
        pending.insert(name, deps.len());
        for dep in deps {
            consumers.entry(dep).or_default().push(name);
        }
    }

    let mut ready: BTreeSet<&QualifiedName> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(subset.len());

    while let Some(name) = ready.pop_first() {
        order.push(name.clone());
        for consumer in consumers.get(name).into_iter().flatten() {
            if let Some(count) = pending.get_mut(consumer) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*consumer);
                }
            }
        }
    }

    (order.len() == subset.len()).then_some(order)
}
