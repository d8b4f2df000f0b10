//! The immutable model: named nodes, links and composer tests.
//!
//! Every build operation in [`builder`] returns a new [`Composer`]; the
//! underlying tables are shared copy-on-write so that earlier versions stay
//! valid and cheap to keep around.

pub mod builder;
pub mod testing;

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use crate::cache::PersistentCache;
use crate::core::config::EngineConfig;
use crate::domain::{FunctionNode, Node, QualifiedName};
use crate::error::ComposerResult;
use crate::graph::{build_graph, CalculationGraph};

pub use testing::TestOutcome;

pub(crate) type NodeTable = BTreeMap<QualifiedName, Node>;
pub(crate) type LinkTable = BTreeMap<QualifiedName, QualifiedName>;
pub(crate) type TestTable = BTreeMap<QualifiedName, FunctionNode>;

#[derive(Clone, Default)]
pub struct Composer {
    nodes: Arc<NodeTable>,
    links: Arc<LinkTable>,
    tests: Arc<TestTable>,
    cache: Option<PersistentCache>,
    config: EngineConfig,
    graph: OnceLock<Arc<CalculationGraph>>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        let name = QualifiedName::parse(name).ok()?;
        self.nodes.get(&name)
    }

    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &QualifiedName> {
        self.nodes.keys()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn links(&self) -> impl Iterator<Item = (&QualifiedName, &QualifiedName)> {
        self.links.iter()
    }

    pub fn tests(&self) -> impl Iterator<Item = (&QualifiedName, &FunctionNode)> {
        self.tests.iter()
    }

    /// The text a node's fingerprint is computed from.
    pub fn definition(&self, name: &str) -> Option<String> {
        self.node(name).map(Node::definition)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn persistent_cache(&self) -> Option<&PersistentCache> {
        self.cache.as_ref()
    }

    /// The resolved dependency graph over every node.
    ///
    /// Assembled on first use and kept for the lifetime of this value; any
    /// build operation yields a new value that assembles afresh.
    pub fn calculation_graph(&self) -> ComposerResult<Arc<CalculationGraph>> {
        if let Some(graph) = self.graph.get() {
            return Ok(Arc::clone(graph));
        }
        let graph = Arc::new(build_graph(self)?);
        let _ = self.graph.set(Arc::clone(&graph));
        Ok(graph)
    }

    pub(crate) fn node_table(&self) -> &NodeTable {
        &self.nodes
    }

    pub(crate) fn link_table(&self) -> &LinkTable {
        &self.links
    }

    pub(crate) fn test_table(&self) -> &TestTable {
        &self.tests
    }

    /// Copy of this composer for a structural change: tables shared, graph
    /// left to be reassembled.
    fn derive(&self) -> Self {
        Self {
            nodes: Arc::clone(&self.nodes),
            links: Arc::clone(&self.links),
            tests: Arc::clone(&self.tests),
            cache: self.cache.clone(),
            config: self.config.clone(),
            graph: OnceLock::new(),
        }
    }
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("nodes", &self.nodes.keys().map(|k| k.to_string()).collect::<Vec<_>>())
            .field("links", &self.links.len())
            .field("tests", &self.tests.len())
            .field("cache", &self.cache.as_ref().map(|c| c.namespace().to_string()))
            .finish()
    }
}
