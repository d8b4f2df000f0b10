//! Build operations. None of them mutate the receiver and none execute
//! anything; each returns the updated model as a new value.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use super::Composer;
use crate::cache::PersistentCache;
use crate::core::config::EngineConfig;
use crate::domain::name::validate_segment;
use crate::domain::{FunctionNode, Node, NodeFn, ParameterNode, QualifiedName};
use crate::error::{ComposerError, ComposerResult};

impl Composer {
    /// Bind `name` to a function node whose raw dependencies are the
    /// function's declared input names.
    ///
    /// `name` is a single segment; binding inside a namespace goes through
    /// [`Composer::bind`] or [`Composer::merge_namespace`].
    pub fn register(&self, name: &str, func: NodeFn) -> ComposerResult<Self> {
        self.bind(QualifiedName::leaf(name)?, func)
    }

    /// Bind a function node at an explicit qualified name.
    pub fn bind(&self, name: QualifiedName, func: NodeFn) -> ComposerResult<Self> {
        let node = FunctionNode::new(func)?;
        if self.cache.is_some() {
            warn_default_definitions([(&name, &node)]);
        }
        let mut next = self.derive();
        Arc::make_mut(&mut next.nodes).insert(name, Node::Function(node));
        Ok(next)
    }

    /// Register each `(name, func)` under `name` with `prefix` removed.
    ///
    /// Every name must carry the prefix and keep a non-empty remainder.
    pub fn update_without_prefix<I, S>(&self, prefix: &str, functions: I) -> ComposerResult<Self>
    where
        I: IntoIterator<Item = (S, NodeFn)>,
        S: AsRef<str>,
    {
        self.update_stripped(functions, |name| {
            name.strip_prefix(prefix)
                .filter(|rest| !rest.is_empty())
                .ok_or_else(|| {
                    ComposerError::Naming(format!("'{}' does not start with '{}'", name, prefix))
                })
        })
    }

    /// Register each `(name, func)` under `name` with `suffix` removed.
    pub fn update_without_suffix<I, S>(&self, suffix: &str, functions: I) -> ComposerResult<Self>
    where
        I: IntoIterator<Item = (S, NodeFn)>,
        S: AsRef<str>,
    {
        self.update_stripped(functions, |name| {
            name.strip_suffix(suffix)
                .filter(|rest| !rest.is_empty())
                .ok_or_else(|| {
                    ComposerError::Naming(format!("'{}' does not end with '{}'", name, suffix))
                })
        })
    }

    fn update_stripped<I, S, F>(&self, functions: I, strip: F) -> ComposerResult<Self>
    where
        I: IntoIterator<Item = (S, NodeFn)>,
        S: AsRef<str>,
        F: for<'n> Fn(&'n str) -> ComposerResult<&'n str>,
    {
        let mut next = self.clone();
        for (name, func) in functions {
            next = next.register(strip(name.as_ref())?, func)?;
        }
        Ok(next)
    }

    pub fn register_parameter(&self, name: &str, value: impl Into<Value>) -> ComposerResult<Self> {
        Ok(self.bind_parameter(QualifiedName::leaf(name)?, value))
    }

    pub fn bind_parameter(&self, name: QualifiedName, value: impl Into<Value>) -> Self {
        let mut next = self.derive();
        Arc::make_mut(&mut next.nodes).insert(name, Node::Parameter(ParameterNode::new(value.into())));
        next
    }

    /// Bind several root-level parameters at once.
    pub fn register_parameters<I, S, V>(&self, parameters: I) -> ComposerResult<Self>
    where
        I: IntoIterator<Item = (S, V)>,
        S: AsRef<str>,
        V: Into<Value>,
    {
        let mut next = self.derive();
        let nodes = Arc::make_mut(&mut next.nodes);
        for (name, value) in parameters {
            let name = QualifiedName::leaf(name.as_ref())?;
            nodes.insert(name, Node::Parameter(ParameterNode::new(value.into())));
        }
        Ok(next)
    }

    /// Add a composer test: a function resolved like any node but kept out of
    /// the calculation graph. See [`Composer::run_tests`].
    pub fn register_test(&self, name: &str, func: NodeFn) -> ComposerResult<Self> {
        let name = QualifiedName::leaf(name)?;
        let test = FunctionNode::new(func)?;
        let mut next = self.derive();
        Arc::make_mut(&mut next.tests).insert(name, test);
        Ok(next)
    }

    /// Copy every node, link and test of `sub` under `prefix`.
    ///
    /// Links are rewritten so both alias and target move with the subtree;
    /// merging the same model under two prefixes yields two independent copies.
    pub fn merge_namespace(&self, prefix: &str, sub: &Composer) -> ComposerResult<Self> {
        validate_segment(prefix)?;
        let prefix = vec![prefix.to_string()];
        tracing::debug!(
            namespace = %prefix[0],
            nodes = sub.nodes.len(),
            links = sub.links.len(),
            "merging namespace"
        );

        let mut next = self.derive();
        let nodes = Arc::make_mut(&mut next.nodes);
        for (name, node) in sub.nodes.iter() {
            nodes.insert(name.prefixed(&prefix), node.clone());
        }
        let links = Arc::make_mut(&mut next.links);
        for (alias, target) in sub.links.iter() {
            links.insert(alias.prefixed(&prefix), target.prefixed(&prefix));
        }
        let tests = Arc::make_mut(&mut next.tests);
        for (name, test) in sub.tests.iter() {
            tests.insert(name.prefixed(&prefix), test.clone());
        }
        Ok(next)
    }

    /// Redirect `alias` to `target`. Both are addressed by their final path in
    /// the fully merged model.
    pub fn link(&self, alias: &str, target: &str) -> ComposerResult<Self> {
        let alias = QualifiedName::parse(alias)?;
        let target = QualifiedName::parse(target)?;
        let mut next = self.derive();
        Arc::make_mut(&mut next.links).insert(alias, target);
        Ok(next)
    }

    /// Union `other` into this model at the same level; `other` wins on
    /// collisions.
    pub fn merge_model(&self, other: &Composer) -> Self {
        let mut next = self.derive();
        if !other.nodes.is_empty() {
            let nodes = Arc::make_mut(&mut next.nodes);
            nodes.extend(other.nodes.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if !other.links.is_empty() {
            let links = Arc::make_mut(&mut next.links);
            links.extend(other.links.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if !other.tests.is_empty() {
            let tests = Arc::make_mut(&mut next.tests);
            tests.extend(other.tests.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        next
    }

    /// A model restricted to the given nodes. Unknown names are ignored; links
    /// are kept when their target survives; tests are dropped.
    pub fn subgraph<I, S>(&self, names: I) -> ComposerResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keep = names
            .into_iter()
            .map(|n| QualifiedName::parse(n.as_ref()))
            .collect::<ComposerResult<BTreeSet<_>>>()?;

        let mut next = self.derive();
        next.nodes = Arc::new(
            self.nodes
                .iter()
                .filter(|(k, _)| keep.contains(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        next.links = Arc::new(
            self.links
                .iter()
                .filter(|(_, target)| keep.contains(*target))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        next.tests = Arc::default();
        Ok(next)
    }

    pub fn with_config(&self, config: EngineConfig) -> Self {
        let mut next = self.clone();
        next.config = config;
        next
    }

    /// Attach a persistent cache. The assembled graph is kept.
    pub fn with_cache(&self, cache: PersistentCache) -> Self {
        warn_default_definitions(self.nodes.iter().filter_map(|(name, node)| match node {
            Node::Function(function) => Some((name, function)),
            Node::Parameter(_) => None,
        }));
        let mut next = self.clone();
        next.cache = Some(cache);
        next
    }

    /// Attach an in-memory persistent cache under `namespace`.
    pub fn memory_cache(&self, namespace: &str) -> Self {
        self.with_cache(PersistentCache::memory(namespace))
    }

    /// Attach a file-backed cache rooted at `dir` (or `.fnwire_cache`) under
    /// `namespace`. Entries survive across process runs.
    #[cfg(feature = "file-cache")]
    pub fn development_cache(
        &self,
        namespace: &str,
        dir: Option<&std::path::Path>,
    ) -> ComposerResult<Self> {
        let dir = dir
            .map(std::path::Path::to_path_buf)
            .unwrap_or_else(crate::cache::default_cache_dir);
        Ok(self.with_cache(PersistentCache::file(namespace, dir)?))
    }

    pub fn without_cache(&self) -> Self {
        let mut next = self.clone();
        next.cache = None;
        next
    }
}

/// Function nodes keyed by their generated definition only change fingerprint
/// when the `NodeFn::new` call site moves, so edits to the body go unnoticed.
fn warn_default_definitions<'a, I>(functions: I)
where
    I: IntoIterator<Item = (&'a QualifiedName, &'a FunctionNode)>,
{
    for (name, function) in functions {
        if !function.func().has_explicit_definition() {
            tracing::warn!(
                node = %name,
                "cached function node has no explicit definition; edits to its body are not detected"
            );
        }
    }
}
