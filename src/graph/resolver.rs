//! Lexically scoped name lookup with link substitution.

use std::collections::HashSet;

use crate::composer::{Composer, LinkTable, NodeTable};
use crate::domain::{Dependency, FunctionNode, InputKind, QualifiedName, SEPARATOR};
use crate::error::{ComposerError, ComposerResult};

use super::types::ResolvedDependency;

/// Maps a raw input name, seen from the node that declared it, to a node in
/// the model.
///
/// Candidates are tried from the referencing node's own namespace outward to
/// the root. At each level a link alias takes precedence over a node of the
/// same name; the first candidate that is a link or a node wins.
pub struct NameResolver<'a> {
    nodes: &'a NodeTable,
    links: &'a LinkTable,
}

impl<'a> NameResolver<'a> {
    pub fn new(composer: &'a Composer) -> Self {
        Self {
            nodes: composer.node_table(),
            links: composer.link_table(),
        }
    }

    /// Resolve `raw` as referenced by `referrer`.
    pub fn resolve(
        &self,
        referrer: &QualifiedName,
        raw: &QualifiedName,
    ) -> ComposerResult<QualifiedName> {
        let namespace = referrer.namespace();
        for depth in (0..=namespace.len()).rev() {
            let candidate = QualifiedName::join(&namespace[..depth], raw);

            if let Some(target) = self.follow_links(&candidate)? {
                if !self.nodes.contains_key(&target) {
                    return Err(ComposerError::UnresolvedDependency {
                        node: referrer.to_string(),
                        dependency: target.to_string(),
                    });
                }
                return Ok(target);
            }

            if self.nodes.contains_key(&candidate) {
                return Ok(candidate);
            }
        }

        Err(ComposerError::UnresolvedDependency {
            node: referrer.to_string(),
            dependency: raw.to_string(),
        })
    }

    /// Every node matched by the collect `prefix` as seen from `referrer`,
    /// keyed by its name relative to the level it was found at.
    ///
    /// Levels are searched from the referrer's namespace outward and an inner
    /// match shadows an outer one with the same key. The referrer itself is
    /// never collected.
    pub fn collect(&self, referrer: &QualifiedName, prefix: &str) -> Vec<(String, QualifiedName)> {
        let namespace = referrer.namespace();
        let mut keys: HashSet<String> = HashSet::new();
        let mut found = Vec::new();
        for depth in (0..=namespace.len()).rev() {
            let scope = &namespace[..depth];
            for name in self.nodes.keys() {
                let segments = name.segments();
                if name == referrer || segments.len() <= depth || &segments[..depth] != scope {
                    continue;
                }
                let key = segments[depth..].join(SEPARATOR);
                if key.starts_with(prefix) && keys.insert(key.clone()) {
                    found.push((key, name.clone()));
                }
            }
        }
        found
    }

    /// Resolve every declared input of the function node `referrer`.
    ///
    /// An optional input that resolves to nothing is left out; its default
    /// is bound at execution time. A collected input yields one dependency
    /// per matched node. Failures are returned next to whatever did resolve.
    pub fn resolve_inputs(
        &self,
        referrer: &QualifiedName,
        function: &FunctionNode,
    ) -> (Vec<ResolvedDependency>, Vec<ComposerError>) {
        let mut resolved = Vec::with_capacity(function.dependencies().len());
        let mut errors = Vec::new();
        for (spec, dependency) in function.declared() {
            match dependency {
                Dependency::Prefix(prefix) => {
                    resolved.extend(self.collect(referrer, prefix).into_iter().map(
                        |(member, name)| ResolvedDependency {
                            input: spec.name.clone(),
                            member: Some(member),
                            name,
                        },
                    ));
                }
                Dependency::Name(raw) => match self.resolve(referrer, raw) {
                    Ok(name) => resolved.push(ResolvedDependency {
                        input: spec.name.clone(),
                        member: None,
                        name,
                    }),
                    Err(ComposerError::UnresolvedDependency { .. })
                        if matches!(spec.kind, InputKind::Optional(_)) => {}
                    Err(e) => errors.push(e),
                },
            }
        }
        (resolved, errors)
    }

    /// Resolve a requested target given by its full path: links are followed,
    /// no scope search happens.
    pub fn resolve_target(&self, name: &QualifiedName) -> ComposerResult<QualifiedName> {
        let resolved = self.follow_links(name)?.unwrap_or_else(|| name.clone());
        if self.nodes.contains_key(&resolved) {
            Ok(resolved)
        } else {
            Err(ComposerError::NodeNotFound(name.to_string()))
        }
    }

    /// When `candidate` is a link alias, follow the chain to its final target.
    ///
    /// Returns `None` when `candidate` is not an alias. A chain that revisits
    /// an alias is a link cycle.
    pub fn follow_links(&self, candidate: &QualifiedName) -> ComposerResult<Option<QualifiedName>> {
        let Some(mut current) = self.links.get(candidate) else {
            return Ok(None);
        };

        let mut chain = vec![candidate.clone()];
        let mut seen: HashSet<&QualifiedName> = HashSet::from([candidate]);
        loop {
            chain.push(current.clone());
            if !seen.insert(current) {
                return Err(ComposerError::LinkCycle {
                    chain: chain.iter().map(ToString::to_string).collect(),
                });
            }
            match self.links.get(current) {
                Some(next) => current = next,
                None => return Ok(Some(current.clone())),
            }
        }
    }
}
