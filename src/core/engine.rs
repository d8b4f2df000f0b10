//! Lazy, memoized evaluation of a composer's targets.
//!
//! A calculation resolves the requested names, takes their ancestor closure in
//! the calculation graph and walks it in topological order. With a persistent
//! cache attached, each function node is first planned as `Calculate`,
//! `Retrieve` or `Skip` from its fingerprint, so cached values that nobody
//! needs are never even read.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};

use super::events::ExecutionEvent;
use super::memo::MemoTable;
use crate::cache::{compute_fingerprints, CacheKey, Fingerprint, PersistentCache};
use crate::composer::Composer;
use crate::domain::{InputKind, Node, NodeFn, NodeInputs, NodeKind, QualifiedName};
use crate::error::{ComposerError, ComposerResult};
use crate::graph::{build_graph_for, traversal, CalculationGraph, NameResolver, ResolvedDependency};

/// What the engine does with a node of the closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeInstruction {
    /// Run the function (or read the parameter)
    Calculate,
    /// Read the value from the persistent cache
    Retrieve,
    /// Cached, and nothing in this run needs the value
    Skip,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanStep {
    pub name: QualifiedName,
    pub kind: NodeKind,
    pub instruction: NodeInstruction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
}

/// The closure of a calculation in execution order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionPlan {
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, name: &str) -> Option<&PlanStep> {
        let name = QualifiedName::parse(name).ok()?;
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn instruction(&self, name: &str) -> Option<NodeInstruction> {
        self.step(name).map(|s| s.instruction)
    }

    pub fn order(&self) -> impl Iterator<Item = &QualifiedName> {
        self.steps.iter().map(|s| &s.name)
    }

    /// Names carrying `instruction`, in execution order.
    pub fn with_instruction(&self, instruction: NodeInstruction) -> Vec<&QualifiedName> {
        self.steps
            .iter()
            .filter(|s| s.instruction == instruction)
            .map(|s| &s.name)
            .collect()
    }
}

/// Everything fixed before the first node runs.
struct Prepared {
    graph: Arc<CalculationGraph>,
    /// Requested name as given, and the node it resolves to.
    targets: Vec<(QualifiedName, QualifiedName)>,
    plan: ExecutionPlan,
    fingerprints: HashMap<QualifiedName, Fingerprint>,
}

fn prepare(
    composer: &Composer,
    targets: &[String],
    include_intermediates: bool,
) -> ComposerResult<Prepared> {
    let resolver = NameResolver::new(composer);
    let mut requested = Vec::with_capacity(targets.len());
    for target in targets {
        let name = QualifiedName::parse(target)?;
        let resolved = resolver.resolve_target(&name)?;
        requested.push((name, resolved));
    }
    let roots: Vec<QualifiedName> = requested.iter().map(|(_, r)| r.clone()).collect();

    let graph = if composer.config().perform_checks {
        composer.calculation_graph()?
    } else {
        Arc::new(build_graph_for(composer, &roots)?)
    };

    let closure = traversal::ancestors(&graph, &roots);
    let order = traversal::topological_order(&graph, &closure).ok_or_else(|| {
        ComposerError::Cycle {
            cycle: closure.iter().map(ToString::to_string).collect(),
        }
    })?;

    let fingerprints = match composer.persistent_cache() {
        Some(_) => compute_fingerprints(composer, &graph, &order)?,
        None => HashMap::new(),
    };

    let returned: BTreeSet<&QualifiedName> = if include_intermediates {
        closure.iter().collect()
    } else {
        roots.iter().collect()
    };

    // Walk consumers before producers: a node is needed when it is returned
    // or some needed consumer has to be calculated.
    let mut instructions: HashMap<&QualifiedName, NodeInstruction> = HashMap::new();
    let mut steps = Vec::with_capacity(order.len());
    for name in order.iter().rev() {
        let kind = graph.kind_of(name).unwrap_or(NodeKind::Function);
        let fingerprint = fingerprints.get(name).cloned();

        let cached = match (composer.persistent_cache(), kind, &fingerprint) {
            (Some(cache), NodeKind::Function, Some(fp)) => {
                cache.contains(&CacheKey::new(name.clone(), fp.clone()))?
            }
            _ => false,
        };
        let needed = returned.contains(name)
            || graph
                .dependents(name)
                .iter()
                .any(|d| instructions.get(d) == Some(&NodeInstruction::Calculate));

        let instruction = match (needed, cached) {
            (false, _) => NodeInstruction::Skip,
            (true, true) => NodeInstruction::Retrieve,
            (true, false) => NodeInstruction::Calculate,
        };
        instructions.insert(name, instruction);
        steps.push(PlanStep {
            name: name.clone(),
            kind,
            instruction,
            fingerprint,
        });
    }
    steps.reverse();

    Ok(Prepared {
        graph,
        targets: requested,
        plan: ExecutionPlan { steps },
        fingerprints,
    })
}

/// A calculation request. Built with [`Composer::calculation`], configured
/// with the chained setters and executed with [`Calculation::run`].
pub struct Calculation<'a> {
    composer: &'a Composer,
    targets: Vec<String>,
    include_intermediates: bool,
    on_event: Option<Box<dyn FnMut(&ExecutionEvent) + 'a>>,
}

impl<'a> Calculation<'a> {
    /// Return every value of the targets' closure instead of only the targets.
    pub fn intermediates(mut self, include: bool) -> Self {
        self.include_intermediates = include;
        self
    }

    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&ExecutionEvent) + 'a,
    {
        self.on_event = Some(Box::new(callback));
        self
    }

    pub fn plan(&self) -> ComposerResult<ExecutionPlan> {
        Ok(prepare(self.composer, &self.targets, self.include_intermediates)?.plan)
    }

    /// Evaluate the request. Results are keyed by the requested names; with
    /// intermediates on, every node of the closure is included by its
    /// qualified name as well.
    pub fn run(mut self) -> ComposerResult<BTreeMap<String, Value>> {
        let started = Instant::now();
        let prepared = prepare(self.composer, &self.targets, self.include_intermediates)?;
        self.emit(ExecutionEvent::PrepareExecution {
            plan: prepared.plan.clone(),
        });

        let release = self.composer.config().release_consumed && !self.include_intermediates;
        let mut run = Run {
            composer: self.composer,
            graph: &prepared.graph,
            cache: self.composer.persistent_cache(),
            fingerprints: &prepared.fingerprints,
            memo: MemoTable::new(release),
            executed: 0,
            retrieved: 0,
        };

        for (_, resolved) in &prepared.targets {
            run.memo.pin(resolved.clone());
        }
        for step in &prepared.plan.steps {
            if step.instruction == NodeInstruction::Calculate {
                for dep in prepared.graph.dependencies(&step.name) {
                    run.memo.expect_consumer(&dep.name);
                }
            }
        }

        for step in &prepared.plan.steps {
            if step.instruction == NodeInstruction::Skip {
                tracing::debug!(node = %step.name, "skipping cached node");
                continue;
            }

            self.emit(ExecutionEvent::NodeStarted {
                name: step.name.clone(),
                instruction: step.instruction,
            });
            let node_started = Instant::now();

            let value = match step.instruction {
                NodeInstruction::Retrieve => run.retrieve(&step.name)?,
                _ => run.calculate(&step.name)?,
            };
            run.memo.insert(step.name.clone(), value);
            if step.instruction == NodeInstruction::Calculate {
                for dep in prepared.graph.dependencies(&step.name) {
                    run.memo.consume(&dep.name);
                }
            }

            self.emit(ExecutionEvent::NodeFinished {
                name: step.name.clone(),
                instruction: step.instruction,
                elapsed: node_started.elapsed(),
            });
        }

        tracing::info!(
            targets = ?self.targets,
            evaluated = prepared.plan.len(),
            executed = run.executed,
            retrieved = run.retrieved,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "calculation finished"
        );

        let values = run.memo.into_values();
        let mut results = BTreeMap::new();
        if self.include_intermediates {
            for (name, value) in &values {
                results.insert(name.to_string(), value.clone());
            }
        }
        for (requested, resolved) in &prepared.targets {
            let value = values
                .get(resolved)
                .cloned()
                .ok_or_else(|| ComposerError::NodeNotFound(resolved.to_string()))?;
            results.insert(requested.to_string(), value);
        }
        Ok(results)
    }

    fn emit(&mut self, event: ExecutionEvent) {
        if let Some(callback) = self.on_event.as_mut() {
            callback(&event);
        }
    }
}

/// Build the arguments of `func` from its resolved dependencies.
///
/// Collected inputs become an object keyed by member name, optional inputs
/// with no dependency get their default, and `value_of` supplies the value of
/// each dependency in declaration order.
pub(crate) fn bind_inputs<F>(
    node: &QualifiedName,
    func: &NodeFn,
    dependencies: &[ResolvedDependency],
    mut value_of: F,
) -> ComposerResult<NodeInputs>
where
    F: FnMut(&QualifiedName) -> ComposerResult<Value>,
{
    let mut inputs = NodeInputs::new();
    for spec in func.inputs() {
        let mut matching = dependencies.iter().filter(|dep| dep.input == spec.name);
        let value = match &spec.kind {
            InputKind::Collect => {
                let mut members = Map::new();
                for dep in matching {
                    let member = dep.member.clone().unwrap_or_else(|| dep.name.to_string());
                    members.insert(member, value_of(&dep.name)?);
                }
                Value::Object(members)
            }
            kind => match (matching.next(), kind) {
                (Some(dep), _) => value_of(&dep.name)?,
                (None, InputKind::Optional(default)) => default.clone(),
                (None, _) => {
                    return Err(ComposerError::UnresolvedDependency {
                        node: node.to_string(),
                        dependency: spec.name.clone(),
                    })
                }
            },
        };
        inputs.insert(spec.name.clone(), value);
    }
    Ok(inputs)
}

/// Mutable state of one run.
struct Run<'r> {
    composer: &'r Composer,
    graph: &'r CalculationGraph,
    cache: Option<&'r PersistentCache>,
    fingerprints: &'r HashMap<QualifiedName, Fingerprint>,
    memo: MemoTable,
    executed: usize,
    retrieved: usize,
}

impl Run<'_> {
    fn cache_key(&self, name: &QualifiedName) -> Option<CacheKey> {
        self.fingerprints
            .get(name)
            .map(|fp| CacheKey::new(name.clone(), fp.clone()))
    }

    /// Read a planned `Retrieve` from the cache, computing it if the entry has
    /// gone missing since planning.
    fn retrieve(&mut self, name: &QualifiedName) -> ComposerResult<Value> {
        let is_function = self.graph.kind_of(name) == Some(NodeKind::Function);
        if let (true, Some(cache), Some(key)) = (is_function, self.cache, self.cache_key(name)) {
            if let Some(value) = cache.lookup(&key)? {
                tracing::debug!(node = %name, fingerprint = %key.fingerprint, "cache hit");
                self.retrieved += 1;
                return Ok(value);
            }
            tracing::debug!(node = %name, fingerprint = %key.fingerprint, "cache miss");
        }
        self.calculate(name)
    }

    /// Value of a dependency: from the memo table when present, otherwise
    /// recovered from the cache or computed on the spot.
    fn input_value(&mut self, name: &QualifiedName) -> ComposerResult<Value> {
        match self.memo.get(name) {
            Some(value) => Ok(value.clone()),
            None => self.retrieve(name),
        }
    }

    fn calculate(&mut self, name: &QualifiedName) -> ComposerResult<Value> {
        let (composer, graph) = (self.composer, self.graph);
        let node = composer
            .node_table()
            .get(name)
            .ok_or_else(|| ComposerError::NodeNotFound(name.to_string()))?;

        let function = match node {
            Node::Parameter(parameter) => return Ok(parameter.value().clone()),
            Node::Function(function) => function,
        };

        let inputs = bind_inputs(name, function.func(), graph.dependencies(name), |dep| {
            self.input_value(dep)
        })?;

        tracing::debug!(node = %name, "calculating node");
        let value = function
            .func()
            .call(&inputs)
            .map_err(|source| ComposerError::NodeExecution {
                node: name.to_string(),
                source,
            })?;
        self.executed += 1;

        if let (Some(cache), Some(key)) = (self.cache, self.cache_key(name)) {
            cache.store(&key, &value)?;
        }
        Ok(value)
    }
}

impl Composer {
    /// Start a calculation request for `targets`.
    pub fn calculation<I, S>(&self, targets: I) -> Calculation<'_>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Calculation {
            composer: self,
            targets: targets.into_iter().map(|t| t.as_ref().to_string()).collect(),
            include_intermediates: false,
            on_event: None,
        }
    }

    /// Compute `targets`, and with `include_intermediates` every node they
    /// depend on. Nodes outside the targets' closure never run.
    pub fn calculate<I, S>(
        &self,
        targets: I,
        include_intermediates: bool,
    ) -> ComposerResult<BTreeMap<String, Value>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.calculation(targets)
            .intermediates(include_intermediates)
            .run()
    }

    /// Compute a single target and return its value.
    pub fn call(&self, target: &str) -> ComposerResult<Value> {
        let name = QualifiedName::parse(target)?;
        let mut results = self.calculation([target]).run()?;
        results
            .remove(&name.to_string())
            .ok_or_else(|| ComposerError::NodeNotFound(target.to_string()))
    }

    /// The execution plan `calculate` would follow right now.
    pub fn plan<I, S>(&self, targets: I, include_intermediates: bool) -> ComposerResult<ExecutionPlan>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.calculation(targets)
            .intermediates(include_intermediates)
            .plan()
    }

    /// Compute `targets` and return a model in which each of them is a
    /// parameter holding its value. Targets given through a link replace the
    /// node the link points to.
    pub fn precalculate<I, S>(&self, targets: I) -> ComposerResult<Composer>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let targets: Vec<String> = targets.into_iter().map(|t| t.as_ref().to_string()).collect();
        let values = self.calculate(&targets, false)?;

        let resolver = NameResolver::new(self);
        let mut next = self.clone();
        for target in &targets {
            let name = QualifiedName::parse(target)?;
            let resolved = resolver.resolve_target(&name)?;
            let value = values
                .get(&name.to_string())
                .cloned()
                .ok_or_else(|| ComposerError::NodeNotFound(target.clone()))?;
            next = next.bind_parameter(resolved, value);
        }
        Ok(next)
    }
}
