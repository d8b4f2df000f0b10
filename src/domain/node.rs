use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::inputs::NodeInputs;
use super::name::{QualifiedName, SEPARATOR};
use crate::error::{ComposerError, NodeError};

type NodeFunction = dyn Fn(&NodeInputs) -> Result<Value, NodeError> + Send + Sync;

/// How a declared input is bound when the node runs.
#[derive(Debug, Clone, PartialEq)]
pub enum InputKind {
    /// Must resolve to a node.
    Required,
    /// Bound to the given value when nothing resolves.
    Optional(Value),
    /// Every node whose name starts with the input name, gathered into an
    /// object keyed by the matched name. Empty when nothing matches.
    Collect,
}

/// One declared input of a [`NodeFn`].
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub name: String,
    pub kind: InputKind,
}

impl InputSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: InputKind::Required,
        }
    }
}

impl fmt::Display for InputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            InputKind::Required => f.write_str(&self.name),
            InputKind::Optional(default) => write!(f, "{}={}", self.name, default),
            InputKind::Collect => write!(f, "*{}", self.name),
        }
    }
}

/// A callable together with the inputs it declares.
///
/// Input names are the raw dependency names the resolver wires up. The
/// definition text identifies the callable for fingerprinting. It defaults to
/// the callable's type name plus the source location of the `NodeFn::new`
/// call, and can be replaced with the function's source or a version tag so
/// that edits elsewhere invalidate persistent cache entries.
#[derive(Clone)]
pub struct NodeFn {
    inputs: Arc<[InputSpec]>,
    definition: Arc<str>,
    explicit_definition: bool,
    func: Arc<NodeFunction>,
}

impl NodeFn {
    #[track_caller]
    pub fn new<I, S, F>(inputs: I, func: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&NodeInputs) -> Result<Value, NodeError> + Send + Sync + 'static,
    {
        let caller = Location::caller();
        let definition = format!(
            "{}@{}:{}:{}",
            std::any::type_name::<F>(),
            caller.file(),
            caller.line(),
            caller.column()
        );
        Self {
            inputs: inputs.into_iter().map(InputSpec::required).collect(),
            definition: Arc::from(definition),
            explicit_definition: false,
            func: Arc::new(func),
        }
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Arc::from(definition.into());
        self.explicit_definition = true;
        self
    }

    /// Declares an input that falls back to `default` when it does not
    /// resolve to any node.
    pub fn optional(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.push_input(InputSpec {
            name: name.into(),
            kind: InputKind::Optional(default.into()),
        })
    }

    /// Declares an input that gathers every node whose name starts with
    /// `prefix`, searching the node's own namespace first and then outward.
    pub fn collect(self, prefix: impl Into<String>) -> Self {
        self.push_input(InputSpec {
            name: prefix.into(),
            kind: InputKind::Collect,
        })
    }

    fn push_input(mut self, spec: InputSpec) -> Self {
        let mut inputs = self.inputs.to_vec();
        inputs.retain(|existing| existing.name != spec.name);
        inputs.push(spec);
        self.inputs = inputs.into();
        self
    }

    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|spec| spec.name.as_str())
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// False while the definition is still the generated default.
    pub fn has_explicit_definition(&self) -> bool {
        self.explicit_definition
    }

    pub fn call(&self, inputs: &NodeInputs) -> Result<Value, NodeError> {
        (self.func)(inputs)
    }
}

impl fmt::Debug for NodeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeFn")
            .field("inputs", &self.inputs)
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

/// A parsed raw dependency of a function node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// A possibly relative node name, resolved by scope search.
    Name(QualifiedName),
    /// A leaf-name prefix; every node it matches becomes a dependency.
    Prefix(String),
}

fn validate_prefix(prefix: &str) -> Result<(), ComposerError> {
    if prefix.is_empty() || prefix.contains(SEPARATOR) || prefix.starts_with('_') {
        return Err(ComposerError::Naming(format!(
            "invalid collect prefix '{}'",
            prefix
        )));
    }
    if let Some(c) = prefix
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(ComposerError::Naming(format!(
            "collect prefix '{}' contains invalid character {:?}",
            prefix, c
        )));
    }
    Ok(())
}

/// An executable node: the callable plus its parsed raw dependencies.
#[derive(Debug, Clone)]
pub struct FunctionNode {
    func: NodeFn,
    dependencies: Arc<[Dependency]>,
}

impl FunctionNode {
    /// Fails with a naming error when an input name is not a valid
    /// (possibly relative) qualified name, or a collect prefix is malformed.
    pub fn new(func: NodeFn) -> Result<Self, ComposerError> {
        let dependencies = func
            .inputs()
            .iter()
            .map(|spec| match spec.kind {
                InputKind::Collect => {
                    validate_prefix(&spec.name).map(|()| Dependency::Prefix(spec.name.clone()))
                }
                _ => QualifiedName::parse(&spec.name).map(Dependency::Name),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            func,
            dependencies: dependencies.into(),
        })
    }

    pub fn func(&self) -> &NodeFn {
        &self.func
    }

    /// Raw dependencies, paired index-wise with [`NodeFn::inputs`].
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Declared inputs zipped with their parsed dependencies.
    pub fn declared(&self) -> impl Iterator<Item = (&InputSpec, &Dependency)> {
        self.func.inputs().iter().zip(self.dependencies.iter())
    }
}

/// A static value.
#[derive(Debug, Clone)]
pub struct ParameterNode {
    value: Arc<Value>,
}

impl ParameterNode {
    pub fn new(value: Value) -> Self {
        Self {
            value: Arc::new(value),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Function(FunctionNode),
    Parameter(ParameterNode),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Function(_) => NodeKind::Function,
            Node::Parameter(_) => NodeKind::Parameter,
        }
    }

    pub fn dependencies(&self) -> &[Dependency] {
        match self {
            Node::Function(f) => f.dependencies(),
            Node::Parameter(_) => &[],
        }
    }

    /// Text describing the node's own definition.
    pub fn definition(&self) -> String {
        match self {
            Node::Function(f) => {
                let inputs: Vec<String> =
                    f.func().inputs().iter().map(ToString::to_string).collect();
                format!("{}({})", f.func().definition(), inputs.join(", "))
            }
            Node::Parameter(p) => p.value().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Function,
    Parameter,
}
