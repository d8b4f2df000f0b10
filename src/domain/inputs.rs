use serde_json::{Map, Value};

use crate::error::NodeError;

/// Arguments handed to a node function, keyed by the raw input names the
/// function declared, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInputs {
    values: Vec<(String, Value)>,
}

impl NodeInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn require(&self, name: &str) -> Result<&Value, NodeError> {
        self.get(name)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    pub fn i64(&self, name: &str) -> Result<i64, NodeError> {
        self.require(name)?
            .as_i64()
            .ok_or_else(|| type_error(name, "integer"))
    }

    /// Accepts integers as well as floats.
    pub fn f64(&self, name: &str) -> Result<f64, NodeError> {
        self.require(name)?
            .as_f64()
            .ok_or_else(|| type_error(name, "number"))
    }

    pub fn str(&self, name: &str) -> Result<&str, NodeError> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| type_error(name, "string"))
    }

    pub fn bool(&self, name: &str) -> Result<bool, NodeError> {
        self.require(name)?
            .as_bool()
            .ok_or_else(|| type_error(name, "boolean"))
    }

    /// A collected input: matched node names mapped to their values.
    pub fn object(&self, name: &str) -> Result<&Map<String, Value>, NodeError> {
        self.require(name)?
            .as_object()
            .ok_or_else(|| type_error(name, "object"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn type_error(name: &str, expected: &'static str) -> NodeError {
    NodeError::InputType {
        name: name.to_string(),
        expected,
    }
}
