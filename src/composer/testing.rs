//! Composer tests: checks written as functions over model values.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use super::Composer;
use crate::core::bind_inputs;
use crate::domain::{FunctionNode, NodeInputs, QualifiedName};
use crate::error::{ComposerError, ComposerResult};
use crate::graph::{NameResolver, ResolvedDependency};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestOutcome {
    pub name: QualifiedName,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Composer {
    /// Run every registered test against this model.
    ///
    /// Test inputs resolve like node inputs, from the test's own namespace
    /// outward. All referenced values are computed in a single calculation. A
    /// test fails when it returns an error or the value `false`; failures are
    /// reported in the outcome, while unresolved inputs and failing nodes abort
    /// the whole run.
    pub fn run_tests(&self) -> ComposerResult<Vec<TestOutcome>> {
        let resolver = NameResolver::new(self);
        let mut wiring = Vec::with_capacity(self.test_table().len());
        let mut referenced: BTreeSet<String> = BTreeSet::new();
        for (name, test) in self.test_table() {
            let (dependencies, mut errors) = resolver.resolve_inputs(name, test);
            if !errors.is_empty() {
                return Err(errors.swap_remove(0));
            }
            referenced.extend(dependencies.iter().map(|dep| dep.name.to_string()));
            wiring.push((name, test, dependencies));
        }

        let values = self.calculate(&referenced, false)?;

        let mut outcomes = Vec::with_capacity(wiring.len());
        for (name, test, dependencies) in wiring {
            let args = test_arguments(name, test, &dependencies, &values)?;
            let outcome = match test.func().call(&args) {
                Ok(Value::Bool(false)) => TestOutcome {
                    name: name.clone(),
                    passed: false,
                    error: Some("test returned false".to_string()),
                },
                Ok(_) => TestOutcome {
                    name: name.clone(),
                    passed: true,
                    error: None,
                },
                Err(e) => TestOutcome {
                    name: name.clone(),
                    passed: false,
                    error: Some(e.to_string()),
                },
            };
            if !outcome.passed {
                tracing::warn!(test = %name, error = ?outcome.error, "composer test failed");
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

fn test_arguments(
    name: &QualifiedName,
    test: &FunctionNode,
    dependencies: &[ResolvedDependency],
    values: &BTreeMap<String, Value>,
) -> ComposerResult<NodeInputs> {
    bind_inputs(name, test.func(), dependencies, |dep| {
        values
            .get(&dep.to_string())
            .cloned()
            .ok_or_else(|| ComposerError::NodeNotFound(dep.to_string()))
    })
}
