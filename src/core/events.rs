use std::time::Duration;

use serde::Serialize;

use super::engine::{ExecutionPlan, NodeInstruction};
use crate::domain::QualifiedName;

/// Progress notifications of one calculation, delivered in order to the
/// callback registered with [`Calculation::on_event`](super::engine::Calculation::on_event).
#[derive(Clone, Debug, Serialize)]
pub enum ExecutionEvent {
    /// The plan is known; nothing has run yet
    PrepareExecution { plan: ExecutionPlan },

    NodeStarted {
        name: QualifiedName,
        instruction: NodeInstruction,
    },

    NodeFinished {
        name: QualifiedName,
        instruction: NodeInstruction,
        elapsed: Duration,
    },
}

impl ExecutionEvent {
    pub fn node(&self) -> Option<&QualifiedName> {
        match self {
            ExecutionEvent::PrepareExecution { .. } => None,
            ExecutionEvent::NodeStarted { name, .. } | ExecutionEvent::NodeFinished { name, .. } => {
                Some(name)
            }
        }
    }
}
