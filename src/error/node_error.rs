use thiserror::Error;

/// Errors a node function reports back to the engine.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Missing input: {0}")]
    MissingInput(String),
    #[error("Input '{name}' has the wrong type, expected {expected}")]
    InputType { name: String, expected: &'static str },
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl NodeError {
    pub fn execution(message: impl Into<String>) -> Self {
        NodeError::Execution(message.into())
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::Serialization(e.to_string())
    }
}
