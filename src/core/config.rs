use serde::{Deserialize, Serialize};

/// Configuration for the execution engine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Assemble and check the whole model before running anything, not just
    /// the part the targets reach.
    #[serde(default = "default_true")]
    pub perform_checks: bool,
    /// Drop intermediate values from the memo table once every consumer has
    /// read them. Ignored when intermediates are requested.
    #[serde(default = "default_true")]
    pub release_consumed: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            perform_checks: true,
            release_consumed: true,
        }
    }
}
