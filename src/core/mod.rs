pub mod config;
pub mod engine;
pub mod events;
pub mod memo;

pub use config::EngineConfig;
pub use engine::{Calculation, ExecutionPlan, NodeInstruction, PlanStep};
pub(crate) use engine::bind_inputs;
pub use events::ExecutionEvent;
pub use memo::MemoTable;
