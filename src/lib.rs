pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod grouping;
pub mod normalize;
pub mod orchestrator;
pub mod origin;
pub mod state_machine;

pub use error::{Result, StatusError};
pub use orchestrator::{OrchestratorSettings, WorkflowOrchestrator};
