//! Pipeline building and execution.
//!
//! This module provides:
//! - `Pipeline`, the sequential fail-fast runner
//! - `Supervisor`, which races a run against its deadline and signals
//! - `PipelineConfig`, the declarative form of a pipeline
//! - `RunState`, the lifecycle of a single run

mod config;
mod runner;
mod state;
mod supervisor;

pub use config::{resolve_project_dir, PipelineConfig, StepConfig, StepKind};
pub use runner::Pipeline;
pub use state::RunState;
pub use supervisor::{Supervisor, DEFAULT_TIMEOUT};
