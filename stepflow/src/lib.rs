//! # Stepflow
//!
//! A sequential build/test/deploy pipeline executor.
//!
//! Stepflow runs an ordered list of external commands against a project
//! directory with support for:
//!
//! - **Fail-fast execution**: the first failing step stops the run
//! - **Pluggable success criteria**: exit status, empty output, time limits
//! - **Deadlines**: one cumulative deadline bounds the whole run
//! - **Signal handling**: interrupt and terminate cancel the run and kill the
//!   in-flight process
//! - **Typed errors**: callers match on [`ErrorKind`], never on message text
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepflow::prelude::*;
//!
//! let pipeline = Pipeline::new()
//!     .with_step(CommandStep::new(CommandSpec::new(
//!         "go build", "go", ["build", "."], "/src/app", "go build: SUCCESS",
//!     )));
//!
//! Supervisor::new(pipeline)
//!     .with_timeout(Duration::from_secs(60))
//!     .run(&mut std::io::stdout())
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod process;
pub mod signals;
pub mod steps;
pub mod testing;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

pub use errors::{ErrorKind, PipelineError, StepError};

use events::LoggingEventSink;
use pipeline::{resolve_project_dir, PipelineConfig};
use process::{ProcessLauncher, SystemLauncher};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancelReason, CancelScope, CancellationToken};
    pub use crate::errors::{ErrorKind, PipelineError, StepError};
    pub use crate::events::{EventKind, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
    pub use crate::pipeline::{Pipeline, PipelineConfig, RunState, StepConfig, StepKind, Supervisor};
    pub use crate::process::{Invocation, ProcessLauncher, SystemLauncher};
    pub use crate::signals::{TerminationSignal, TerminationSignals};
    pub use crate::steps::{
        CommandSpec, CommandStep, Step, StepContext, TimeoutStep, ValidatingOutputStep,
    };
    pub use std::time::Duration;
}

/// Runs the default Go pipeline (build, test, format check, push) in
/// `project`, writing one line per successful step to `out`.
///
/// Interrupt and terminate signals cancel the run.
///
/// # Errors
///
/// [`PipelineError::Validation`] if `project` is not an existing directory,
/// otherwise whatever the run returns.
pub async fn run<P, W>(project: P, out: &mut W) -> Result<(), PipelineError>
where
    P: AsRef<Path>,
    W: Write + ?Sized,
{
    run_with_config(
        &PipelineConfig::default(),
        project,
        Arc::new(SystemLauncher),
        out,
    )
    .await
}

/// Runs the pipeline described by `config` in `project`, launching
/// processes through `launcher`.
///
/// # Errors
///
/// [`PipelineError::Validation`] for a bad project directory,
/// [`PipelineError::Config`] for an unusable configuration, otherwise
/// whatever the run returns.
pub async fn run_with_config<P, W>(
    config: &PipelineConfig,
    project: P,
    launcher: Arc<dyn ProcessLauncher>,
    out: &mut W,
) -> Result<(), PipelineError>
where
    P: AsRef<Path>,
    W: Write + ?Sized,
{
    let project = resolve_project_dir(project.as_ref())?;
    let pipeline = config
        .build(&project)?
        .with_launcher(launcher)
        .with_event_sink(Arc::new(LoggingEventSink::debug()));

    config.supervise(pipeline)?.run(out).await
}
