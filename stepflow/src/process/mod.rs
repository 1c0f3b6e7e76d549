//! External process execution.
//!
//! This module provides:
//! - `ProcessLauncher` / `ChildProcess`, the injectable spawn seam
//! - `SystemLauncher`, backed by `tokio::process`
//! - `run_to_exit`, which races a child against a cancellation scope

mod launcher;

pub use launcher::{
    ChildProcess, ExitError, Invocation, ProcessLauncher, ProcessOutput, SystemLauncher,
};

use crate::cancellation::CancelScope;
use crate::errors::{PipelineError, StepError};
use tracing::{debug, warn};

/// Runs one process to completion unless the scope finishes first.
///
/// - exit before cancellation: returns the process output, whatever its code
/// - spawn or wait failure: a "failed to execute" [`StepError`]
/// - deadline or token cancellation: kills and reaps the child, then returns
///   the matching [`PipelineError::Timeout`] or [`PipelineError::Signalled`]
pub async fn run_to_exit(
    launcher: &dyn ProcessLauncher,
    scope: &CancelScope,
    step: &str,
    invocation: &Invocation,
) -> Result<ProcessOutput, PipelineError> {
    if let Some(reason) = scope.check() {
        return Err(PipelineError::cancelled(reason, Some(step.to_string())));
    }

    let mut child = launcher
        .launch(invocation)
        .map_err(|e| StepError::failed_to_execute(step, e))?;

    let reason = tokio::select! {
        biased;
        result = child.wait() => {
            let output = result.map_err(|e| StepError::failed_to_execute(step, e))?;
            debug!(step, code = ?output.code, "Process exited");
            return Ok(output);
        }
        reason = scope.done() => reason,
    };

    warn!(step, pid = ?child.id(), %reason, "Killing in-flight process");
    if let Err(e) = child.kill().await {
        warn!(step, error = %e, "Failed to kill process");
    }
    Err(PipelineError::cancelled(reason, Some(step.to_string())))
}
