//! Error types for the stepflow executor.
//!
//! Every outcome of a run other than success is a [`PipelineError`]. Callers
//! match on [`PipelineError::kind`] or [`PipelineError::failed_step`] rather
//! than on message text.

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

use crate::cancellation::CancelReason;
use crate::signals::TerminationSignal;

/// Boxed underlying cause carried by a [`StepError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The main error type returned by pipeline runs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A step failed to run, exited non-zero, or reported a violation.
    #[error(transparent)]
    Step(#[from] StepError),

    /// The run deadline elapsed while a step was running.
    #[error("{}deadline exceeded", step_prefix(.step))]
    Timeout {
        /// The step that was in flight, if any.
        step: Option<String>,
    },

    /// A termination signal cancelled the run.
    #[error("{signal}: exiting: received signal")]
    Signalled {
        /// The signal that was delivered.
        signal: TerminationSignal,
        /// The step that was in flight, if any.
        step: Option<String>,
    },

    /// The caller supplied an unusable input (e.g. a missing project directory).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Writing a progress line to the output sink failed.
    #[error("failed to write progress: {0}")]
    Output(#[source] std::io::Error),

    /// The pipeline configuration could not be used.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Termination signal listeners could not be installed.
    #[error("failed to install signal handlers: {0}")]
    SignalSetup(#[source] std::io::Error),
}

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A process failed to spawn or exited non-zero.
    StepFailure,
    /// A process exited zero but produced disallowed output.
    ValidationFailure,
    /// The cumulative deadline elapsed.
    TimeoutExceeded,
    /// A termination signal cancelled the run.
    Signalled,
    /// Invalid caller input.
    InvalidInput,
    /// The output sink rejected a write.
    Output,
    /// Unusable configuration.
    Config,
    /// The run could not be set up.
    Setup,
}

impl PipelineError {
    /// Builds the error that corresponds to a cancellation reason.
    #[must_use]
    pub fn cancelled(reason: CancelReason, step: Option<String>) -> Self {
        match reason {
            CancelReason::Deadline => Self::Timeout { step },
            CancelReason::Signal(signal) => Self::Signalled { signal, step },
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Step(err) if err.is_validation() => ErrorKind::ValidationFailure,
            Self::Step(_) => ErrorKind::StepFailure,
            Self::Timeout { .. } => ErrorKind::TimeoutExceeded,
            Self::Signalled { .. } => ErrorKind::Signalled,
            Self::Validation(_) => ErrorKind::InvalidInput,
            Self::Output(_) => ErrorKind::Output,
            Self::Config(_) => ErrorKind::Config,
            Self::SignalSetup(_) => ErrorKind::Setup,
        }
    }

    /// Returns the name of the step this error is attributed to, if any.
    #[must_use]
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Self::Step(err) => Some(err.step()),
            Self::Timeout { step } | Self::Signalled { step, .. } => step.as_deref(),
            _ => None,
        }
    }

    /// Returns true if the run was stopped by its deadline.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::TimeoutExceeded
    }

    /// Returns true if the run was stopped by a termination signal.
    #[must_use]
    pub fn is_signal(&self) -> bool {
        self.kind() == ErrorKind::Signalled
    }

    /// Returns why the run was cancelled, if it was.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            Self::Timeout { .. } => Some(CancelReason::Deadline),
            Self::Signalled { signal, .. } => Some(CancelReason::Signal(*signal)),
            _ => None,
        }
    }

    /// Returns the step error, if this is one.
    #[must_use]
    pub fn as_step_error(&self) -> Option<&StepError> {
        match self {
            Self::Step(err) => Some(err),
            _ => None,
        }
    }
}

fn step_prefix(step: &Option<String>) -> String {
    step.as_ref()
        .map(|s| format!("step {s:?}: "))
        .unwrap_or_default()
}

/// Structured failure of a single step.
///
/// Two step errors are equal when they name the same step; the message and
/// cause are diagnostic only.
#[derive(Debug)]
pub struct StepError {
    step: String,
    message: String,
    cause: Option<BoxError>,
}

impl StepError {
    /// Creates a step error with an underlying cause.
    pub fn new(
        step: impl Into<String>,
        message: impl Into<String>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    /// Creates a step error for a tool that ran but flagged a problem.
    pub fn violation(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Creates the standard "failed to execute" error.
    pub fn failed_to_execute(step: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::new(step, "failed to execute", cause)
    }

    /// Returns the failing step's name.
    #[must_use]
    pub fn step(&self) -> &str {
        &self.step
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the underlying cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Returns true when the tool ran fine but reported a violation.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        self.cause.is_none()
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {:?}: {}", self.step, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": cause: {cause}")?;
        }
        Ok(())
    }
}

impl StdError for StepError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

impl PartialEq for StepError {
    fn eq(&self, other: &Self) -> bool {
        self.step == other.step
    }
}

impl Eq for StepError {}
