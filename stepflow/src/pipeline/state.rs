//! Run state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{ErrorKind, PipelineError};

/// Lifecycle state of a pipeline run.
///
/// `Idle -> Running -> {Succeeded | StepFailed | TimedOut | Signalled}`.
/// The four outcomes are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Not started.
    #[default]
    Idle,
    /// A step is running or about to run.
    Running,
    /// Every step succeeded.
    Succeeded,
    /// A step failed, or the run could not proceed.
    StepFailed,
    /// The deadline elapsed.
    TimedOut,
    /// A termination signal cancelled the run.
    Signalled,
}

impl RunState {
    /// Returns true for the final states.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Running)
    }

    /// Returns the state following `self` for `next`, or `None` if the
    /// transition is not allowed.
    #[must_use]
    pub fn transition(self, next: RunState) -> Option<RunState> {
        match (self, next) {
            (Self::Idle, Self::Running) => Some(next),
            (Self::Running, n) if n.is_terminal() => Some(next),
            _ => None,
        }
    }

    /// Moves to `next` if the transition is allowed, otherwise stays put.
    #[must_use]
    pub fn advance(self, next: RunState) -> RunState {
        self.transition(next).unwrap_or(self)
    }

    /// Returns the terminal state for a run result.
    #[must_use]
    pub fn from_result(result: &Result<(), PipelineError>) -> Self {
        match result {
            Ok(()) => Self::Succeeded,
            Err(err) => match err.kind() {
                ErrorKind::TimeoutExceeded => Self::TimedOut,
                ErrorKind::Signalled => Self::Signalled,
                _ => Self::StepFailed,
            },
        }
    }

    /// Returns the state name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::StepFailed => "step_failed",
            Self::TimedOut => "timed_out",
            Self::Signalled => "signalled",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancelReason;
    use crate::errors::StepError;
    use crate::signals::TerminationSignal;

    #[test]
    fn test_transitions() {
        assert_eq!(RunState::Idle.transition(RunState::Running), Some(RunState::Running));
        assert_eq!(
            RunState::Running.transition(RunState::TimedOut),
            Some(RunState::TimedOut)
        );
        assert_eq!(RunState::Idle.transition(RunState::Succeeded), None);
        assert_eq!(RunState::Running.transition(RunState::Idle), None);
    }

    #[test]
    fn test_advance() {
        let state = RunState::Idle.advance(RunState::Running);
        assert_eq!(state, RunState::Running);
        let state = state.advance(RunState::Signalled);
        assert_eq!(state, RunState::Signalled);
        assert_eq!(state.advance(RunState::Succeeded), RunState::Signalled);
        assert_eq!(RunState::Idle.advance(RunState::TimedOut), RunState::Idle);
    }

    #[test]
    fn test_terminal_states_are_final() {
        for state in [
            RunState::Succeeded,
            RunState::StepFailed,
            RunState::TimedOut,
            RunState::Signalled,
        ] {
            assert!(state.is_terminal());
            assert_eq!(state.transition(RunState::Running), None);
            assert_eq!(state.transition(RunState::Succeeded), None);
        }
        assert!(!RunState::default().is_terminal());
    }

    #[test]
    fn test_from_result() {
        assert_eq!(RunState::from_result(&Ok(())), RunState::Succeeded);
        assert_eq!(
            RunState::from_result(&Err(StepError::violation("fmt", "x").into())),
            RunState::StepFailed
        );
        assert_eq!(
            RunState::from_result(&Err(PipelineError::cancelled(CancelReason::Deadline, None))),
            RunState::TimedOut
        );
        assert_eq!(
            RunState::from_result(&Err(PipelineError::cancelled(
                CancelReason::Signal(TerminationSignal::Terminate),
                None
            ))),
            RunState::Signalled
        );
    }

    #[test]
    fn test_serialization() {
        assert_eq!(
            serde_json::to_string(&RunState::TimedOut).unwrap(),
            "\"timed_out\""
        );
        assert_eq!(RunState::StepFailed.to_string(), "step_failed");
    }
}
