//! Mock steps for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::time::Duration;

use crate::errors::{PipelineError, StepError};
use crate::steps::{Step, StepContext};

/// What a [`MockStep`] does when executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Succeeds with the given message.
    Succeed(String),
    /// Fails as if its process exited non-zero.
    Fail,
    /// Reports a violation with the given message.
    Violate(String),
    /// Never finishes and ignores cancellation.
    Hang,
}

/// A step that returns a scripted outcome without launching anything.
#[derive(Debug)]
pub struct MockStep {
    name: String,
    outcome: Mutex<MockOutcome>,
    delay: Duration,
    call_count: Mutex<usize>,
}

impl MockStep {
    /// Creates a mock step that succeeds with `"<name>: SUCCESS"`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let message = format!("{name}: SUCCESS");
        Self::with_outcome(name, MockOutcome::Succeed(message))
    }

    /// Creates a mock step with the given outcome.
    #[must_use]
    pub fn with_outcome(name: impl Into<String>, outcome: MockOutcome) -> Self {
        Self {
            name: name.into(),
            outcome: Mutex::new(outcome),
            delay: Duration::ZERO,
            call_count: Mutex::new(0),
        }
    }

    /// Creates a mock step that fails to execute.
    #[must_use]
    pub fn failing(name: impl Into<String>) -> Self {
        Self::with_outcome(name, MockOutcome::Fail)
    }

    /// Creates a mock step that never completes.
    #[must_use]
    pub fn hanging(name: impl Into<String>) -> Self {
        Self::with_outcome(name, MockOutcome::Hang)
    }

    /// Delays the outcome by `delay`.
    #[must_use]
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replaces the outcome for later executions.
    pub fn set_outcome(&self, outcome: MockOutcome) {
        *self.outcome.lock() = outcome;
    }

    /// Returns the number of times the step was executed.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl Step for MockStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StepContext) -> Result<String, PipelineError> {
        *self.call_count.lock() += 1;
        let outcome = self.outcome.lock().clone();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match outcome {
            MockOutcome::Succeed(message) => Ok(message),
            MockOutcome::Fail => Err(StepError::failed_to_execute(
                &self.name,
                io::Error::other("exit status: 1"),
            )
            .into()),
            MockOutcome::Violate(message) => Err(StepError::violation(&self.name, message).into()),
            MockOutcome::Hang => std::future::pending().await,
        }
    }
}
