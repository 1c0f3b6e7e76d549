//! Deadline- and signal-bounded decorator for any step.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Step, StepContext};
use crate::cancellation::{settle, DEFAULT_GRACE};
use crate::errors::PipelineError;

/// Runs a wrapped step under the enclosing deadline and termination signals.
///
/// Outcomes:
/// 1. the wrapped step finishes first: its own success criteria decide
/// 2. the deadline elapses first: the process is killed, `Timeout` is returned
/// 3. a termination signal arrives first: the process is killed, `Signalled`
///    is returned
///
/// An optional per-step `limit` narrows the deadline for this step only.
#[derive(Debug)]
pub struct TimeoutStep {
    inner: Box<dyn Step>,
    limit: Option<Duration>,
    grace: Duration,
}

impl TimeoutStep {
    /// Wraps `inner`, bounded by the enclosing deadline.
    pub fn new(inner: impl Step + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            limit: None,
            grace: DEFAULT_GRACE,
        }
    }

    /// Wraps `inner`, additionally limited to `limit` from the moment it starts.
    pub fn with_limit(inner: impl Step + 'static, limit: Duration) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new(inner)
        }
    }

    /// Sets how long a cancelled inner step may take to reap its process.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Returns the per-step limit, if any.
    #[must_use]
    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }
}

#[async_trait]
impl Step for TimeoutStep {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn execute(&self, ctx: &StepContext) -> Result<String, PipelineError> {
        let scope = match self.limit {
            Some(limit) => ctx.scope().narrowed_by(limit),
            None => ctx.scope().clone(),
        };
        debug!(step = self.name(), remaining = ?scope.remaining(), "Running bounded step");

        let bounded = ctx.with_scope(scope.clone());
        let work = self.inner.execute(&bounded);
        tokio::pin!(work);

        let reason = tokio::select! {
            biased;
            result = &mut work => return result,
            reason = scope.done() => reason,
        };

        warn!(step = self.name(), %reason, "Step interrupted");
        let expected = PipelineError::cancelled(reason, None).kind();
        match settle(work.as_mut(), self.grace).await {
            Some(Err(err)) if err.kind() == expected => Err(err),
            _ => Err(PipelineError::cancelled(reason, Some(self.name().to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::{CancelReason, CancelScope, CancellationToken};
    use crate::errors::ErrorKind;
    use crate::signals::TerminationSignal;
    use crate::steps::{CommandSpec, CommandStep, ValidatingOutputStep};
    use crate::testing::{FakeBehavior, FakeLauncher, MockStep};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn push_step() -> CommandStep {
        CommandStep::new(CommandSpec::new(
            "git push",
            "git",
            ["push", "origin", "master"],
            "/proj",
            "git push: SUCCESS",
        ))
    }

    fn context(launcher: Arc<FakeLauncher>, scope: CancelScope) -> StepContext {
        StepContext::new(scope, launcher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_before_deadline() {
        let launcher = Arc::new(
            FakeLauncher::new().with("git", FakeBehavior::exit(0).after(Duration::from_secs(1))),
        );
        let scope = CancelScope::with_timeout(Arc::new(CancellationToken::new()), Duration::from_secs(10));
        let step = TimeoutStep::new(push_step());

        let message = step.execute(&context(launcher, scope)).await.unwrap();
        assert_eq!(message, "git push: SUCCESS");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delegates_success_criteria() {
        let launcher = Arc::new(
            FakeLauncher::new().with("gofmt", FakeBehavior::exit(0).with_stdout("x.go\n")),
        );
        let scope = CancelScope::with_timeout(Arc::new(CancellationToken::new()), Duration::from_secs(10));
        let step = TimeoutStep::new(ValidatingOutputStep::new(CommandSpec::new(
            "go fmt",
            "gofmt",
            ["-l", "."],
            "/proj",
            "gofmt: SUCCESS",
        )));

        let err = step.execute(&context(launcher, scope)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_kills_process() {
        let launcher = Arc::new(FakeLauncher::new().with("git", FakeBehavior::hang()));
        let scope = CancelScope::with_timeout(Arc::new(CancellationToken::new()), Duration::from_secs(5));
        let step = TimeoutStep::new(push_step());

        let err = step.execute(&context(launcher.clone(), scope)).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.failed_step(), Some("git push"));
        assert_eq!(launcher.running_count(), 0);
        assert_eq!(launcher.killed_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_step_limit_narrows_deadline() {
        let launcher = Arc::new(FakeLauncher::new().with("git", FakeBehavior::hang()));
        let scope = CancelScope::with_timeout(Arc::new(CancellationToken::new()), Duration::from_secs(300));
        let step = TimeoutStep::with_limit(push_step(), Duration::from_secs(10));
        assert_eq!(step.limit(), Some(Duration::from_secs(10)));

        let start = Instant::now();
        let err = step.execute(&context(launcher, scope)).await.unwrap_err();
        assert!(err.is_timeout());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_kills_process() {
        let launcher = Arc::new(FakeLauncher::new().with("git", FakeBehavior::hang()));
        let token = Arc::new(CancellationToken::new());
        let scope = CancelScope::with_timeout(token.clone(), Duration::from_secs(60));
        let step = TimeoutStep::new(push_step());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            token.cancel(CancelReason::Signal(TerminationSignal::Interrupt));
        });

        let err = step.execute(&context(launcher.clone(), scope)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signalled);
        assert_eq!(err.failed_step(), Some("git push"));
        assert_eq!(launcher.running_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounds_steps_that_ignore_the_scope() {
        let launcher = Arc::new(FakeLauncher::new());
        let scope = CancelScope::with_timeout(Arc::new(CancellationToken::new()), Duration::from_secs(1));
        let step = TimeoutStep::new(MockStep::hanging("stubborn")).with_grace(Duration::from_millis(100));

        let err = step.execute(&context(launcher, scope)).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.failed_step(), Some("stubborn"));
    }
}
