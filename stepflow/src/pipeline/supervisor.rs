//! Run supervision: deadline, termination signals and teardown.

use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::runner::Pipeline;
use super::state::RunState;
use crate::cancellation::{
    expiry, millis, settle, CancelReason, CancelScope, CancellationToken, DEFAULT_GRACE,
};
use crate::errors::PipelineError;
use crate::events::{EventKind, PipelineEvent};
use crate::signals::{OsSignals, TerminationSignals};

/// Default cumulative deadline for a run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Owns a pipeline and runs it under a deadline and termination signals.
///
/// Whichever of {pipeline completion, deadline, signal} happens first
/// decides the outcome. On deadline or signal the shared token is cancelled
/// so the in-flight step kills its process, and the run is given a grace
/// period to reap it before being dropped.
#[derive(Debug)]
pub struct Supervisor {
    pipeline: Pipeline,
    timeout: Duration,
    grace: Duration,
}

impl Supervisor {
    /// Creates a supervisor with the default deadline and grace period.
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            timeout: DEFAULT_TIMEOUT,
            grace: DEFAULT_GRACE,
        }
    }

    /// Sets the cumulative deadline measured from the start of a run.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how long a cancelled run may take to wind down.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Returns the deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the supervised pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Runs the pipeline, listening for interrupt and terminate signals
    /// from the operating system.
    ///
    /// # Errors
    ///
    /// See [`Supervisor::run_with_signals`]. Also fails with
    /// [`PipelineError::SignalSetup`] if the listeners cannot be installed.
    pub async fn run<W>(&self, out: &mut W) -> Result<(), PipelineError>
    where
        W: Write + ?Sized,
    {
        let signals = OsSignals::install().map_err(PipelineError::SignalSetup)?;
        self.run_with_signals(signals, out).await
    }

    /// Runs the pipeline, treating anything `signals` yields as a request
    /// to terminate.
    ///
    /// # Errors
    ///
    /// The first failing step's error, [`PipelineError::Timeout`] if the
    /// deadline elapsed, or [`PipelineError::Signalled`] if a signal
    /// arrived first.
    pub async fn run_with_signals<S, W>(&self, mut signals: S, out: &mut W) -> Result<(), PipelineError>
    where
        S: TerminationSignals,
        W: Write + ?Sized,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id);
        self.supervise(run_id, &mut signals, out).instrument(span).await
    }

    async fn supervise<S, W>(&self, run_id: Uuid, signals: &mut S, out: &mut W) -> Result<(), PipelineError>
    where
        S: TerminationSignals,
        W: Write + ?Sized,
    {
        let started = StdInstant::now();
        let token = Arc::new(CancellationToken::new());
        let scope = CancelScope::with_timeout(token.clone(), self.timeout);
        let state = RunState::Idle.advance(RunState::Running);

        info!(
            steps = self.pipeline.len(),
            timeout_ms = millis(self.timeout),
            bounded = scope.deadline().is_some(),
            %state,
            "Pipeline run started"
        );
        self.emit(
            PipelineEvent::new(EventKind::RunStarted, Some(run_id)).with_data(json!({
                "steps": self.pipeline.step_names(),
                "timeout_ms": millis(self.timeout),
            })),
        )
        .await;

        let run = self.pipeline.run_with_id(Some(run_id), &scope, out);
        tokio::pin!(run);

        let result = tokio::select! {
            biased;
            result = &mut run => result,
            Some(signal) = signals.recv() => {
                self.cancel(&token, CancelReason::Signal(signal), run.as_mut()).await
            }
            () = expiry(scope.deadline()) => {
                self.cancel(&token, CancelReason::Deadline, run.as_mut()).await
            }
        };

        if let Some(reason) = result.as_ref().err().and_then(PipelineError::cancel_reason) {
            self.emit(
                PipelineEvent::new(EventKind::RunCancelled, Some(run_id))
                    .with_data(json!({ "reason": reason.to_string() })),
            )
            .await;
        }

        let state = state.advance(RunState::from_result(&result));
        let duration_ms = millis(started.elapsed());
        match &result {
            Ok(()) => info!(%state, duration_ms, "Pipeline run finished"),
            Err(err) => warn!(%state, duration_ms, error = %err, "Pipeline run finished"),
        }
        self.emit(
            PipelineEvent::new(EventKind::RunFinished, Some(run_id)).with_data(json!({
                "state": state,
                "duration_ms": duration_ms,
                "error": result.as_ref().err().map(ToString::to_string),
            })),
        )
        .await;

        result
    }

    /// Cancels the shared token and lets the run wind down.
    ///
    /// The outcome is always the cancellation kind for `reason`; the step
    /// name is taken from the run's own error when it settles in time.
    async fn cancel<F>(
        &self,
        token: &CancellationToken,
        reason: CancelReason,
        run: std::pin::Pin<&mut F>,
    ) -> Result<(), PipelineError>
    where
        F: std::future::Future<Output = Result<(), PipelineError>> + ?Sized,
    {
        token.cancel(reason);
        warn!(%reason, "Cancelling pipeline run");

        let step = match settle(run, self.grace).await {
            Some(Err(err)) => err.failed_step().map(ToString::to_string),
            _ => None,
        };
        Err(PipelineError::cancelled(reason, step))
    }

    async fn emit(&self, event: PipelineEvent) {
        self.pipeline.event_sink().emit(event).await;
    }
}
