//! Sequential, fail-fast step runner.

use serde_json::json;
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancellation::{millis, CancelScope};
use crate::errors::PipelineError;
use crate::events::{EventKind, EventSink, NoOpEventSink, PipelineEvent};
use crate::process::{ProcessLauncher, SystemLauncher};
use crate::steps::{Step, StepContext};

/// An ordered list of steps with the capabilities they run with.
pub struct Pipeline {
    steps: Vec<Box<dyn Step>>,
    launcher: Arc<dyn ProcessLauncher>,
    events: Arc<dyn EventSink>,
}

impl Pipeline {
    /// Creates an empty pipeline that launches real processes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            launcher: Arc::new(SystemLauncher),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn with_step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Appends an already boxed step.
    pub fn push(&mut self, step: Box<dyn Step>) {
        self.steps.push(step);
    }

    /// Replaces the process launcher.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the pipeline has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the step names in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Runs every step in order under `scope`, writing each success message
    /// to `out` as soon as its step finishes.
    ///
    /// Stops at the first failure and returns it unchanged; later steps are
    /// never started.
    ///
    /// # Errors
    ///
    /// The failing step's error, a cancellation error if `scope` finished
    /// before a step started, or [`PipelineError::Output`] if `out` rejected
    /// a write.
    pub async fn run<W>(&self, scope: &CancelScope, out: &mut W) -> Result<(), PipelineError>
    where
        W: Write + ?Sized,
    {
        self.run_with_id(None, scope, out).await
    }

    pub(crate) async fn run_with_id<W>(
        &self,
        run_id: Option<Uuid>,
        scope: &CancelScope,
        out: &mut W,
    ) -> Result<(), PipelineError>
    where
        W: Write + ?Sized,
    {
        let ctx = StepContext::new(scope.clone(), self.launcher.clone());

        for (index, step) in self.steps.iter().enumerate() {
            let name = step.name();
            if let Some(reason) = scope.check() {
                debug!(step = name, %reason, "Run cancelled before step");
                return Err(PipelineError::cancelled(reason, None));
            }

            info!(step = name, index, "Starting step");
            self.emit(PipelineEvent::new(EventKind::StepStarted, run_id).with_step(name))
                .await;
            let started = Instant::now();

            match step.execute(&ctx).await {
                Ok(message) => {
                    writeln!(out, "{message}")
                        .and_then(|()| out.flush())
                        .map_err(PipelineError::Output)?;

                    let duration_ms = millis(started.elapsed());
                    info!(step = name, duration_ms, "Step succeeded");
                    self.emit(
                        PipelineEvent::new(EventKind::StepSucceeded, run_id)
                            .with_step(name)
                            .with_data(json!({ "duration_ms": duration_ms })),
                    )
                    .await;
                }
                Err(err) => {
                    let duration_ms = millis(started.elapsed());
                    warn!(step = name, duration_ms, kind = ?err.kind(), error = %err, "Step failed");
                    self.emit(
                        PipelineEvent::new(EventKind::StepFailed, run_id)
                            .with_step(name)
                            .with_data(json!({
                                "duration_ms": duration_ms,
                                "kind": format!("{:?}", err.kind()),
                                "error": err.to_string(),
                            })),
                    )
                    .await;
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    async fn emit(&self, event: PipelineEvent) {
        self.events.emit(event).await;
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.step_names())
            .field("launcher", &self.launcher)
            .field("events", &self.events)
            .finish()
    }
}
