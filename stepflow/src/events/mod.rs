//! Run lifecycle events.
//!
//! Every pipeline run reports what it does as a stream of
//! [`PipelineEvent`]s delivered to an [`EventSink`]. The default sink
//! discards them; [`LoggingEventSink`] forwards them to `tracing`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kind of a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A run began.
    #[serde(rename = "run.started")]
    RunStarted,
    /// A step began.
    #[serde(rename = "step.started")]
    StepStarted,
    /// A step succeeded and its message was written.
    #[serde(rename = "step.succeeded")]
    StepSucceeded,
    /// A step failed; the run stops.
    #[serde(rename = "step.failed")]
    StepFailed,
    /// The run was cancelled by its deadline or a signal.
    #[serde(rename = "run.cancelled")]
    RunCancelled,
    /// The run reached a terminal state.
    #[serde(rename = "run.finished")]
    RunFinished,
}

impl EventKind {
    /// Returns the dotted event name, e.g. `"step.started"`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStarted => "run.started",
            Self::StepStarted => "step.started",
            Self::StepSucceeded => "step.succeeded",
            Self::StepFailed => "step.failed",
            Self::RunCancelled => "run.cancelled",
            Self::RunFinished => "run.finished",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// What happened.
    pub kind: EventKind,
    /// The run this event belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    /// The step this event concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Free-form details.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PipelineEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(kind: EventKind, run_id: Option<Uuid>) -> Self {
        Self {
            kind,
            run_id,
            step: None,
            timestamp: Utc::now(),
            data: serde_json::Value::Null,
        }
    }

    /// Attaches the step name.
    #[must_use]
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// Attaches event details.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
