//! Step trait and implementations.
//!
//! Steps are the units of work in a pipeline. Each one spawns a single
//! external command and decides, from how it ends, whether the stage
//! succeeded.

mod command;
mod timeout;
mod validating;

pub use command::{CommandSpec, CommandStep};
pub use timeout::TimeoutStep;
pub use validating::ValidatingOutputStep;

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::cancellation::CancelScope;
use crate::errors::PipelineError;
use crate::process::ProcessLauncher;

/// Trait for pipeline steps.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the name of the step, used in errors and logs.
    fn name(&self) -> &str;

    /// Executes the step.
    ///
    /// # Returns
    ///
    /// The step's success message, or the error that stops the pipeline.
    async fn execute(&self, ctx: &StepContext) -> Result<String, PipelineError>;
}

#[async_trait]
impl<S: Step + ?Sized> Step for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn execute(&self, ctx: &StepContext) -> Result<String, PipelineError> {
        (**self).execute(ctx).await
    }
}

#[async_trait]
impl<S: Step + ?Sized> Step for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn execute(&self, ctx: &StepContext) -> Result<String, PipelineError> {
        (**self).execute(ctx).await
    }
}

/// What a step can see while it runs: the cancellation scope and the
/// capability to launch processes.
#[derive(Debug, Clone)]
pub struct StepContext {
    scope: CancelScope,
    launcher: Arc<dyn ProcessLauncher>,
}

impl StepContext {
    /// Creates a step context.
    #[must_use]
    pub fn new(scope: CancelScope, launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self { scope, launcher }
    }

    /// Returns the cancellation scope.
    #[must_use]
    pub fn scope(&self) -> &CancelScope {
        &self.scope
    }

    /// Returns the process launcher.
    #[must_use]
    pub fn launcher(&self) -> &dyn ProcessLauncher {
        self.launcher.as_ref()
    }

    /// Returns a context that shares the launcher but uses another scope.
    #[must_use]
    pub fn with_scope(&self, scope: CancelScope) -> Self {
        Self {
            scope,
            launcher: self.launcher.clone(),
        }
    }
}
