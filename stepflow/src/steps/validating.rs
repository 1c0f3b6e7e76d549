//! Step for tools that report problems on stdout (formatters, linters).

use async_trait::async_trait;

use super::{CommandSpec, Step, StepContext};
use crate::errors::{PipelineError, StepError};
use crate::process::run_to_exit;

/// A step that succeeds iff its process exits 0 and prints nothing.
///
/// Output from a successful exit is a reported violation, so the resulting
/// [`StepError`] carries no cause.
#[derive(Debug, Clone)]
pub struct ValidatingOutputStep {
    spec: CommandSpec,
}

impl ValidatingOutputStep {
    /// Creates a validating step.
    #[must_use]
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    /// Returns the command specification.
    #[must_use]
    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }
}

#[async_trait]
impl Step for ValidatingOutputStep {
    fn name(&self) -> &str {
        self.spec.name()
    }

    async fn execute(&self, ctx: &StepContext) -> Result<String, PipelineError> {
        let invocation = self.spec.invocation().capturing_stdout();
        let output = run_to_exit(ctx.launcher(), ctx.scope(), self.name(), &invocation).await?;

        output
            .exit_ok()
            .map_err(|e| StepError::failed_to_execute(self.name(), e))?;

        if !output.stdout.is_empty() {
            let reported = String::from_utf8_lossy(&output.stdout).replace('\n', " ");
            return Err(StepError::violation(self.name(), format!("invalid format: {reported}")).into());
        }

        Ok(self.spec.success_message().to_string())
    }
}
