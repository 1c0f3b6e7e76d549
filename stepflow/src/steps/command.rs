//! Plain command step: success means exit status 0.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{Step, StepContext};
use crate::errors::{PipelineError, StepError};
use crate::process::{run_to_exit, Invocation};

/// The fixed configuration of one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    name: String,
    executable: String,
    args: Vec<String>,
    working_dir: PathBuf,
    success_message: String,
}

impl CommandSpec {
    /// Creates a command specification.
    pub fn new(
        name: impl Into<String>,
        executable: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
        working_dir: impl Into<PathBuf>,
        success_message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: working_dir.into(),
            success_message: success_message.into(),
        }
    }

    /// Returns the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the executable.
    #[must_use]
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Returns the arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the working directory.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Returns the message reported on success.
    #[must_use]
    pub fn success_message(&self) -> &str {
        &self.success_message
    }

    /// Builds the process invocation for this command.
    #[must_use]
    pub fn invocation(&self) -> Invocation {
        Invocation::new(&self.executable, &self.args, &self.working_dir)
    }
}

/// A step that succeeds iff its process exits with status 0.
#[derive(Debug, Clone)]
pub struct CommandStep {
    spec: CommandSpec,
}

impl CommandStep {
    /// Creates a command step.
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
impl Step for CommandStep {
    fn name(&self) -> &str {
        self.spec.name()
    }

    async fn execute(&self, ctx: &StepContext) -> Result<String, PipelineError> {
        let output = run_to_exit(
            ctx.launcher(),
            ctx.scope(),
            self.name(),
            &self.spec.invocation(),
        )
        .await?;

        output
            .exit_ok()
            .map_err(|e| StepError::failed_to_execute(self.name(), e))?;

        Ok(self.spec.success_message().to_string())
    }
}
