//! Declarative pipeline configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::runner::Pipeline;
use super::supervisor::Supervisor;
use crate::errors::PipelineError;
use crate::steps::{CommandSpec, CommandStep, Step, TimeoutStep, ValidatingOutputStep};

/// How a configured step decides success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Exit status 0.
    #[default]
    Command,
    /// Exit status 0 and no output on stdout.
    ValidateOutput,
}

/// Configuration of a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name used in errors and logs.
    pub name: String,
    /// Program to run, looked up on `PATH`.
    pub executable: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Line written when the step succeeds. Defaults to `"<name>: SUCCESS"`.
    #[serde(default)]
    pub success_message: Option<String>,
    /// Success criteria.
    #[serde(default)]
    pub kind: StepKind,
    /// Optional time limit for this step alone.
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
}

impl StepConfig {
    /// Creates a command step configuration.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        executable: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            args: args.into_iter().map(Into::into).collect(),
            success_message: None,
            kind: StepKind::Command,
            timeout_seconds: None,
        }
    }

    /// Sets the success message.
    #[must_use]
    pub fn with_success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }

    /// Sets the success criteria.
    #[must_use]
    pub fn with_kind(mut self, kind: StepKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets a per-step time limit.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Returns the success message, falling back to `"<name>: SUCCESS"`.
    #[must_use]
    pub fn success_message(&self) -> String {
        self.success_message
            .clone()
            .unwrap_or_else(|| format!("{}: SUCCESS", self.name))
    }

    fn build(&self, project: &Path, grace: Duration) -> Result<Box<dyn Step>, PipelineError> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::Config("step name must not be empty".into()));
        }
        if self.executable.trim().is_empty() {
            return Err(PipelineError::Config(format!(
                "step {:?} has no executable",
                self.name
            )));
        }

        let spec = CommandSpec::new(
            &self.name,
            &self.executable,
            &self.args,
            project,
            self.success_message(),
        );
        let limit = self
            .timeout_seconds
            .map(|secs| seconds("timeout_seconds", secs))
            .transpose()?;

        Ok(match self.kind {
            StepKind::Command => bounded(CommandStep::new(spec), limit, grace),
            StepKind::ValidateOutput => bounded(ValidatingOutputStep::new(spec), limit, grace),
        })
    }
}

fn bounded<S: Step + 'static>(step: S, limit: Option<Duration>, grace: Duration) -> Box<dyn Step> {
    match limit {
        Some(limit) => Box::new(TimeoutStep::with_limit(step, limit).with_grace(grace)),
        None => Box::new(step),
    }
}

/// Configuration of a whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Cumulative deadline for a run, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Time a cancelled run gets to reap its process, in seconds.
    #[serde(default = "default_grace")]
    pub grace_seconds: f64,
    /// Steps, in execution order.
    #[serde(default = "default_steps")]
    pub steps: Vec<StepConfig>,
}

fn default_timeout() -> f64 {
    300.0
}

fn default_grace() -> f64 {
    5.0
}

fn default_steps() -> Vec<StepConfig> {
    vec![
        StepConfig::new("go build", "go", ["build", ".", "errors"])
            .with_success_message("go build: SUCCESS"),
        StepConfig::new("go test", "go", ["test", "-v"]).with_success_message("go test: SUCCESS"),
        StepConfig::new("go fmt", "gofmt", ["-l", "."])
            .with_kind(StepKind::ValidateOutput)
            .with_success_message("gofmt: SUCCESS"),
        StepConfig::new("git push", "git", ["push", "origin", "master"])
            .with_timeout(10.0)
            .with_success_message("git push: SUCCESS"),
    ]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            grace_seconds: default_grace(),
            steps: default_steps(),
        }
    }
}

impl PipelineConfig {
    /// Creates the default configuration: build, test, format check and push
    /// of a Go project.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Config`] if the document is not a valid configuration.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Sets the cumulative deadline.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Returns the cumulative deadline.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Config`] if the value is negative or not finite.
    pub fn timeout(&self) -> Result<Duration, PipelineError> {
        seconds("timeout_seconds", self.timeout_seconds)
    }

    /// Returns the grace period.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Config`] if the value is negative or not finite.
    pub fn grace(&self) -> Result<Duration, PipelineError> {
        seconds("grace_seconds", self.grace_seconds)
    }

    /// Builds the pipeline, with every step working in `project`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Config`] if there are no steps or a step is invalid.
    pub fn build(&self, project: &Path) -> Result<Pipeline, PipelineError> {
        if self.steps.is_empty() {
            return Err(PipelineError::Config("pipeline has no steps".into()));
        }

        let grace = self.grace()?;
        let mut pipeline = Pipeline::new();
        for step in &self.steps {
            pipeline.push(step.build(project, grace)?);
        }
        Ok(pipeline)
    }

    /// Builds a supervisor for `pipeline` with this configuration's deadline
    /// and grace period.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Config`] if a duration is invalid.
    pub fn supervise(&self, pipeline: Pipeline) -> Result<Supervisor, PipelineError> {
        Ok(Supervisor::new(pipeline)
            .with_timeout(self.timeout()?)
            .with_grace(self.grace()?))
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration, PipelineError> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| PipelineError::Config(format!("{field}: {e}")))
}

/// Checks that `project` names an existing directory and returns its
/// absolute, canonical form.
///
/// # Errors
///
/// [`PipelineError::Validation`] if the path is empty, missing, or not a
/// directory.
pub fn resolve_project_dir(project: &Path) -> Result<PathBuf, PipelineError> {
    if project.as_os_str().is_empty() {
        return Err(PipelineError::Validation(
            "project directory is required".into(),
        ));
    }

    let dir = project.canonicalize().map_err(|e| {
        PipelineError::Validation(format!("project directory {}: {e}", project.display()))
    })?;
    if !dir.is_dir() {
        return Err(PipelineError::Validation(format!(
            "project directory {}: not a directory",
            project.display()
        )));
    }
    Ok(dir)
}
