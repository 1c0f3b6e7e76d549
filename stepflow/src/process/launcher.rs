//! Process launch capability.

use async_trait::async_trait;
use std::fmt::Debug;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

/// Everything needed to start one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// The executable to spawn.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Working directory of the child.
    pub working_dir: PathBuf,
    /// Whether standard output is captured (otherwise it is discarded).
    pub capture_stdout: bool,
}

impl Invocation {
    /// Creates an invocation that discards standard output.
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: working_dir.into(),
            capture_stdout: false,
        }
    }

    /// Requests standard output capture.
    #[must_use]
    pub fn capturing_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }
}

/// How a child process finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output (empty unless capture was requested).
    pub stdout: Vec<u8>,
}

impl ProcessOutput {
    /// Returns true if the process exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Converts a non-zero exit into an error.
    pub fn exit_ok(&self) -> Result<(), ExitError> {
        if self.success() {
            Ok(())
        } else {
            Err(ExitError { code: self.code })
        }
    }
}

/// A child process that exited unsuccessfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{}", describe_exit(.code))]
pub struct ExitError {
    /// Exit code, `None` if the process was terminated by a signal.
    pub code: Option<i32>,
}

fn describe_exit(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("exit status: {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Spawns child processes for steps.
///
/// This is the seam that lets tests substitute scripted processes for real
/// commands.
pub trait ProcessLauncher: Send + Sync + Debug {
    /// Starts the process described by `invocation`.
    fn launch(&self, invocation: &Invocation) -> io::Result<Box<dyn ChildProcess>>;
}

/// A running child process.
#[async_trait]
pub trait ChildProcess: Send {
    /// Waits for the process to exit.
    ///
    /// Must be cancel-safe: dropping the future before completion leaves the
    /// process running and waitable or killable.
    async fn wait(&mut self) -> io::Result<ProcessOutput>;

    /// Forcibly terminates the process and reaps it.
    async fn kill(&mut self) -> io::Result<()>;

    /// Returns the OS process id, if known.
    fn id(&self) -> Option<u32>;
}

/// Launches real operating-system processes through `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, invocation: &Invocation) -> io::Result<Box<dyn ChildProcess>> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        if invocation.capture_stdout {
            command.stdout(Stdio::piped());
        } else {
            command.stdout(Stdio::null());
        }

        let mut child = command.spawn()?;
        debug!(
            program = %invocation.program,
            pid = ?child.id(),
            dir = %invocation.working_dir.display(),
            "Spawned process"
        );

        // Drain stdout concurrently so a chatty child never blocks on a full pipe.
        let stdout = child.stdout.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                pipe.read_to_end(&mut buf).await?;
                Ok(buf)
            })
        });

        Ok(Box::new(SystemChild { child, stdout }))
    }
}

struct SystemChild {
    child: Child,
    stdout: Option<JoinHandle<io::Result<Vec<u8>>>>,
}

#[async_trait]
impl ChildProcess for SystemChild {
    async fn wait(&mut self) -> io::Result<ProcessOutput> {
        let status = self.child.wait().await?;
        let stdout = match self.stdout.take() {
            Some(reader) => reader.await.map_err(io::Error::other)??,
            None => Vec::new(),
        };
        Ok(ProcessOutput {
            code: status.code(),
            stdout,
        })
    }

    async fn kill(&mut self) -> io::Result<()> {
        if let Some(reader) = self.stdout.take() {
            reader.abort();
        }
        self.child.kill().await
    }

    fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh", ["-c", script], std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_system_launcher_exit_codes() {
        let mut ok = SystemLauncher.launch(&sh("exit 0")).unwrap();
        assert!(ok.wait().await.unwrap().success());

        let mut failed = SystemLauncher.launch(&sh("exit 3")).unwrap();
        let output = failed.wait().await.unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.exit_ok(), Err(ExitError { code: Some(3) }));
    }

    #[tokio::test]
    async fn test_system_launcher_captures_stdout() {
        let invocation = sh("printf 'a.go\\nb.go\\n'").capturing_stdout();
        let mut child = SystemLauncher.launch(&invocation).unwrap();
        let output = child.wait().await.unwrap();
        assert_eq!(output.stdout, b"a.go\nb.go\n");
    }

    #[tokio::test]
    async fn test_system_launcher_discards_stdout_by_default() {
        let mut child = SystemLauncher.launch(&sh("echo hidden")).unwrap();
        assert!(child.wait().await.unwrap().stdout.is_empty());
    }

    #[tokio::test]
    async fn test_system_launcher_uses_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();

        let invocation = Invocation::new("sh", ["-c", "test -f marker"], dir.path());
        let mut child = SystemLauncher.launch(&invocation).unwrap();
        assert!(child.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_system_launcher_kill() {
        let mut child = SystemLauncher.launch(&sh("sleep 30")).unwrap();
        assert!(child.id().is_some());
        child.kill().await.unwrap();
        // Reaped: the handle no longer reports a pid.
        assert!(child.id().is_none());
    }

    #[test]
    fn test_missing_executable_fails_to_launch() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let invocation = Invocation::new("definitely-not-a-real-binary-x9", Vec::<String>::new(), ".");
        assert!(SystemLauncher.launch(&invocation).is_err());
    }

    #[test]
    fn test_exit_error_display() {
        assert_eq!(ExitError { code: Some(1) }.to_string(), "exit status: 1");
        assert_eq!(ExitError { code: None }.to_string(), "terminated by signal");
    }
}
