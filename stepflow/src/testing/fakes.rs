//! Scripted process launcher for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::process::{ChildProcess, Invocation, ProcessLauncher, ProcessOutput};

/// What a fake process does once launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeBehavior {
    code: i32,
    stdout: Vec<u8>,
    delay: Duration,
    hang: bool,
    spawn_error: bool,
}

impl FakeBehavior {
    /// Exits immediately with `code`.
    #[must_use]
    pub fn exit(code: i32) -> Self {
        Self {
            code,
            stdout: Vec::new(),
            delay: Duration::ZERO,
            hang: false,
            spawn_error: false,
        }
    }

    /// Runs until killed.
    #[must_use]
    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Self::exit(0)
        }
    }

    /// Fails to spawn, like a missing executable.
    #[must_use]
    pub fn spawn_error() -> Self {
        Self {
            spawn_error: true,
            ..Self::exit(0)
        }
    }

    /// Writes `stdout` before exiting.
    #[must_use]
    pub fn with_stdout(mut self, stdout: impl Into<Vec<u8>>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Exits only after `delay` has elapsed.
    #[must_use]
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self::exit(0)
    }
}

#[derive(Debug, Default)]
struct FakeProcessState {
    running: AtomicBool,
    killed: AtomicBool,
}

/// A [`ProcessLauncher`] that never touches the operating system.
///
/// Behaviors are matched against the command line (`program` followed by
/// its arguments, space separated); the longest matching prefix wins and
/// unmatched commands exit 0.
#[derive(Debug, Default)]
pub struct FakeLauncher {
    script: Vec<(String, FakeBehavior)>,
    fallback: FakeBehavior,
    launched: Mutex<Vec<Invocation>>,
    processes: Mutex<Vec<Arc<FakeProcessState>>>,
}

impl FakeLauncher {
    /// Creates a launcher where every command exits 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the behavior of commands starting with `command_prefix`.
    #[must_use]
    pub fn with(mut self, command_prefix: impl Into<String>, behavior: FakeBehavior) -> Self {
        self.script.push((command_prefix.into(), behavior));
        self
    }

    /// Sets the behavior of unmatched commands.
    #[must_use]
    pub fn with_fallback(mut self, behavior: FakeBehavior) -> Self {
        self.fallback = behavior;
        self
    }

    /// Returns every invocation launched so far, in order.
    #[must_use]
    pub fn launched(&self) -> Vec<Invocation> {
        self.launched.lock().clone()
    }

    /// Returns the programs launched so far, in order.
    #[must_use]
    pub fn launched_programs(&self) -> Vec<String> {
        self.launched
            .lock()
            .iter()
            .map(|inv| inv.program.clone())
            .collect()
    }

    /// Returns how many launched processes have not exited or been killed.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.processes
            .lock()
            .iter()
            .filter(|p| p.running.load(Ordering::SeqCst))
            .count()
    }

    /// Returns how many launched processes were killed.
    #[must_use]
    pub fn killed_count(&self) -> usize {
        self.processes
            .lock()
            .iter()
            .filter(|p| p.killed.load(Ordering::SeqCst))
            .count()
    }

    fn behavior_for(&self, invocation: &Invocation) -> FakeBehavior {
        let mut command_line = invocation.program.clone();
        for arg in &invocation.args {
            command_line.push(' ');
            command_line.push_str(arg);
        }

        self.script
            .iter()
            .filter(|(prefix, _)| command_line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or_else(|| self.fallback.clone(), |(_, behavior)| behavior.clone())
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, invocation: &Invocation) -> io::Result<Box<dyn ChildProcess>> {
        self.launched.lock().push(invocation.clone());

        let behavior = self.behavior_for(invocation);
        if behavior.spawn_error {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("executable file not found: {}", invocation.program),
            ));
        }

        let state = Arc::new(FakeProcessState::default());
        state.running.store(true, Ordering::SeqCst);
        self.processes.lock().push(state.clone());

        Ok(Box::new(FakeChild {
            exits_at: Instant::now() + behavior.delay,
            capture_stdout: invocation.capture_stdout,
            behavior,
            state,
        }))
    }
}

struct FakeChild {
    behavior: FakeBehavior,
    exits_at: Instant,
    capture_stdout: bool,
    state: Arc<FakeProcessState>,
}

#[async_trait]
impl ChildProcess for FakeChild {
    async fn wait(&mut self) -> io::Result<ProcessOutput> {
        if self.behavior.hang {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep_until(self.exits_at).await;
        self.state.running.store(false, Ordering::SeqCst);

        Ok(ProcessOutput {
            code: Some(self.behavior.code),
            stdout: if self.capture_stdout {
                self.behavior.stdout.clone()
            } else {
                Vec::new()
            },
        })
    }

    async fn kill(&mut self) -> io::Result<()> {
        if self.state.running.swap(false, Ordering::SeqCst) {
            self.state.killed.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn id(&self) -> Option<u32> {
        None
    }
}

impl Drop for FakeChild {
    // Mirrors kill-on-drop of real children.
    fn drop(&mut self) {
        if self.state.running.swap(false, Ordering::SeqCst) {
            self.state.killed.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_prefix_wins() {
        let launcher = FakeLauncher::new()
            .with("go", FakeBehavior::exit(1))
            .with("go test", FakeBehavior::exit(2));

        let build = Invocation::new("go", ["build", "."], "/p");
        let test = Invocation::new("go", ["test", "-v"], "/p");
        let other = Invocation::new("git", ["push"], "/p");

        assert_eq!(launcher.behavior_for(&build), FakeBehavior::exit(1));
        assert_eq!(launcher.behavior_for(&test), FakeBehavior::exit(2));
        assert_eq!(launcher.behavior_for(&other), FakeBehavior::exit(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_exit_tracks_running() {
        let launcher = FakeLauncher::new()
            .with("slow", FakeBehavior::exit(0).after(Duration::from_secs(2)));

        let mut child = launcher
            .launch(&Invocation::new("slow", Vec::<String>::new(), "/p"))
            .unwrap();
        assert_eq!(launcher.running_count(), 1);

        let start = Instant::now();
        assert!(child.wait().await.unwrap().success());
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(launcher.running_count(), 0);
        assert_eq!(launcher.killed_count(), 0);
    }

    #[tokio::test]
    async fn test_stdout_only_when_captured() {
        let launcher =
            FakeLauncher::new().with_fallback(FakeBehavior::exit(0).with_stdout("out"));

        let plain = Invocation::new("x", Vec::<String>::new(), "/p");
        let captured = plain.clone().capturing_stdout();

        let mut child = launcher.launch(&plain).unwrap();
        assert!(child.wait().await.unwrap().stdout.is_empty());

        let mut child = launcher.launch(&captured).unwrap();
        assert_eq!(child.wait().await.unwrap().stdout, b"out");
        assert_eq!(launcher.launched_programs(), vec!["x", "x"]);
    }

    #[tokio::test]
    async fn test_kill_marks_killed() {
        let launcher = FakeLauncher::new().with_fallback(FakeBehavior::hang());
        let mut child = launcher
            .launch(&Invocation::new("x", Vec::<String>::new(), "/p"))
            .unwrap();

        child.kill().await.unwrap();
        assert_eq!(launcher.running_count(), 0);
        assert_eq!(launcher.killed_count(), 1);
    }

    #[test]
    fn test_drop_kills_running_child() {
        let launcher = FakeLauncher::new().with_fallback(FakeBehavior::hang());
        let child = launcher
            .launch(&Invocation::new("x", Vec::<String>::new(), "/p"))
            .unwrap();

        drop(child);
        assert_eq!(launcher.running_count(), 0);
        assert_eq!(launcher.killed_count(), 1);
    }

    #[test]
    fn test_spawn_error() {
        let launcher = FakeLauncher::new().with("missing", FakeBehavior::spawn_error());
        let err = launcher
            .launch(&Invocation::new("missing", Vec::<String>::new(), "/p"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(launcher.running_count(), 0);
    }
}
