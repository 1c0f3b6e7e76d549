//! Termination signal sources.
//!
//! Only interrupt and terminate cancel a run. Every other signal keeps the
//! host process's default disposition; nothing here registers for it.

use async_trait::async_trait;
use std::fmt;
use std::io;
use tokio::sync::mpsc;

/// A process-termination request that cancels a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationSignal {
    /// SIGINT (ctrl-c).
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "interrupt"),
            Self::Terminate => write!(f, "terminated"),
        }
    }
}

/// A source of termination signals observed by the supervisor.
#[async_trait]
pub trait TerminationSignals: Send {
    /// Waits for the next termination signal.
    ///
    /// Returns `None` once the source can no longer deliver signals.
    async fn recv(&mut self) -> Option<TerminationSignal>;
}

/// Termination signals delivered by the operating system.
#[derive(Debug)]
pub struct OsSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl OsSignals {
    /// Registers listeners for SIGINT and SIGTERM.
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Registers a ctrl-c listener.
    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        Ok(Self {})
    }
}

#[async_trait]
impl TerminationSignals for OsSignals {
    #[cfg(unix)]
    async fn recv(&mut self) -> Option<TerminationSignal> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Some(TerminationSignal::Interrupt),
            Some(()) = self.terminate.recv() => Some(TerminationSignal::Terminate),
            else => None,
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Option<TerminationSignal> {
        tokio::signal::ctrl_c()
            .await
            .ok()
            .map(|()| TerminationSignal::Interrupt)
    }
}

/// A signal source fed through a channel, for embedding and tests.
#[derive(Debug)]
pub struct ChannelSignals {
    rx: mpsc::UnboundedReceiver<TerminationSignal>,
}

impl ChannelSignals {
    /// Creates a source and the sender that feeds it.
    #[must_use]
    pub fn new() -> (mpsc::UnboundedSender<TerminationSignal>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl TerminationSignals for ChannelSignals {
    async fn recv(&mut self) -> Option<TerminationSignal> {
        self.rx.recv().await
    }
}

/// A signal source that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignals;

#[async_trait]
impl TerminationSignals for NoSignals {
    async fn recv(&mut self) -> Option<TerminationSignal> {
        None
    }
}
