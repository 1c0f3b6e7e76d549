//! Cancellation token for cooperative cancellation.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::debug;

use crate::signals::TerminationSignal;

/// Why a run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The run deadline elapsed.
    Deadline,
    /// A termination signal was delivered.
    Signal(TerminationSignal),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deadline => write!(f, "deadline exceeded"),
            Self::Signal(signal) => write!(f, "signal: {signal}"),
        }
    }
}

/// A token for cooperative cancellation.
///
/// Cancellation is idempotent - only the first cancellation reason is kept.
#[derive(Default)]
pub struct CancellationToken {
    /// Whether cancellation has been requested.
    cancelled: AtomicBool,
    /// The reason for cancellation (first one wins).
    reason: RwLock<Option<CancelReason>>,
    /// Wakes tasks parked in [`CancellationToken::cancelled`].
    notify: Notify,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    ///
    /// Returns true if this call performed the cancellation, false if the
    /// token had already been cancelled (the earlier reason is kept).
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let mut slot = self.reason.write();
        if slot.is_some() {
            return false;
        }
        *slot = Some(reason);
        self.cancelled.store(true, Ordering::SeqCst);
        drop(slot);

        debug!(%reason, "Cancellation requested");
        self.notify.notify_waiters();
        true
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        *self.reason.read()
    }

    /// Waits until the token is cancelled and returns the reason.
    ///
    /// Resolves immediately if the token is already cancelled.
    pub async fn cancelled(&self) -> CancelReason {
        loop {
            // Register interest before checking so a concurrent cancel is not missed.
            let notified = self.notify.notified();
            if let Some(reason) = self.reason() {
                return reason;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_token_cancel() {
        let token = CancellationToken::new();
        assert!(token.cancel(CancelReason::Deadline));

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancelReason::Deadline));
    }

    #[test]
    fn test_token_cancel_idempotent() {
        let token = CancellationToken::new();
        assert!(token.cancel(CancelReason::Signal(TerminationSignal::Interrupt)));
        assert!(!token.cancel(CancelReason::Deadline));

        // First reason wins
        assert_eq!(
            token.reason(),
            Some(CancelReason::Signal(TerminationSignal::Interrupt))
        );
    }

    #[test]
    fn test_cancelled_future_wakes_on_cancel() {
        let token = CancellationToken::new();
        let mut fut = task::spawn(token.cancelled());

        assert_pending!(fut.poll());

        token.cancel(CancelReason::Deadline);

        assert!(fut.is_woken());
        assert_ready_eq!(fut.poll(), CancelReason::Deadline);
    }

    #[test]
    fn test_cancelled_future_ready_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel(CancelReason::Signal(TerminationSignal::Terminate));

        let mut fut = task::spawn(token.cancelled());
        assert_ready_eq!(
            fut.poll(),
            CancelReason::Signal(TerminationSignal::Terminate)
        );
    }

    #[tokio::test]
    async fn test_cancel_from_another_task() {
        let token = Arc::new(CancellationToken::new());
        let remote = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.cancel(CancelReason::Deadline);
        });

        assert_eq!(token.cancelled().await, CancelReason::Deadline);
    }
}
