//! Deadline-bound cancellation scope shared with running steps.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{CancelReason, CancellationToken};

/// The cancellation view a step receives while it runs.
///
/// A scope combines the run-wide [`CancellationToken`] with an optional
/// deadline. Child scopes share the token and may only move the deadline
/// earlier.
#[derive(Debug, Clone)]
pub struct CancelScope {
    token: Arc<CancellationToken>,
    deadline: Option<Instant>,
}

impl CancelScope {
    /// Creates a scope with no deadline.
    #[must_use]
    pub fn new(token: Arc<CancellationToken>) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Creates a scope whose deadline is `timeout` from now.
    ///
    /// A timeout too large to represent as an instant leaves the scope
    /// without a deadline.
    #[must_use]
    pub fn with_timeout(token: Arc<CancellationToken>, timeout: Duration) -> Self {
        Self {
            token,
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Returns a child scope that expires at `deadline` or earlier.
    #[must_use]
    pub fn narrowed_to(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        Self {
            token: self.token.clone(),
            deadline: Some(deadline),
        }
    }

    /// Returns a child scope that expires `limit` from now, or earlier.
    #[must_use]
    pub fn narrowed_by(&self, limit: Duration) -> Self {
        match Instant::now().checked_add(limit) {
            Some(deadline) => self.narrowed_to(deadline),
            None => self.clone(),
        }
    }

    /// Returns the shared token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the reason this scope is done, without waiting.
    #[must_use]
    pub fn check(&self) -> Option<CancelReason> {
        if let Some(reason) = self.token.reason() {
            return Some(reason);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::Deadline),
            _ => None,
        }
    }

    /// Waits until the token is cancelled or the deadline elapses.
    pub async fn done(&self) -> CancelReason {
        tokio::select! {
            reason = self.token.cancelled() => reason,
            () = expiry(self.deadline) => CancelReason::Deadline,
        }
    }
}

/// Sleeps until `deadline`, or forever when there is none.
pub(crate) async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::TerminationSignal;

    #[tokio::test(start_paused = true)]
    async fn test_done_on_deadline() {
        let scope = CancelScope::with_timeout(Arc::new(CancellationToken::new()), Duration::from_secs(5));
        assert!(scope.check().is_none());

        let start = Instant::now();
        assert_eq!(scope.done().await, CancelReason::Deadline);
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(scope.check(), Some(CancelReason::Deadline));
        // The deadline is local to the scope; the shared token is untouched.
        assert!(!scope.token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_on_token() {
        let token = Arc::new(CancellationToken::new());
        let scope = CancelScope::with_timeout(token.clone(), Duration::from_secs(60));

        let remote = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            remote.cancel(CancelReason::Signal(TerminationSignal::Interrupt));
        });

        assert_eq!(
            scope.done().await,
            CancelReason::Signal(TerminationSignal::Interrupt)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_narrowing_never_extends() {
        let scope = CancelScope::with_timeout(Arc::new(CancellationToken::new()), Duration::from_secs(10));

        let tighter = scope.narrowed_by(Duration::from_secs(2));
        assert_eq!(tighter.remaining(), Some(Duration::from_secs(2)));

        let looser = scope.narrowed_by(Duration::from_secs(60));
        assert_eq!(looser.deadline(), scope.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeouts_leave_scope_unbounded() {
        let token = Arc::new(CancellationToken::new());
        let scope = CancelScope::with_timeout(token.clone(), Duration::MAX);
        assert!(scope.deadline().is_none());
        assert!(scope.check().is_none());

        let bounded = CancelScope::with_timeout(token, Duration::from_secs(10));
        let child = bounded.narrowed_by(Duration::from_secs_f64(1.8e19));
        assert_eq!(child.deadline(), bounded.deadline());

        let mut done = tokio_test::task::spawn(scope.done());
        tokio::time::advance(Duration::from_secs(86_400)).await;
        tokio_test::assert_pending!(done.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_scope_narrowed() {
        let scope = CancelScope::new(Arc::new(CancellationToken::new()));
        assert!(scope.remaining().is_none());

        let child = scope.narrowed_by(Duration::from_millis(500));
        assert_eq!(child.remaining(), Some(Duration::from_millis(500)));
        assert!(Arc::ptr_eq(child.token(), scope.token()));
    }
}
