//! Bounded wait for cancelled work to wind down.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Default time a cancelled unit of work gets to kill and reap its child.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Keeps polling already-cancelled work for at most `grace`.
///
/// Returns the work's output if it settled in time. Otherwise returns `None`;
/// the caller then drops the future, which kills any child it still owns.
pub async fn settle<F>(work: Pin<&mut F>, grace: Duration) -> Option<F::Output>
where
    F: Future + ?Sized,
{
    match timeout(grace, work).await {
        Ok(output) => Some(output),
        Err(_) => {
            warn!(grace_ms = millis(grace), "Cancelled work did not settle in time");
            None
        }
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
