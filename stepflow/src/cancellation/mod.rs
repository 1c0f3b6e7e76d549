//! Structured cancellation for pipeline runs.
//!
//! This module provides:
//! - `CancellationToken` for cooperative, reason-carrying cancellation
//! - `CancelScope` binding a token to a run deadline
//! - `settle` for giving cancelled work a bounded window to clean up

mod scope;
mod settle;
mod token;

pub use scope::CancelScope;
pub(crate) use scope::expiry;
pub(crate) use settle::millis;
pub use settle::{settle, DEFAULT_GRACE};
pub use token::{CancelReason, CancellationToken};
