//! Testing utilities for stepflow pipelines.
//!
//! This module provides:
//! - `FakeLauncher`, a scripted stand-in for real processes
//! - `MockStep`, a step with a scripted outcome
//!
//! Use `crate::signals::ChannelSignals` to inject termination signals.

mod fakes;
mod mocks;

pub use fakes::{FakeBehavior, FakeLauncher};
pub use mocks::{MockOutcome, MockStep};
