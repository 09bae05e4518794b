//! Cooperative cancellation primitives.
//!
//! This module provides:
//! - CancellationToken for cooperative cancellation
//! - PollHandle, a cancellable repeating task with one tick in flight at a time

mod repeating;
mod token;

pub use repeating::PollHandle;
pub use token::CancellationToken;
