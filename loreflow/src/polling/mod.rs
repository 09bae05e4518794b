//! Pollers bridging client state to long-running backend work.
//!
//! Both pollers run on [`PollHandle`](crate::cancellation::PollHandle): a
//! fixed interval, one fetch in flight at a time, and cancellation that
//! discards in-flight responses.

mod asset;
mod job;

pub use asset::{AssetPoller, AssetWatch};
pub use job::{JobPoller, JobWatch};
