//! Observability utilities.
//!
//! Library code only emits `tracing` events; binaries and tests choose a
//! subscriber with [`init_tracing`].

mod tracing;

pub use tracing::{init_tracing, JobTimer, LogFormat, DEFAULT_FILTER};
