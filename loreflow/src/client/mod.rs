//! Backend access.
//!
//! `GenerationBackend` is the seam between the orchestrator and the server;
//! `HttpBackend` is the production implementation.

#[cfg(feature = "http")]
mod http;
mod ports;

#[cfg(feature = "http")]
pub use http::HttpBackend;
#[cfg(test)]
pub use ports::MockGenerationBackend;
pub use ports::{GenerationBackend, StartJobRequest};
