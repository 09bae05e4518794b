//! # Loreflow
//!
//! Client-side orchestration for staged lore generation.
//!
//! A run walks a fixed sequence of stages. Each stage asks the backend for a
//! few generated candidates, the user selects one, and the selections made so
//! far are sent along with every later request until the final stage weaves
//! them into a story. Generation is slow, so jobs are started with one request
//! and then polled until they settle.
//!
//! Loreflow provides:
//!
//! - **Stage machine**: selection, one regeneration per stage, retry after
//!   failure, and advancement, all gated on job state
//! - **Job and asset polling**: fixed-interval poll loops that never overlap
//!   fetches and discard responses for superseded jobs
//! - **Backend port**: a small async trait with an HTTP implementation
//! - **Event-driven observability**: every transition reported to an
//!   injected event sink
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use loreflow::prelude::*;
//!
//! let ctx = WorkflowContext::from_config(LoreflowConfig::load("loreflow.json")?)?;
//! let mut machine = StageMachine::new(ctx);
//!
//! machine.start().await;
//! while !machine.is_complete() {
//!     match machine.wait_until_settled().await? {
//!         StagePhase::CandidatesReady => {
//!             machine.select_index(0);
//!             machine.advance().await;
//!         }
//!         StagePhase::Failed => {
//!             machine.retry().await;
//!         }
//!         _ => {}
//!     }
//! }
//! println!("{}", machine.story().map(|s| s.content.as_str()).unwrap_or_default());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod client;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod polling;
pub mod stages;
pub mod testing;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, PollHandle};
    #[cfg(feature = "http")]
    pub use crate::client::HttpBackend;
    pub use crate::client::{GenerationBackend, StartJobRequest};
    pub use crate::config::{BackendConfig, LoreflowConfig, PollingConfig};
    pub use crate::core::{
        AssetStatus, JobId, JobSnapshot, JobStatus, JobUpdate, LorePiece, StageKey, StageKind, Story,
    };
    pub use crate::errors::LoreflowError;
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, WorkflowEvent,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::polling::{AssetPoller, AssetWatch, JobPoller, JobWatch};
    pub use crate::stages::{StageDescriptor, StageRegistry};
    pub use crate::workflow::{
        SelectedLore, SelectionConstraintTracker, StageMachine, StagePhase, StageProgress,
        WorkflowContext,
    };
}
