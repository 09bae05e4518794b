//! Core domain model types for loreflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage identity and kind
//! - Job status, snapshots and tagged updates
//! - Generated lore pieces and the final story

mod job;
mod lore;
mod stage;
mod status;

pub use job::{AssetStatus, JobId, JobSnapshot, JobUpdate};
pub use lore::{LorePiece, Story};
pub use stage::{StageKey, StageKind};
pub use status::JobStatus;
