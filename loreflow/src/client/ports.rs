//! Backend port consumed by the pollers and the stage machine.

use async_trait::async_trait;
use serde::Serialize;

use crate::core::{AssetStatus, JobId, JobSnapshot, StageKey};
use crate::errors::LoreflowError;
use crate::workflow::SelectedLore;

/// Body of a start-job request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartJobRequest {
    /// The stage to generate for.
    pub stage: StageKey,
    /// Selections made so far; omitted for the first stage.
    #[serde(skip_serializing_if = "SelectedLore::is_empty")]
    pub selected_lore: SelectedLore,
}

impl StartJobRequest {
    /// Creates a request without prior selections.
    #[must_use]
    pub fn new(stage: StageKey) -> Self {
        Self {
            stage,
            selected_lore: SelectedLore::new(),
        }
    }

    /// Attaches the selections made so far.
    #[must_use]
    pub fn with_selected_lore(mut self, selected_lore: SelectedLore) -> Self {
        self.selected_lore = selected_lore;
        self
    }
}

/// The generation backend, seen from the client.
///
/// Implementations only move documents; they never interpret job status.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Starts a generation job and returns its identifier.
    async fn start_job(&self, request: &StartJobRequest) -> Result<JobId, LoreflowError>;

    /// Fetches the current status of a job.
    async fn job_status(&self, job_id: &JobId) -> Result<JobSnapshot, LoreflowError>;

    /// Fetches the readiness of an ephemeral asset.
    async fn asset_status(&self, key: &str) -> Result<AssetStatus, LoreflowError>;
}
