//! Backend job and asset documents.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::JobStatus;

/// Identifier of a backend job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wraps a backend-issued identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A job status document as returned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Current status.
    pub status: JobStatus,
    /// Progress in percent, 0 to 100.
    #[serde(default, deserialize_with = "progress_from_number")]
    pub progress: u8,
    /// Human-readable status message.
    #[serde(default)]
    pub message: String,
    /// Error detail, present when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Result payload, present when succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl JobSnapshot {
    /// Creates a pending snapshot, used right after a job is issued.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            message: "Queued".to_string(),
            ..Default::default()
        }
    }

    /// Creates a running snapshot.
    #[must_use]
    pub fn running(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Running,
            progress: progress.min(100),
            message: message.into(),
            ..Default::default()
        }
    }

    /// Creates a succeeded snapshot carrying a result.
    #[must_use]
    pub fn succeeded(result: serde_json::Value) -> Self {
        Self {
            status: JobStatus::Succeeded,
            progress: 100,
            message: "Complete".to_string(),
            error: None,
            result: Some(result),
        }
    }

    /// Creates a failed snapshot carrying an error.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            status: JobStatus::Failed,
            progress: 0,
            message: error.clone(),
            error: Some(error),
            result: None,
        }
    }

    /// Clamps progress into 0..=100 and drops fields that do not belong to
    /// the status.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.progress = self.progress.min(100);
        if self.status != JobStatus::Succeeded {
            self.result = None;
        }
        if self.status == JobStatus::Failed && self.error.is_none() {
            self.error = Some(if self.message.is_empty() {
                "generation failed".to_string()
            } else {
                self.message.clone()
            });
        }
        if self.status != JobStatus::Failed {
            self.error = None;
        }
        self
    }

    /// Returns true if the job reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Backends report progress as any JSON number, sometimes fractional or out of range.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn progress_from_number<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.map_or(0, |v| v.clamp(0.0, 100.0).round() as u8))
}

/// A status snapshot tagged with the job it was fetched for.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    /// The job this snapshot belongs to.
    pub job_id: JobId,
    /// The fetched status.
    pub snapshot: JobSnapshot,
}

impl JobUpdate {
    /// Creates a tagged update.
    #[must_use]
    pub fn new(job_id: impl Into<JobId>, snapshot: JobSnapshot) -> Self {
        Self {
            job_id: job_id.into(),
            snapshot,
        }
    }
}

/// Readiness of an ephemeral asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetStatus {
    /// Whether the asset has been produced.
    pub ready: bool,
    /// The asset itself, once ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl AssetStatus {
    /// An asset that is not ready yet.
    #[must_use]
    pub fn not_ready() -> Self {
        Self::default()
    }

    /// A ready asset with its payload.
    #[must_use]
    pub fn ready(payload: serde_json::Value) -> Self {
        Self {
            ready: true,
            payload: Some(payload),
        }
    }
}
