//! Job status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle status of a backend job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is queued on the backend.
    #[default]
    Pending,
    /// Job is currently running.
    Running,
    /// Job completed and carries a result.
    Succeeded,
    /// Job failed and carries an error.
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl JobStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true if the job is still being worked on.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }
}
