//! Error types for the loreflow orchestrator.
//!
//! Only infrastructure and contract failures are modelled here. Rejected user
//! operations (advancing without a selection, regenerating twice) are not
//! errors: the state machine reports them as no-ops.

use std::time::Duration;
use thiserror::Error;

use crate::core::StageKey;

/// The main error type for loreflow operations.
#[derive(Debug, Error)]
pub enum LoreflowError {
    /// A poll was requested for an empty job identifier.
    #[error("job id must not be empty")]
    EmptyJobId,

    /// The HTTP transport failed before a response was received.
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Backend {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A succeeded job carried a result that does not fit its stage.
    #[error("malformed result for stage '{stage}': {reason}")]
    MalformedResult {
        /// The stage the job was issued for.
        stage: StageKey,
        /// What was wrong with the payload.
        reason: String,
    },

    /// The story stage was entered before every lore stage had a selection.
    #[error("stage '{stage}' requires selections for: {}", join_keys(missing))]
    MissingSelections {
        /// The stage that could not start.
        stage: StageKey,
        /// The stages without a selection, in registry order.
        missing: Vec<StageKey>,
    },

    /// The current job did not settle within the allowed time.
    #[error("job did not settle within {0:?}")]
    Timeout(Duration),

    /// The poll loop ended before the job reported a terminal status.
    #[error("polling stopped before job '{0}' reached a terminal status")]
    PollingStopped(String),

    /// There is no job to wait on.
    #[error("no active job for stage '{0}'")]
    NoActiveJob(StageKey),

    /// Configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoreflowError {
    /// Creates a backend error from a status code and body.
    #[must_use]
    pub fn backend(status: u16, body: impl Into<String>) -> Self {
        Self::Backend {
            status,
            body: body.into(),
        }
    }

    /// Returns true if the error is an infrastructure hiccup worth retrying
    /// on the next poll tick rather than surfacing.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "http")]
            Self::Http(_) => true,
            Self::Backend { status, .. } => *status >= 500 || *status == 429,
            Self::Io(_) => true,
            _ => false,
        }
    }
}

fn join_keys(keys: &[StageKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
