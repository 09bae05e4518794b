//! Event sink system for observability.
//!
//! The stage machine reports every transition to an injected [`EventSink`].
//! Payloads share a common envelope built by [`event_payload`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::{SecondsFormat, Utc};
use std::fmt;
use uuid::Uuid;

use crate::core::StageKey;

/// Workflow event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowEvent {
    /// A stage became current.
    StageEntered,
    /// A job was started on the backend.
    JobIssued,
    /// The current job produced its result.
    JobSucceeded,
    /// The current job failed, or could not be started.
    JobFailed,
    /// An update for a superseded job was dropped.
    StaleUpdateDiscarded,
    /// The user's selection changed.
    SelectionChanged,
    /// The stage's candidates were regenerated.
    Regenerated,
    /// A failed job was re-issued.
    Retried,
    /// The workflow moved to the next stage.
    Advanced,
    /// The story was produced; the workflow is finished.
    Completed,
    /// All selections were discarded and the workflow started over.
    Restarted,
}

impl WorkflowEvent {
    /// The event type string passed to sinks.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StageEntered => "workflow.stage_entered",
            Self::JobIssued => "workflow.job_issued",
            Self::JobSucceeded => "workflow.job_succeeded",
            Self::JobFailed => "workflow.job_failed",
            Self::StaleUpdateDiscarded => "workflow.stale_update_discarded",
            Self::SelectionChanged => "workflow.selection_changed",
            Self::Regenerated => "workflow.regenerated",
            Self::Retried => "workflow.retried",
            Self::Advanced => "workflow.advanced",
            Self::Completed => "workflow.completed",
            Self::Restarted => "workflow.restarted",
        }
    }
}

impl fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds an event payload: run id, stage, timestamp, plus `extra` fields.
#[must_use]
pub fn event_payload(run_id: Uuid, stage: StageKey, extra: serde_json::Value) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "run_id": run_id.to_string(),
        "stage": stage.as_str(),
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    });

    if let (serde_json::Value::Object(map), serde_json::Value::Object(extra)) = (&mut payload, extra) {
        map.extend(extra);
    }

    payload
}
