//! A scripted in-memory generation backend.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::fixtures::result_for;
use crate::client::{GenerationBackend, StartJobRequest};
use crate::core::{AssetStatus, JobId, JobSnapshot, StageKey};
use crate::errors::LoreflowError;

/// One scripted answer to a status fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Answer with this snapshot.
    Status(JobSnapshot),
    /// Fail the fetch with a backend error.
    Error {
        /// HTTP status.
        status: u16,
        /// Response body.
        body: String,
    },
}

impl ScriptStep {
    /// A running snapshot.
    #[must_use]
    pub fn running(progress: u8) -> Self {
        Self::Status(JobSnapshot::running(progress, "Generating"))
    }

    /// A succeeded snapshot carrying `result`.
    #[must_use]
    pub fn succeeded(result: serde_json::Value) -> Self {
        Self::Status(JobSnapshot::succeeded(result))
    }

    /// A failed snapshot.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Status(JobSnapshot::failed(error))
    }

    /// A fetch error.
    #[must_use]
    pub fn error(status: u16, body: impl Into<String>) -> Self {
        Self::Error {
            status,
            body: body.into(),
        }
    }

    fn to_result(&self) -> Result<JobSnapshot, LoreflowError> {
        match self {
            Self::Status(snapshot) => Ok(snapshot.clone()),
            Self::Error { status, body } => Err(LoreflowError::backend(*status, body.clone())),
        }
    }
}

/// Backend that answers from per-stage scripts.
///
/// Every started job takes the next script queued for its stage, or the
/// default script: one running snapshot, then success with the fixture
/// result for the stage. Status fetches walk the script; the last step
/// repeats forever.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    next_id: AtomicUsize,
    start_failures: AtomicUsize,
    status_calls: AtomicUsize,
    asset_calls: AtomicUsize,
    requests: Mutex<Vec<StartJobRequest>>,
    queued: Mutex<HashMap<StageKey, VecDeque<Vec<ScriptStep>>>>,
    running: Mutex<HashMap<JobId, VecDeque<ScriptStep>>>,
    assets: Mutex<HashMap<String, VecDeque<AssetStatus>>>,
}

impl ScriptedBackend {
    /// Creates a backend using default scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The script a job for `stage` runs when nothing was queued.
    #[must_use]
    pub fn default_script(stage: StageKey) -> Vec<ScriptStep> {
        vec![ScriptStep::running(50), ScriptStep::succeeded(result_for(stage))]
    }

    /// Queues `steps` for the next job started for `stage`.
    pub fn script(&self, stage: StageKey, steps: Vec<ScriptStep>) {
        self.queued.lock().entry(stage).or_default().push_back(steps);
    }

    /// Makes the next `count` start requests fail with a 503.
    pub fn fail_next_starts(&self, count: usize) {
        self.start_failures.store(count, Ordering::SeqCst);
    }

    /// Sets the readiness answers for asset `key`; the last one repeats.
    pub fn asset(&self, key: impl Into<String>, statuses: Vec<AssetStatus>) {
        self.assets.lock().insert(key.into(), statuses.into_iter().collect());
    }

    /// Every start request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<StartJobRequest> {
        self.requests.lock().clone()
    }

    /// Start requests received for `stage`.
    #[must_use]
    pub fn requests_for(&self, stage: StageKey) -> Vec<StartJobRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.stage == stage)
            .cloned()
            .collect()
    }

    /// Number of start requests received, failed ones included.
    #[must_use]
    pub fn start_calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Number of status fetches.
    #[must_use]
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Number of asset readiness checks.
    #[must_use]
    pub fn asset_calls(&self) -> usize {
        self.asset_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn start_job(&self, request: &StartJobRequest) -> Result<JobId, LoreflowError> {
        self.requests.lock().push(request.clone());

        let failing = self
            .start_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(LoreflowError::backend(503, "generation service unavailable"));
        }

        let id = JobId::new(format!("job-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1));
        let steps = self
            .queued
            .lock()
            .get_mut(&request.stage)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Self::default_script(request.stage));
        self.running.lock().insert(id.clone(), steps.into_iter().collect());
        Ok(id)
    }

    async fn job_status(&self, job_id: &JobId) -> Result<JobSnapshot, LoreflowError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut running = self.running.lock();
        let Some(steps) = running.get_mut(job_id) else {
            return Err(LoreflowError::backend(404, format!("unknown job {job_id}")));
        };
        let step = if steps.len() > 1 { steps.pop_front() } else { steps.front().cloned() };
        step.map_or_else(|| Ok(JobSnapshot::pending()), |step| step.to_result())
    }

    async fn asset_status(&self, key: &str) -> Result<AssetStatus, LoreflowError> {
        self.asset_calls.fetch_add(1, Ordering::SeqCst);
        let mut assets = self.assets.lock();
        let Some(statuses) = assets.get_mut(key) else {
            return Ok(AssetStatus::not_ready());
        };
        let status = if statuses.len() > 1 { statuses.pop_front() } else { statuses.front().cloned() };
        Ok(status.unwrap_or_default())
    }
}
