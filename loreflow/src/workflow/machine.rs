//! The stage machine driving one lore-building run.

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{SelectedLore, SelectionConstraintTracker, WorkflowContext};
use crate::client::StartJobRequest;
use crate::core::{JobId, JobSnapshot, JobStatus, JobUpdate, LorePiece, StageKey, StageKind, Story};
use crate::errors::LoreflowError;
use crate::events::WorkflowEvent;
use crate::observability::JobTimer;
use crate::polling::{JobPoller, JobWatch};
use crate::stages::StageDescriptor;

/// Coarse state of the current stage, derived from the job and its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePhase {
    /// No job has been issued for the stage.
    Idle,
    /// A job is pending or running.
    AwaitingJob,
    /// Candidates are on display and can be selected.
    CandidatesReady,
    /// The job failed, its result was unusable, or it could not be started.
    Failed,
    /// The story was produced.
    Complete,
}

/// Position of the current stage within the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageProgress {
    /// Zero-based index of the current stage.
    pub position: usize,
    /// Number of stages.
    pub total: usize,
    /// Stages whose selection has been committed.
    pub completed: usize,
}

#[derive(Debug)]
struct ActiveJob {
    id: JobId,
    snapshot: JobSnapshot,
    watch: Option<JobWatch>,
    timer: JobTimer,
}

/// Drives the user through the stage sequence.
///
/// Each stage issues one generation job, shows the candidates it returns,
/// and lets the user select one (and regenerate at most once) before
/// advancing. Selections are committed to the [`SelectedLore`] on advance,
/// and the final stage sends all of them to produce the story.
///
/// Only the most recently issued job may change the machine. Updates from
/// superseded jobs are discarded, and their poll loops are cancelled as
/// soon as a newer job replaces them.
///
/// Operations whose preconditions do not hold return `false` and change
/// nothing.
#[derive(Debug)]
pub struct StageMachine {
    ctx: WorkflowContext,
    poller: JobPoller,
    current: &'static StageDescriptor,
    job: Option<ActiveJob>,
    issue_error: Option<String>,
    last_request: Option<StartJobRequest>,
    candidates: Vec<LorePiece>,
    tracker: SelectionConstraintTracker,
    lore: SelectedLore,
    story: Option<Story>,
}

impl StageMachine {
    /// Creates a machine positioned at the first stage, with no job issued.
    #[must_use]
    pub fn new(ctx: WorkflowContext) -> Self {
        let poller = ctx.job_poller();
        let current = ctx.registry().first();
        Self {
            ctx,
            poller,
            current,
            job: None,
            issue_error: None,
            last_request: None,
            candidates: Vec::new(),
            tracker: SelectionConstraintTracker::new(),
            lore: SelectedLore::new(),
            story: None,
        }
    }

    /// Enters the first stage and issues its job.
    pub async fn start(&mut self) {
        let first = self.ctx.registry().first().key;
        if let Err(e) = self.enter_stage(first).await {
            warn!(run_id = %self.ctx.run_id(), error = %e, "Could not enter first stage");
        }
    }

    /// Makes `stage` current and issues its job.
    ///
    /// The previous stage's job, candidates and selection are discarded.
    /// Entering the story stage is refused while any selectable stage has
    /// no committed selection.
    pub async fn enter_stage(&mut self, stage: StageKey) -> Result<(), LoreflowError> {
        let Some(descriptor) = self.ctx.registry().get(stage) else {
            return Err(LoreflowError::Config(format!("stage '{stage}' is not registered")));
        };
        self.check_prerequisites(stage)?;

        self.leave_stage();
        self.current = descriptor;
        info!(run_id = %self.ctx.run_id(), stage = %stage, position = descriptor.position, "Entered stage");
        self.ctx.emit(
            WorkflowEvent::StageEntered,
            stage,
            json!({ "position": descriptor.position, "title": descriptor.title }),
        );

        let request = self.request_for(stage);
        self.issue_job(request).await;
        Ok(())
    }

    /// Stops polling and clears all per-stage state. The stage stays current.
    pub fn leave_stage(&mut self) {
        self.cancel_job("stage left");
        self.issue_error = None;
        self.last_request = None;
        self.candidates.clear();
        self.tracker.reset();
    }

    /// Applies a job update.
    ///
    /// Returns true if the update was accepted. Updates for any job other
    /// than the current one, and updates arriving after the current job
    /// settled, are discarded.
    pub fn apply_update(&mut self, update: JobUpdate) -> bool {
        let stage = self.current.key;
        let Some(job) = self.job.as_mut() else {
            debug!(job_id = %update.job_id, "Update with no active job discarded");
            self.emit_stale(stage, &update.job_id);
            return false;
        };
        if job.id != update.job_id {
            debug!(job_id = %update.job_id, current = %job.id, "Stale job update discarded");
            self.emit_stale(stage, &update.job_id);
            return false;
        }
        if job.snapshot.is_terminal() {
            return false;
        }

        let snapshot = update.snapshot.normalized();
        match snapshot.status {
            JobStatus::Succeeded => self.accept_result(snapshot),
            JobStatus::Failed => {
                let error = snapshot.error.clone().unwrap_or_default();
                warn!(job_id = %job.id, stage = %stage, error = %error, duration_ms = job.timer.elapsed_ms(), "Job failed");
                job.snapshot = snapshot;
                job.watch = None;
                self.ctx.emit(WorkflowEvent::JobFailed, stage, json!({ "error": error }));
            }
            JobStatus::Pending | JobStatus::Running => job.snapshot = snapshot,
        }
        true
    }

    /// Waits for the next update from the current job and applies it.
    ///
    /// Returns the job status afterwards, or `None` when there is nothing
    /// left to wait for.
    pub async fn next_update(&mut self) -> Option<JobStatus> {
        let watch = self.job.as_mut()?.watch.as_mut()?;
        match watch.next().await {
            Some(update) => {
                self.apply_update(update);
                self.job.as_ref().map(|job| job.snapshot.status)
            }
            None => {
                if let Some(job) = self.job.as_mut() {
                    job.watch = None;
                }
                None
            }
        }
    }

    /// Applies updates until the current job settles.
    ///
    /// Bounded by the configured settle timeout, if any. A settle timeout
    /// that is not a usable duration fails with a configuration error.
    pub async fn wait_until_settled(&mut self) -> Result<StagePhase, LoreflowError> {
        match self.ctx.config().polling.settle_timeout()? {
            Some(limit) => tokio::time::timeout(limit, self.settle())
                .await
                .map_err(|_| LoreflowError::Timeout(limit))?,
            None => self.settle().await,
        }
    }

    async fn settle(&mut self) -> Result<StagePhase, LoreflowError> {
        loop {
            match self.phase() {
                StagePhase::AwaitingJob => {
                    if self.next_update().await.is_none() && self.phase() == StagePhase::AwaitingJob {
                        let id = self.job_id().map(ToString::to_string).unwrap_or_default();
                        return Err(LoreflowError::PollingStopped(id));
                    }
                }
                StagePhase::Idle => return Err(LoreflowError::NoActiveJob(self.current.key)),
                phase => return Ok(phase),
            }
        }
    }

    /// Selects one of the displayed candidates.
    ///
    /// Returns true if the selection changed. Candidates not currently on
    /// display are rejected.
    pub fn select(&mut self, candidate: &LorePiece) -> bool {
        if self.phase() != StagePhase::CandidatesReady || !self.candidates.contains(candidate) {
            debug!(stage = %self.current.key, name = %candidate.name, "Selection rejected");
            return false;
        }
        let changed = self.tracker.select(candidate.clone());
        if changed {
            self.ctx.emit(
                WorkflowEvent::SelectionChanged,
                self.current.key,
                json!({ "name": candidate.name }),
            );
        }
        changed
    }

    /// Selects the candidate at `index` in display order.
    pub fn select_index(&mut self, index: usize) -> bool {
        match self.candidates.get(index).cloned() {
            Some(candidate) => self.select(&candidate),
            None => false,
        }
    }

    /// Discards the candidates and selection and issues a fresh job.
    ///
    /// Allowed once per visit to a candidate stage, and never while a job
    /// is in flight.
    pub async fn regenerate(&mut self) -> bool {
        if !self.can_regenerate() {
            return false;
        }
        let in_flight = self.job_in_flight();
        if !self.tracker.regenerate(in_flight) {
            return false;
        }

        let stage = self.current.key;
        info!(run_id = %self.ctx.run_id(), stage = %stage, "Regenerating candidates");
        self.ctx.emit(WorkflowEvent::Regenerated, stage, json!({}));
        let request = self.request_for(stage);
        self.issue_job(request).await;
        true
    }

    /// Re-issues the last request after a failure.
    ///
    /// Does not count against the regeneration allowance.
    pub async fn retry(&mut self) -> bool {
        if self.phase() != StagePhase::Failed {
            return false;
        }
        let stage = self.current.key;
        if let Err(e) = self.check_prerequisites(stage) {
            debug!(stage = %stage, error = %e, "Retry refused");
            return false;
        }

        let request = self.last_request.clone().unwrap_or_else(|| self.request_for(stage));
        info!(run_id = %self.ctx.run_id(), stage = %stage, "Retrying job");
        self.ctx.emit(WorkflowEvent::Retried, stage, json!({}));
        self.issue_job(request).await;
        true
    }

    /// Commits the selection and enters the next stage.
    ///
    /// Refused, with nothing committed, when the next stage would reject
    /// the resulting lore.
    pub async fn advance(&mut self) -> bool {
        if !self.can_advance() {
            return false;
        }
        let from = self.current.key;
        let (Some(selection), Some(next)) = (self.tracker.selection().cloned(), self.ctx.registry().next(from))
        else {
            return false;
        };

        let mut pending = self.lore.clone();
        pending.record(from, selection.clone());
        if let Err(e) = self.check_prerequisites_with(next, &pending) {
            warn!(run_id = %self.ctx.run_id(), from = %from, to = %next, error = %e, "Advance refused");
            return false;
        }

        info!(run_id = %self.ctx.run_id(), from = %from, to = %next, name = %selection.name, "Advancing");
        self.ctx.emit(
            WorkflowEvent::Advanced,
            from,
            json!({ "to": next.as_str(), "name": selection.name, "selected": pending.len() }),
        );
        let committed = std::mem::replace(&mut self.lore, pending);

        if let Err(e) = self.enter_stage(next).await {
            warn!(run_id = %self.ctx.run_id(), error = %e, "Could not enter next stage");
            self.lore = committed;
            return false;
        }
        true
    }

    /// Discards every selection and the story, then starts from the first
    /// stage.
    pub async fn restart(&mut self) {
        self.leave_stage();
        self.lore.clear();
        self.story = None;
        info!(run_id = %self.ctx.run_id(), "Restarting workflow");
        self.ctx.emit(WorkflowEvent::Restarted, self.current.key, json!({}));
        self.start().await;
    }

    /// Returns true if [`regenerate`](Self::regenerate) would issue a job.
    #[must_use]
    pub fn can_regenerate(&self) -> bool {
        self.current.kind.is_selectable()
            && matches!(self.phase(), StagePhase::CandidatesReady | StagePhase::Failed)
            && self.tracker.can_regenerate(self.job_in_flight())
    }

    /// Returns true if [`advance`](Self::advance) would move on.
    #[must_use]
    pub fn can_advance(&self) -> bool {
        self.phase() == StagePhase::CandidatesReady && self.tracker.can_advance(self.job_in_flight())
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> StagePhase {
        if self.story.is_some() {
            return StagePhase::Complete;
        }
        if self.issue_error.is_some() {
            return StagePhase::Failed;
        }
        match self.job.as_ref().map(|job| job.snapshot.status) {
            None => StagePhase::Idle,
            Some(JobStatus::Pending | JobStatus::Running) => StagePhase::AwaitingJob,
            Some(JobStatus::Succeeded) => StagePhase::CandidatesReady,
            Some(JobStatus::Failed) => StagePhase::Failed,
        }
    }

    /// The current stage.
    #[must_use]
    pub const fn current_stage(&self) -> &'static StageDescriptor {
        self.current
    }

    /// All stages in order.
    #[must_use]
    pub const fn stages(&self) -> &'static [StageDescriptor] {
        self.ctx.registry().all()
    }

    /// Where the run is within the stage sequence.
    #[must_use]
    pub fn progress(&self) -> StageProgress {
        StageProgress {
            position: self.current.position,
            total: self.ctx.registry().len(),
            completed: self.lore.len(),
        }
    }

    /// The id of the current job.
    #[must_use]
    pub fn job_id(&self) -> Option<&JobId> {
        self.job.as_ref().map(|job| &job.id)
    }

    /// The latest snapshot of the current job.
    #[must_use]
    pub fn job_status(&self) -> Option<&JobSnapshot> {
        self.job.as_ref().map(|job| &job.snapshot)
    }

    /// The error shown for the current stage, if it failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        if let Some(error) = &self.issue_error {
            return Some(error);
        }
        self.job
            .as_ref()
            .filter(|job| job.snapshot.status == JobStatus::Failed)
            .and_then(|job| job.snapshot.error.as_deref())
    }

    /// Candidates on display.
    #[must_use]
    pub fn candidates(&self) -> &[LorePiece] {
        &self.candidates
    }

    /// The selected candidate.
    #[must_use]
    pub const fn selection(&self) -> Option<&LorePiece> {
        self.tracker.selection()
    }

    /// Returns true if the current stage was already regenerated.
    #[must_use]
    pub const fn has_regenerated(&self) -> bool {
        self.tracker.has_regenerated()
    }

    /// Selections committed so far.
    #[must_use]
    pub const fn selected_lore(&self) -> &SelectedLore {
        &self.lore
    }

    /// The story, once produced.
    #[must_use]
    pub const fn story(&self) -> Option<&Story> {
        self.story.as_ref()
    }

    /// Returns true once the story was produced.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.story.is_some()
    }

    /// The run id used in events.
    #[must_use]
    pub const fn run_id(&self) -> uuid::Uuid {
        self.ctx.run_id()
    }

    fn job_in_flight(&self) -> bool {
        self.job.as_ref().is_some_and(|job| job.snapshot.status.is_in_flight())
    }

    fn request_for(&self, stage: StageKey) -> StartJobRequest {
        StartJobRequest::new(stage).with_selected_lore(self.lore.clone())
    }

    fn check_prerequisites(&self, stage: StageKey) -> Result<(), LoreflowError> {
        self.check_prerequisites_with(stage, &self.lore)
    }

    fn check_prerequisites_with(&self, stage: StageKey, lore: &SelectedLore) -> Result<(), LoreflowError> {
        let Some(descriptor) = self.ctx.registry().get(stage) else {
            return Ok(());
        };
        if descriptor.kind != StageKind::Story {
            return Ok(());
        }
        let missing = lore.missing(&self.ctx.registry().selectable_before(stage));
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LoreflowError::MissingSelections { stage, missing })
        }
    }

    fn cancel_job(&mut self, reason: &str) {
        if let Some(mut job) = self.job.take() {
            if let Some(mut watch) = job.watch.take() {
                watch.cancel(reason);
            }
        }
    }

    async fn issue_job(&mut self, request: StartJobRequest) {
        self.cancel_job("superseded by a new job");
        self.issue_error = None;
        self.candidates.clear();
        self.last_request = Some(request.clone());

        let stage = request.stage;
        let started = match self.ctx.backend().start_job(&request).await {
            Ok(job_id) => self.poller.start(&job_id).map(|watch| (job_id, watch)),
            Err(e) => Err(e),
        };

        match started {
            Ok((job_id, watch)) => {
                info!(run_id = %self.ctx.run_id(), stage = %stage, job_id = %job_id, "Job issued");
                self.ctx.emit(
                    WorkflowEvent::JobIssued,
                    stage,
                    json!({ "job_id": job_id.as_str(), "selected": request.selected_lore.len() }),
                );
                self.job = Some(ActiveJob {
                    id: job_id,
                    snapshot: JobSnapshot::pending(),
                    watch: Some(watch),
                    timer: JobTimer::start(),
                });
            }
            Err(e) => {
                warn!(run_id = %self.ctx.run_id(), stage = %stage, error = %e, "Could not start job");
                self.ctx.emit(WorkflowEvent::JobFailed, stage, json!({ "error": e.to_string() }));
                self.issue_error = Some(e.to_string());
            }
        }
    }

    fn accept_result(&mut self, snapshot: JobSnapshot) {
        let stage = self.current.key;
        let result = snapshot.result.clone().unwrap_or(serde_json::Value::Null);

        let outcome = match self.current.kind {
            StageKind::Candidates => self.parse_candidates(result).map(|candidates| {
                let count = candidates.len();
                self.candidates = candidates;
                json!({ "candidates": count })
            }),
            StageKind::Story => serde_json::from_value::<Story>(result)
                .map_err(|e| LoreflowError::MalformedResult {
                    stage,
                    reason: e.to_string(),
                })
                .map(|story| {
                    let title = story.title.clone();
                    self.story = Some(story);
                    json!({ "title": title })
                }),
        };

        let Some(job) = self.job.as_mut() else {
            return;
        };
        job.watch = None;
        match outcome {
            Ok(extra) => {
                info!(job_id = %job.id, stage = %stage, duration_ms = job.timer.elapsed_ms(), "Job succeeded");
                job.snapshot = snapshot;
                self.ctx.emit(WorkflowEvent::JobSucceeded, stage, extra);
                if self.story.is_some() {
                    self.ctx.emit(
                        WorkflowEvent::Completed,
                        stage,
                        json!({ "selected": self.lore.len() }),
                    );
                }
            }
            Err(e) => {
                warn!(job_id = %job.id, stage = %stage, error = %e, "Unusable job result");
                job.snapshot = JobSnapshot::failed(e.to_string());
                self.ctx.emit(WorkflowEvent::JobFailed, stage, json!({ "error": e.to_string() }));
            }
        }
    }

    fn parse_candidates(&self, result: serde_json::Value) -> Result<Vec<LorePiece>, LoreflowError> {
        let stage = self.current.key;
        let candidates: Vec<LorePiece> =
            serde_json::from_value(result).map_err(|e| LoreflowError::MalformedResult {
                stage,
                reason: e.to_string(),
            })?;
        if candidates.is_empty() {
            return Err(LoreflowError::MalformedResult {
                stage,
                reason: "no candidates".to_string(),
            });
        }

        let expected = self.current.category;
        for candidate in candidates.iter().filter(|c| c.kind != expected) {
            warn!(stage = %stage, name = %candidate.name, kind = %candidate.kind, expected, "Candidate type does not match stage");
        }
        Ok(candidates)
    }

    fn emit_stale(&self, stage: StageKey, job_id: &JobId) {
        self.ctx.emit(
            WorkflowEvent::StaleUpdateDiscarded,
            stage,
            json!({ "job_id": job_id.as_str() }),
        );
    }
}
