//! Job status polling.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cancellation::PollHandle;
use crate::client::GenerationBackend;
use crate::core::{JobId, JobUpdate};
use crate::errors::LoreflowError;

/// Starts poll loops for backend jobs.
#[derive(Clone)]
pub struct JobPoller {
    backend: Arc<dyn GenerationBackend>,
    interval: Duration,
}

impl JobPoller {
    /// Creates a poller fetching job status every `interval`.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>, interval: Duration) -> Self {
        Self { backend, interval }
    }

    /// The fetch interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts polling `job_id` until it reaches a terminal status.
    ///
    /// Fails fast, without any request, when `job_id` is empty. Fetch errors
    /// are logged and retried on the next tick; only a `failed` status from
    /// the backend ends the job unsuccessfully.
    pub fn start(&self, job_id: &JobId) -> Result<JobWatch, LoreflowError> {
        if job_id.is_empty() {
            return Err(LoreflowError::EmptyJobId);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let backend = self.backend.clone();
        let id = job_id.clone();

        let handle = PollHandle::spawn(format!("job:{job_id}"), self.interval, move |token| {
            let backend = backend.clone();
            let id = id.clone();
            let tx = tx.clone();
            async move {
                let snapshot = match backend.job_status(&id).await {
                    Ok(snapshot) => snapshot.normalized(),
                    Err(e) => {
                        if e.is_transient() {
                            debug!(job_id = %id, error = %e, "Transient status fetch error, retrying next tick");
                        } else {
                            warn!(job_id = %id, error = %e, "Status fetch error, retrying next tick");
                        }
                        return ControlFlow::Continue(());
                    }
                };

                // A response that lands after cancellation belongs to nobody.
                if token.is_cancelled() {
                    return ControlFlow::Break(());
                }

                let terminal = snapshot.is_terminal();
                if terminal {
                    info!(job_id = %id, status = %snapshot.status, "Job reached terminal status");
                }
                if tx.send(JobUpdate::new(id.clone(), snapshot)).is_err() {
                    debug!(job_id = %id, "Job watch dropped, stopping poll");
                    return ControlFlow::Break(());
                }

                if terminal {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });

        debug!(job_id = %job_id, interval_ms = self.interval.as_millis(), "Job polling started");
        Ok(JobWatch {
            job_id: job_id.clone(),
            updates: rx,
            handle,
        })
    }
}

impl std::fmt::Debug for JobPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobPoller")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Live view of one polled job.
///
/// Updates arrive in fetch order, each tagged with the job id. Dropping the
/// watch stops the poll loop.
#[derive(Debug)]
pub struct JobWatch {
    job_id: JobId,
    updates: mpsc::UnboundedReceiver<JobUpdate>,
    handle: PollHandle,
}

impl JobWatch {
    /// The job being watched.
    #[must_use]
    pub const fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Waits for the next update.
    ///
    /// Returns `None` once the loop has ended and every update was consumed.
    pub async fn next(&mut self) -> Option<JobUpdate> {
        self.updates.recv().await
    }

    /// Stops polling and drops updates that were not consumed yet.
    pub fn cancel(&mut self, reason: &str) {
        if self.handle.stop(reason) {
            debug!(job_id = %self.job_id, reason, "Job polling cancelled");
        }
        self.updates.close();
        while self.updates.try_recv().is_ok() {}
    }

    /// Returns true if the poll loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
