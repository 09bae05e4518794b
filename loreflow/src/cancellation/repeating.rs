//! Cancellable repeating task used by the pollers.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, debug_span, Instrument};

use super::CancellationToken;

/// Handle to a task that runs a tick function on a fixed interval.
///
/// The first tick fires immediately. A tick that comes due while the
/// previous one is still running is skipped, so at most one tick is in
/// flight. The loop ends when a tick returns [`ControlFlow::Break`], when
/// [`PollHandle::stop`] is called, or when the handle is dropped. Stopping
/// drops any in-flight tick future, discarding its result.
pub struct PollHandle {
    name: String,
    token: Arc<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Spawns the repeating task on the current tokio runtime.
    ///
    /// The tick function receives the loop's cancellation token so it can
    /// re-check cancellation after its own suspension points.
    pub fn spawn<F, Fut>(name: impl Into<String>, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut(Arc<CancellationToken>) -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let name = name.into();
        let token = Arc::new(CancellationToken::new());
        let loop_token = token.clone();
        let period = interval.max(Duration::from_millis(1));
        let span = debug_span!("poll", name = %name, interval_ms = period.as_millis());

        let handle = tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                let mut ticks: u64 = 0;

                loop {
                    tokio::select! {
                        biased;
                        () = loop_token.cancelled() => break,
                        _ = ticker.tick() => {}
                    }

                    ticks += 1;
                    let flow = tokio::select! {
                        biased;
                        () = loop_token.cancelled() => break,
                        flow = tick(loop_token.clone()) => flow,
                    };

                    if flow.is_break() {
                        debug!(ticks, "Poll loop finished");
                        return;
                    }
                }

                debug!(ticks, reason = ?loop_token.reason(), "Poll loop cancelled");
            }
            .instrument(span),
        );

        Self {
            name,
            token,
            handle: Some(handle),
        }
    }

    /// Stops the loop. Returns true if this call performed the stop.
    pub fn stop(&self, reason: &str) -> bool {
        self.token.cancel(reason)
    }

    /// Returns true if [`PollHandle::stop`] was called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns true if the loop task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the loop task to exit.
    pub async fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                debug!(name = %self.name, error = %e, "Poll task join error");
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel("poll handle dropped");
    }
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("name", &self.name)
            .field("stopped", &self.is_stopped())
            .field("finished", &self.is_finished())
            .finish()
    }
}
