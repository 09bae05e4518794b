//! Readiness polling for ephemeral keyed assets.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cancellation::PollHandle;
use crate::client::GenerationBackend;
use crate::errors::LoreflowError;

struct AssetPollerInner {
    backend: Arc<dyn GenerationBackend>,
    interval: Duration,
    ready: DashMap<String, serde_json::Value>,
}

impl AssetPollerInner {
    async fn tick(&self, key: &str) -> Result<Option<serde_json::Value>, LoreflowError> {
        // Checked before fetching: an interval that fires after readiness must not poll.
        if let Some(payload) = self.ready.get(key) {
            return Ok(Some(payload.value().clone()));
        }

        let status = self.backend.asset_status(key).await?;
        match (status.ready, status.payload) {
            (true, Some(payload)) => {
                debug!(key, "Asset ready");
                self.ready.insert(key.to_string(), payload.clone());
                Ok(Some(payload))
            }
            (true, None) => {
                warn!(key, "Asset reported ready without payload, polling again");
                Ok(None)
            }
            (false, _) => Ok(None),
        }
    }
}

/// Polls ready-check endpoints for keyed assets, caching what it retrieves.
///
/// Once an asset is ready its payload is cached for the life of the poller
/// and later watches for the same key never issue a request.
#[derive(Clone)]
pub struct AssetPoller {
    inner: Arc<AssetPollerInner>,
}

impl AssetPoller {
    /// Creates a poller checking readiness every `interval`.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(AssetPollerInner {
                backend,
                interval,
                ready: DashMap::new(),
            }),
        }
    }

    /// Returns the cached payload for `key`, if it was already retrieved.
    #[must_use]
    pub fn cached(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.ready.get(key).map(|entry| entry.value().clone())
    }

    /// Runs one readiness check for `key`.
    ///
    /// Returns the payload once ready. A key already cached answers from the
    /// cache without a request.
    pub async fn tick(&self, key: &str) -> Result<Option<serde_json::Value>, LoreflowError> {
        self.inner.tick(key).await
    }

    /// Starts watching `key`.
    ///
    /// An absent or blank key yields an inert watch. A cached key yields a
    /// watch that is ready immediately. Otherwise polling starts at once and
    /// repeats every interval until the asset is ready.
    pub fn watch(&self, key: Option<&str>) -> AssetWatch {
        let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
            return AssetWatch {
                key: None,
                state: AssetWatchState::Inert,
            };
        };

        if let Some(payload) = self.cached(key) {
            return AssetWatch {
                key: Some(key.to_string()),
                state: AssetWatchState::Ready(payload),
            };
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let inner = self.inner.clone();
        let owned_key = key.to_string();

        let handle = PollHandle::spawn(format!("asset:{key}"), self.inner.interval, move |token| {
            let inner = inner.clone();
            let key = owned_key.clone();
            let tx = tx.clone();
            async move {
                match inner.tick(&key).await {
                    Ok(Some(payload)) => {
                        if !token.is_cancelled() {
                            let _ = tx.send(payload);
                        }
                        ControlFlow::Break(())
                    }
                    Ok(None) => ControlFlow::Continue(()),
                    Err(e) => {
                        debug!(key = %key, error = %e, "Asset check failed, retrying next tick");
                        ControlFlow::Continue(())
                    }
                }
            }
        });

        AssetWatch {
            key: Some(key.to_string()),
            state: AssetWatchState::Polling { rx, handle },
        }
    }
}

impl std::fmt::Debug for AssetPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetPoller")
            .field("interval", &self.inner.interval)
            .field("cached", &self.inner.ready.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum AssetWatchState {
    Inert,
    Polling {
        rx: mpsc::UnboundedReceiver<serde_json::Value>,
        handle: PollHandle,
    },
    Ready(serde_json::Value),
    Stopped,
}

/// One key being watched by an [`AssetPoller`].
#[derive(Debug)]
pub struct AssetWatch {
    key: Option<String>,
    state: AssetWatchState,
}

impl AssetWatch {
    /// The watched key; `None` for an inert watch.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// The payload, if it has been received.
    #[must_use]
    pub const fn value(&self) -> Option<&serde_json::Value> {
        match &self.state {
            AssetWatchState::Ready(payload) => Some(payload),
            _ => None,
        }
    }

    /// Returns true while a poll loop is running for this watch.
    #[must_use]
    pub const fn is_polling(&self) -> bool {
        matches!(self.state, AssetWatchState::Polling { .. })
    }

    /// Waits for the payload.
    ///
    /// Returns `None` immediately for inert or cancelled watches.
    pub async fn ready(&mut self) -> Option<serde_json::Value> {
        if let AssetWatchState::Polling { rx, .. } = &mut self.state {
            self.state = match rx.recv().await {
                Some(payload) => AssetWatchState::Ready(payload),
                None => AssetWatchState::Stopped,
            };
        }
        self.value().cloned()
    }

    /// Stops polling. A payload already received is kept.
    pub fn cancel(&mut self) {
        if let AssetWatchState::Polling { handle, .. } = &self.state {
            handle.stop("asset watch cancelled");
            self.state = AssetWatchState::Stopped;
        }
    }
}
