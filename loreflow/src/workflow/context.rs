//! Injected dependencies of a workflow run.

use std::sync::Arc;
use uuid::Uuid;

use crate::client::GenerationBackend;
use crate::config::LoreflowConfig;
use crate::core::StageKey;
use crate::events::{event_payload, EventSink, NoOpEventSink, WorkflowEvent};
use crate::polling::{AssetPoller, JobPoller};
use crate::stages::StageRegistry;

/// Everything a [`StageMachine`](super::StageMachine) needs from its
/// surroundings, passed in explicitly.
#[derive(Clone)]
pub struct WorkflowContext {
    run_id: Uuid,
    backend: Arc<dyn GenerationBackend>,
    events: Arc<dyn EventSink>,
    config: LoreflowConfig,
    registry: StageRegistry,
}

impl WorkflowContext {
    /// Creates a context around `backend` with default configuration and no
    /// event sink.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            backend,
            events: Arc::new(NoOpEventSink),
            config: LoreflowConfig::default(),
            registry: StageRegistry::standard(),
        }
    }

    /// Creates a context talking to the HTTP backend described by `config`.
    #[cfg(feature = "http")]
    pub fn from_config(config: LoreflowConfig) -> Result<Self, crate::errors::LoreflowError> {
        config.validate()?;
        let backend = crate::client::HttpBackend::new(&config.backend)?;
        Ok(Self::new(Arc::new(backend))
            .with_events(Arc::new(crate::events::LoggingEventSink::default()))
            .with_config(config))
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: LoreflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the run id used to correlate events.
    #[must_use]
    pub const fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// The run id.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn GenerationBackend> {
        &self.backend
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &LoreflowConfig {
        &self.config
    }

    /// The stage registry.
    #[must_use]
    pub const fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// A job poller using the configured interval.
    #[must_use]
    pub fn job_poller(&self) -> JobPoller {
        JobPoller::new(self.backend.clone(), self.config.polling.job_interval())
    }

    /// An asset poller using the configured interval.
    #[must_use]
    pub fn asset_poller(&self) -> AssetPoller {
        AssetPoller::new(self.backend.clone(), self.config.polling.asset_interval())
    }

    /// Emits a workflow event to the sink.
    pub fn emit(&self, event: WorkflowEvent, stage: StageKey, extra: serde_json::Value) {
        self.events
            .try_emit(event.as_str(), Some(event_payload(self.run_id, stage, extra)));
    }
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("run_id", &self.run_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
