//! Configuration for the backend connection and polling cadence.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::errors::LoreflowError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoreflowConfig {
    /// Backend connection settings.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Poll cadence settings.
    #[serde(default)]
    pub polling: PollingConfig,
}

impl LoreflowConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, LoreflowError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoreflowError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Sets the backend configuration.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the polling configuration.
    #[must_use]
    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    /// Checks values that would make the orchestrator misbehave.
    pub fn validate(&self) -> Result<(), LoreflowError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(LoreflowError::Config("backend.base_url must not be empty".into()));
        }
        seconds_to_duration("backend.timeout_seconds", self.backend.timeout_seconds)?;
        if self.polling.job_interval_ms == 0 {
            return Err(LoreflowError::Config("polling.job_interval_ms must be positive".into()));
        }
        if self.polling.asset_interval_ms == 0 {
            return Err(LoreflowError::Config("polling.asset_interval_ms must be positive".into()));
        }
        self.polling.settle_timeout()?;
        Ok(())
    }
}

/// Configuration for the HTTP backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the generation API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Additional headers to include.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout() -> f64 {
    30.0
}

fn default_user_agent() -> String {
    format!("loreflow/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
            headers: HashMap::new(),
        }
    }
}

impl BackendConfig {
    /// Creates a backend configuration for `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Gets timeout as Duration.
    pub fn timeout(&self) -> Result<Duration, LoreflowError> {
        seconds_to_duration("backend.timeout_seconds", self.timeout_seconds)
    }
}

/// Poll cadence for jobs and assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Interval between job status fetches.
    #[serde(default = "default_job_interval")]
    pub job_interval_ms: u64,
    /// Interval between asset readiness fetches.
    #[serde(default = "default_asset_interval")]
    pub asset_interval_ms: u64,
    /// How long `wait_until_settled` waits before giving up. `None` waits forever.
    #[serde(default)]
    pub settle_timeout_seconds: Option<f64>,
}

fn default_job_interval() -> u64 {
    2000
}

fn default_asset_interval() -> u64 {
    3000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            job_interval_ms: default_job_interval(),
            asset_interval_ms: default_asset_interval(),
            settle_timeout_seconds: None,
        }
    }
}

impl PollingConfig {
    /// Sets the job poll interval.
    #[must_use]
    pub fn with_job_interval_ms(mut self, ms: u64) -> Self {
        self.job_interval_ms = ms;
        self
    }

    /// Sets the asset poll interval.
    #[must_use]
    pub fn with_asset_interval_ms(mut self, ms: u64) -> Self {
        self.asset_interval_ms = ms;
        self
    }

    /// Sets the settle timeout.
    #[must_use]
    pub fn with_settle_timeout(mut self, seconds: f64) -> Self {
        self.settle_timeout_seconds = Some(seconds);
        self
    }

    /// Job poll interval as Duration.
    #[must_use]
    pub const fn job_interval(&self) -> Duration {
        Duration::from_millis(self.job_interval_ms)
    }

    /// Asset poll interval as Duration.
    #[must_use]
    pub const fn asset_interval(&self) -> Duration {
        Duration::from_millis(self.asset_interval_ms)
    }

    /// Settle timeout as Duration.
    pub fn settle_timeout(&self) -> Result<Option<Duration>, LoreflowError> {
        self.settle_timeout_seconds
            .map(|seconds| seconds_to_duration("polling.settle_timeout_seconds", seconds))
            .transpose()
    }
}

/// Longest timeout accepted anywhere in the configuration: one week.
pub const MAX_TIMEOUT_SECONDS: f64 = 7.0 * 24.0 * 3600.0;

fn seconds_to_duration(field: &str, seconds: f64) -> Result<Duration, LoreflowError> {
    if !(seconds.is_finite() && seconds > 0.0 && seconds <= MAX_TIMEOUT_SECONDS) {
        return Err(LoreflowError::Config(format!(
            "{field} must be a positive number of seconds no greater than {MAX_TIMEOUT_SECONDS}, got {seconds}"
        )));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| LoreflowError::Config(format!("{field}: {e}")))
}
