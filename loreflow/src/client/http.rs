//! HTTP adapter for the generation backend.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::ports::{GenerationBackend, StartJobRequest};
use crate::config::BackendConfig;
use crate::core::{AssetStatus, JobId, JobSnapshot};
use crate::errors::LoreflowError;

const JOBS_PATH: &str = "api/jobs";
const ASSETS_PATH: &str = "api/assets";

#[derive(Debug, Deserialize)]
struct StartJobResponse {
    job_id: JobId,
}

/// Generation backend reached over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Builds a client from configuration.
    pub fn new(config: &BackendConfig) -> Result<Self, LoreflowError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| LoreflowError::Config(format!("invalid header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| LoreflowError::Config(format!("invalid value for header '{key}': {e}")))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(config.timeout()?)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, LoreflowError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LoreflowError::backend(status.as_u16(), body));
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn start_job(&self, request: &StartJobRequest) -> Result<JobId, LoreflowError> {
        let url = self.endpoint(JOBS_PATH);
        debug!(url = %url, stage = %request.stage, "Starting generation job");

        let response = self.client.post(url).json(request).send().await?;
        let started: StartJobResponse = Self::decode(response).await?;
        Ok(started.job_id)
    }

    async fn job_status(&self, job_id: &JobId) -> Result<JobSnapshot, LoreflowError> {
        let url = self.endpoint(&format!("{JOBS_PATH}/{job_id}"));
        let response = self.client.get(url).send().await?;
        Self::decode(response).await
    }

    async fn asset_status(&self, key: &str) -> Result<AssetStatus, LoreflowError> {
        let url = self.endpoint(&format!("{ASSETS_PATH}/{key}"));
        let response = self.client.get(url).send().await?;
        Self::decode(response).await
    }
}
