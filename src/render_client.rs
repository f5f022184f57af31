// Render service client: the deployment's FFmpeg-based graphics renderer.
// Same submit/poll shape as the avatar provider, but self-hosted, so the
// base URL comes from configuration.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::GenerationParams;
use crate::tools::{GraphicsApi, RenderJobPoller, RenderJobStatus, ToolError};

#[derive(Debug, Clone)]
pub struct RenderServiceClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize, Debug)]
struct CreateJobRequest<'a> {
    prompt: &'a str,
    params: &'a GenerationParams,
}

#[derive(Deserialize, Debug)]
struct CreateJobResponse {
    job_id: String,
}

#[derive(Deserialize, Debug)]
struct JobStatusResponse {
    status: String,
    output_url: Option<String>,
    error: Option<String>,
}

fn retry_policy() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_secs(1),
        max_interval: Duration::from_secs(30),
        multiplier: 2.0,
        max_elapsed_time: Some(Duration::from_secs(60)),
        ..Default::default()
    }
}

fn classify(e: reqwest::Error) -> backoff::Error<ToolError> {
    if e.is_connect() || e.is_timeout() {
        warn!("Render service connection error (retrying): {}", e);
        backoff::Error::transient(ToolError::Http(e))
    } else {
        backoff::Error::permanent(ToolError::Http(e))
    }
}

fn map_status(response: JobStatusResponse) -> Result<RenderJobStatus, ToolError> {
    match response.status.as_str() {
        "queued" => Ok(RenderJobStatus::queued()),
        "processing" => Ok(RenderJobStatus::processing()),
        "completed" => match response.output_url {
            Some(url) => Ok(RenderJobStatus::completed(url)),
            None => Err(ToolError::InvalidResponse(
                "completed job without output_url".to_string(),
            )),
        },
        "failed" => Ok(RenderJobStatus::failed(
            response
                .error
                .unwrap_or_else(|| "no error reported".to_string()),
        )),
        other => Err(ToolError::InvalidResponse(format!(
            "unknown job status: {}",
            other
        ))),
    }
}

impl RenderServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn submit_job(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ToolError> {
        let request_body = CreateJobRequest { prompt, params };

        let operation = || async {
            let response = self
                .client
                .post(format!("{}/v1/jobs", self.base_url))
                .header("Content-Type", "application/json")
                .timeout(Duration::from_secs(30))
                .json(&request_body)
                .send()
                .await
                .map_err(classify)?;

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                warn!("Render service returned {} (retrying): {}", status, body);
                return Err(backoff::Error::transient(ToolError::Api {
                    provider: "renderer".to_string(),
                    status: status.as_u16(),
                    body,
                }));
            }
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(backoff::Error::permanent(ToolError::Api {
                    provider: "renderer".to_string(),
                    status: status.as_u16(),
                    body,
                }));
            }

            response
                .json::<CreateJobResponse>()
                .await
                .map_err(|e| backoff::Error::permanent(ToolError::Http(e)))
        };

        let created = retry(retry_policy(), operation).await?;
        info!("🎬 Render job {} created", created.job_id);
        Ok(created.job_id)
    }

    pub async fn job_status(&self, job_id: &str) -> Result<RenderJobStatus, ToolError> {
        let operation = || async {
            let response = self
                .client
                .get(format!("{}/v1/jobs/{}", self.base_url, job_id))
                .timeout(Duration::from_secs(30))
                .send()
                .await
                .map_err(classify)?;

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                warn!("Render service returned {} (retrying): {}", status, body);
                return Err(backoff::Error::transient(ToolError::Api {
                    provider: "renderer".to_string(),
                    status: status.as_u16(),
                    body,
                }));
            }
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(backoff::Error::permanent(ToolError::Api {
                    provider: "renderer".to_string(),
                    status: status.as_u16(),
                    body,
                }));
            }

            let parsed: JobStatusResponse = response
                .json()
                .await
                .map_err(|e| backoff::Error::permanent(ToolError::Http(e)))?;
            map_status(parsed).map_err(backoff::Error::permanent)
        };

        retry(retry_policy(), operation).await
    }
}

#[async_trait]
impl RenderJobPoller for RenderServiceClient {
    fn provider(&self) -> &str {
        "renderer"
    }

    async fn poll_status(&self, job_id: &str) -> Result<RenderJobStatus, ToolError> {
        self.job_status(job_id).await
    }
}

#[async_trait]
impl GraphicsApi for RenderServiceClient {
    async fn create_job(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ToolError> {
        self.submit_job(prompt, params).await
    }
}
