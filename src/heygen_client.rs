// HeyGen API Client
// Avatar video generation: submit a render job, poll it to completion.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::tools::{AvatarApi, RenderJobPoller, RenderJobStatus, ToolError};

#[derive(Clone)]
pub struct HeyGenClient {
    api_key: String,
    client: Client,
    base_url: String,
    voice_id: Option<String>,
}

// ============================================================================
// API REQUEST/RESPONSE STRUCTURES
// ============================================================================

#[derive(Serialize, Debug)]
struct GenerateVideoRequest {
    video_inputs: Vec<VideoInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension: Option<Dimension>,
}

#[derive(Serialize, Debug)]
struct VideoInput {
    character: CharacterInput,
    voice: VoiceInput,
}

#[derive(Serialize, Debug)]
struct CharacterInput {
    #[serde(rename = "type")]
    kind: String,
    avatar_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_style: Option<String>,
}

#[derive(Serialize, Debug)]
struct VoiceInput {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_url: Option<String>,
}

#[derive(Serialize, Debug)]
struct Dimension {
    width: u32,
    height: u32,
}

#[derive(Deserialize, Debug)]
struct GenerateVideoResponse {
    data: Option<GenerateVideoData>,
}

#[derive(Deserialize, Debug)]
struct GenerateVideoData {
    video_id: String,
}

#[derive(Deserialize, Debug)]
struct VideoStatusResponse {
    data: Option<VideoStatusData>,
}

#[derive(Deserialize, Debug)]
struct VideoStatusData {
    status: String,
    video_url: Option<String>,
    error: Option<serde_json::Value>,
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

fn retry_policy() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_secs(1),
        max_interval: Duration::from_secs(30),
        multiplier: 2.0,
        max_elapsed_time: Some(Duration::from_secs(120)),
        ..Default::default()
    }
}

fn classify(e: reqwest::Error) -> backoff::Error<ToolError> {
    if e.is_connect() || e.is_timeout() {
        warn!("HeyGen connection error (retrying): {}", e);
        backoff::Error::transient(ToolError::Http(e))
    } else {
        backoff::Error::permanent(ToolError::Http(e))
    }
}

fn map_status(data: VideoStatusData) -> Result<RenderJobStatus, ToolError> {
    match data.status.as_str() {
        "pending" | "waiting" => Ok(RenderJobStatus::queued()),
        "processing" => Ok(RenderJobStatus::processing()),
        "completed" => match data.video_url {
            Some(url) => Ok(RenderJobStatus::completed(url)),
            None => Err(ToolError::InvalidResponse(
                "completed video without video_url".to_string(),
            )),
        },
        "failed" | "error" => Ok(RenderJobStatus::failed(
            data.error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no error reported".to_string()),
        )),
        other => Err(ToolError::InvalidResponse(format!(
            "unknown video status: {}",
            other
        ))),
    }
}

impl HeyGenClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: "https://api.heygen.com".to_string(),
            voice_id: None,
        }
    }

    /// Voice used for text-driven scenes. Without it the provider's default
    /// voice applies.
    pub fn with_voice_id(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }

    /// Submit an avatar render job. With an audio reference the avatar lip-
    /// syncs to it; otherwise the voice is generated from the script text.
    pub async fn generate_video(
        &self,
        script: &str,
        audio_ref: Option<&str>,
        avatar_id: &str,
    ) -> Result<String, ToolError> {
        let voice = match audio_ref {
            Some(url) => VoiceInput {
                kind: "audio".to_string(),
                input_text: None,
                voice_id: None,
                audio_url: Some(url.to_string()),
            },
            None => VoiceInput {
                kind: "text".to_string(),
                input_text: Some(script.to_string()),
                voice_id: self.voice_id.clone(),
                audio_url: None,
            },
        };

        let request_body = GenerateVideoRequest {
            video_inputs: vec![VideoInput {
                character: CharacterInput {
                    kind: "avatar".to_string(),
                    avatar_id: avatar_id.to_string(),
                    avatar_style: Some("normal".to_string()),
                },
                voice,
            }],
            dimension: Some(Dimension {
                width: 1920,
                height: 1080,
            }),
        };

        let operation = || async {
            let response = self
                .client
                .post(format!("{}/v2/video/generate", self.base_url))
                .header("X-Api-Key", &self.api_key)
                .header("Content-Type", "application/json")
                .timeout(Duration::from_secs(60))
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
                warn!("HeyGen API returned {} (retrying): {}", status, body);
                return Err(backoff::Error::transient(ToolError::Api {
                    provider: "heygen".to_string(),
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
                    provider: "heygen".to_string(),
                    status: status.as_u16(),
                    body,
                }));
            }

            let parsed: GenerateVideoResponse = response
                .json()
                .await
                .map_err(|e| backoff::Error::permanent(ToolError::Http(e)))?;
            parsed.data.map(|d| d.video_id).ok_or_else(|| {
                backoff::Error::permanent(ToolError::InvalidResponse(
                    "missing data.video_id in generate response".to_string(),
                ))
            })
        };

        let video_id = retry(retry_policy(), operation).await?;
        info!("🎬 HeyGen video job {} created", video_id);
        Ok(video_id)
    }

    pub async fn video_status(&self, video_id: &str) -> Result<RenderJobStatus, ToolError> {
        let operation = || async {
            let response = self
                .client
                .get(format!("{}/v1/video_status.get", self.base_url))
                .query(&[("video_id", video_id)])
                .header("X-Api-Key", &self.api_key)
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
                warn!("HeyGen API returned {} (retrying): {}", status, body);
                return Err(backoff::Error::transient(ToolError::Api {
                    provider: "heygen".to_string(),
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
                    provider: "heygen".to_string(),
                    status: status.as_u16(),
                    body,
                }));
            }

            let parsed: VideoStatusResponse = response
                .json()
                .await
                .map_err(|e| backoff::Error::permanent(ToolError::Http(e)))?;
            let data = parsed.data.ok_or_else(|| {
                backoff::Error::permanent(ToolError::InvalidResponse(
                    "missing data in video_status response".to_string(),
                ))
            })?;
            map_status(data).map_err(backoff::Error::permanent)
        };

        retry(retry_policy(), operation).await
    }
}

#[async_trait]
impl RenderJobPoller for HeyGenClient {
    fn provider(&self) -> &str {
        "heygen"
    }

    async fn poll_status(&self, job_id: &str) -> Result<RenderJobStatus, ToolError> {
        self.video_status(job_id).await
    }
}

#[async_trait]
impl AvatarApi for HeyGenClient {
    async fn create_job(
        &self,
        script: &str,
        audio_ref: Option<&str>,
        avatar_id: &str,
    ) -> Result<String, ToolError> {
        self.generate_video(script, audio_ref, avatar_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::RenderProgress;

    #[test]
    fn status_mapping_covers_the_provider_vocabulary() {
        let queued = map_status(VideoStatusData {
            status: "waiting".to_string(),
            video_url: None,
            error: None,
        })
        .unwrap();
        assert_eq!(queued.state, RenderProgress::Queued);

        let done = map_status(VideoStatusData {
            status: "completed".to_string(),
            video_url: Some("https://cdn.heygen.com/v.mp4".to_string()),
            error: None,
        })
        .unwrap();
        assert_eq!(done.state, RenderProgress::Completed);
        assert_eq!(done.download_url.as_deref(), Some("https://cdn.heygen.com/v.mp4"));

        let failed = map_status(VideoStatusData {
            status: "failed".to_string(),
            video_url: None,
            error: Some(serde_json::json!({"code": "render_error"})),
        })
        .unwrap();
        assert_eq!(failed.state, RenderProgress::Failed);
        assert!(failed.error.unwrap().contains("render_error"));
    }

    #[test]
    fn completed_without_url_is_invalid() {
        let result = map_status(VideoStatusData {
            status: "completed".to_string(),
            video_url: None,
            error: None,
        });
        assert!(result.is_err());

        let unknown = map_status(VideoStatusData {
            status: "archived".to_string(),
            video_url: None,
            error: None,
        });
        assert!(unknown.is_err());
    }
}
