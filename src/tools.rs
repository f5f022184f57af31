// src/tools.rs
// Trait seams for the external services scene agents talk to.
// Concrete clients live in heygen_client.rs, pexels_client.rs,
// render_client.rs and audio.rs; tests register scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::GenerationParams;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("ffmpeg failed: {0}")]
    Ffmpeg(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Provider-side progress of an asynchronous render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderProgress {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl RenderProgress {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderProgress::Queued => "queued",
            RenderProgress::Processing => "processing",
            RenderProgress::Completed => "completed",
            RenderProgress::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderProgress::Completed | RenderProgress::Failed)
    }
}

/// Normalized poll result, whatever shape the provider reports in.
#[derive(Debug, Clone)]
pub struct RenderJobStatus {
    pub state: RenderProgress,
    pub download_url: Option<String>,
    pub error: Option<String>,
}

impl RenderJobStatus {
    pub fn queued() -> Self {
        Self {
            state: RenderProgress::Queued,
            download_url: None,
            error: None,
        }
    }

    pub fn processing() -> Self {
        Self {
            state: RenderProgress::Processing,
            download_url: None,
            error: None,
        }
    }

    pub fn completed(download_url: impl Into<String>) -> Self {
        Self {
            state: RenderProgress::Completed,
            download_url: Some(download_url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: RenderProgress::Failed,
            download_url: None,
            error: Some(error.into()),
        }
    }
}

/// Audio trimming used to cut per-scene voiceover out of the project track.
/// Implementations must be idempotent: the output reference is derived from
/// (source, start, duration), and an already-produced output is returned
/// without re-encoding.
#[async_trait]
pub trait AudioTool: Send + Sync {
    async fn trim(&self, source_ref: &str, start: f64, duration: f64)
        -> Result<String, ToolError>;
}

/// Polling side of any provider that renders asynchronously.
#[async_trait]
pub trait RenderJobPoller: Send + Sync {
    /// Provider tag stored on render job handles, e.g. "heygen".
    fn provider(&self) -> &str;

    async fn poll_status(&self, job_id: &str) -> Result<RenderJobStatus, ToolError>;
}

/// Avatar video generation (a-roll). Returns the provider job id; the
/// reconciler polls it to completion via the `RenderJobPoller` half.
#[async_trait]
pub trait AvatarApi: RenderJobPoller {
    async fn create_job(
        &self,
        script: &str,
        audio_ref: Option<&str>,
        avatar_id: &str,
    ) -> Result<String, ToolError>;
}

/// Programmatic graphics rendering. Same submit/poll split as `AvatarApi`.
#[async_trait]
pub trait GraphicsApi: RenderJobPoller {
    async fn create_job(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ToolError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockClip {
    pub id: String,
    pub video_url: String,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockPhoto {
    pub id: String,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

/// Stock media search (b-roll clips and still images).
#[async_trait]
pub trait StockFootageApi: Send + Sync {
    async fn search_videos(&self, query: &str, count: u32) -> Result<Vec<StockClip>, ToolError>;

    async fn search_photos(&self, query: &str, count: u32) -> Result<Vec<StockPhoto>, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_progress_terminality() {
        assert!(!RenderProgress::Queued.is_terminal());
        assert!(!RenderProgress::Processing.is_terminal());
        assert!(RenderProgress::Completed.is_terminal());
        assert!(RenderProgress::Failed.is_terminal());
    }

    #[test]
    fn status_constructors_carry_payload() {
        let done = RenderJobStatus::completed("https://cdn.example.com/v.mp4");
        assert_eq!(done.state, RenderProgress::Completed);
        assert_eq!(
            done.download_url.as_deref(),
            Some("https://cdn.example.com/v.mp4")
        );
        assert!(done.error.is_none());

        let failed = RenderJobStatus::failed("render node crashed");
        assert_eq!(failed.state, RenderProgress::Failed);
        assert!(failed.download_url.is_none());
        assert_eq!(failed.error.as_deref(), Some("render node crashed"));
    }
}
