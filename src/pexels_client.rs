// src/pexels_client.rs
// Pexels stock media search: b-roll clips and still photos.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::tools::{StockClip, StockFootageApi, StockPhoto, ToolError};

#[derive(Debug, Clone)]
pub struct PexelsClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PexelsVideoResponse {
    pub page: i32,
    pub per_page: i32,
    pub total_results: i32,
    pub videos: Vec<PexelsVideo>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PexelsVideo {
    pub id: i64,
    pub width: i32,
    pub height: i32,
    pub duration: i32,
    pub video_files: Vec<PexelsVideoFile>,
    pub video_pictures: Vec<PexelsVideoPicture>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PexelsVideoFile {
    pub id: i64,
    pub quality: String,
    pub file_type: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<f64>,
    pub link: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PexelsVideoPicture {
    pub id: i64,
    pub picture: String,
    pub nr: i32,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PexelsPhotoResponse {
    pub page: i32,
    pub per_page: i32,
    pub total_results: i32,
    pub photos: Vec<PexelsPhoto>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PexelsPhoto {
    pub id: i64,
    pub width: i32,
    pub height: i32,
    pub url: String,
    pub photographer: String,
    pub src: PexelsPhotoSrc,
    pub alt: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PexelsPhotoSrc {
    pub original: String,
    pub large2x: String,
    pub large: String,
    pub medium: String,
    pub small: String,
    pub portrait: String,
    pub landscape: String,
    pub tiny: String,
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
        warn!("Pexels connection error (retrying): {}", e);
        backoff::Error::transient(ToolError::Http(e))
    } else {
        backoff::Error::permanent(ToolError::Http(e))
    }
}

/// Best playable file for a clip: prefer HD, fall back to SD, then whatever
/// the provider listed first.
fn best_file_link(video: &PexelsVideo) -> Option<String> {
    video
        .video_files
        .iter()
        .find(|f| f.quality == "hd")
        .or_else(|| video.video_files.iter().find(|f| f.quality == "sd"))
        .or_else(|| video.video_files.first())
        .map(|f| f.link.clone())
}

fn clip_from_video(video: &PexelsVideo) -> Option<StockClip> {
    let video_url = best_file_link(video)?;
    Some(StockClip {
        id: video.id.to_string(),
        video_url,
        duration: video.duration as f64,
        thumbnail: video.video_pictures.first().map(|p| p.picture.clone()),
    })
}

fn photo_from_pexels(photo: &PexelsPhoto) -> StockPhoto {
    StockPhoto {
        id: photo.id.to_string(),
        image_url: photo.src.large2x.clone(),
        alt: (!photo.alt.is_empty()).then(|| photo.alt.clone()),
    }
}

impl PexelsClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api.pexels.com".to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &HashMap<&str, String>,
    ) -> Result<T, ToolError> {
        let operation = || async {
            let response = self
                .client
                .get(format!("{}{}", self.base_url, path))
                .header("Authorization", &self.api_key)
                .query(params)
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
                warn!("Pexels API returned {} (retrying): {}", status, body);
                return Err(backoff::Error::transient(ToolError::Api {
                    provider: "pexels".to_string(),
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
                    provider: "pexels".to_string(),
                    status: status.as_u16(),
                    body,
                }));
            }

            response
                .json::<T>()
                .await
                .map_err(|e| backoff::Error::permanent(ToolError::Http(e)))
        };

        retry(retry_policy(), operation).await
    }
}

#[async_trait]
impl StockFootageApi for PexelsClient {
    async fn search_videos(&self, query: &str, count: u32) -> Result<Vec<StockClip>, ToolError> {
        let mut params = HashMap::new();
        params.insert("query", query.to_string());
        params.insert("per_page", count.to_string());

        info!("🎬 Searching Pexels videos: '{}'", query);

        let response: PexelsVideoResponse = self.get_json("/videos/search", &params).await?;
        let clips: Vec<StockClip> = response.videos.iter().filter_map(clip_from_video).collect();

        info!("✅ Found {} videos for query: '{}'", clips.len(), query);
        Ok(clips)
    }

    async fn search_photos(&self, query: &str, count: u32) -> Result<Vec<StockPhoto>, ToolError> {
        let mut params = HashMap::new();
        params.insert("query", query.to_string());
        params.insert("per_page", count.to_string());

        info!("📸 Searching Pexels photos: '{}'", query);

        let response: PexelsPhotoResponse = self.get_json("/v1/search", &params).await?;
        let photos: Vec<StockPhoto> = response.photos.iter().map(photo_from_pexels).collect();

        info!("✅ Found {} photos for query: '{}'", photos.len(), query);
        Ok(photos)
    }
}
