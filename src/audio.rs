// src/audio.rs
// Voiceover slicing with ffmpeg. Outputs are keyed by (source, start,
// duration) so repeated trims of the same slice reuse the existing file
// instead of re-encoding.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::tools::{AudioTool, ToolError};

pub struct FfmpegAudio {
    work_dir: PathBuf,
}

impl FfmpegAudio {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    fn output_path(&self, source_ref: &str, start: f64, duration: f64) -> PathBuf {
        let stem = Path::new(source_ref)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("voiceover");
        let start_ms = (start * 1000.0).round() as u64;
        let duration_ms = (duration * 1000.0).round() as u64;
        self.work_dir
            .join(format!("{}_{}ms_{}ms.wav", stem, start_ms, duration_ms))
    }
}

#[async_trait]
impl AudioTool for FfmpegAudio {
    async fn trim(
        &self,
        source_ref: &str,
        start: f64,
        duration: f64,
    ) -> Result<String, ToolError> {
        let output_path = self.output_path(source_ref, start, duration);

        // Same slice already cut on a previous attempt.
        if tokio::fs::try_exists(&output_path).await? {
            debug!("Reusing trimmed slice {}", output_path.display());
            return Ok(output_path.to_string_lossy().into_owned());
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;

        let start_arg = format!("{:.3}", start);
        let duration_arg = format!("{:.3}", duration);
        let output = Command::new("ffmpeg")
            .args([
                "-ss",
                &start_arg,
                "-t",
                &duration_arg,
                "-i",
                source_ref,
                "-vn",
                "-acodec",
                "pcm_s16le",
                "-ar",
                "44100",
                "-ac",
                "2",
                "-y",
            ])
            .arg(&output_path)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolError::Ffmpeg(format!(
                "trim of {} failed: {}",
                source_ref,
                stderr.trim()
            )));
        }

        debug!(
            "✂️ Trimmed {:.3}s at {:.3}s from {} into {}",
            duration,
            start,
            source_ref,
            output_path.display()
        );
        Ok(output_path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn output_path_is_deterministic_per_slice() {
        let tool = FfmpegAudio::new("/tmp/sceneflow-test");
        let a = tool.output_path("s3://audio/master.wav", 4.0, 3.5);
        let b = tool.output_path("s3://audio/master.wav", 4.0, 3.5);
        assert_eq!(a, b);
        assert_eq!(
            a.file_name().unwrap().to_str().unwrap(),
            "master_4000ms_3500ms.wav"
        );

        let shifted = tool.output_path("s3://audio/master.wav", 7.5, 3.5);
        assert_ne!(a, shifted);
    }

    #[tokio::test]
    async fn reuses_an_existing_slice_without_reencoding() {
        let dir = std::env::temp_dir().join(format!("sceneflow-audio-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let tool = FfmpegAudio::new(&dir);
        let expected = tool.output_path("master.wav", 0.0, 4.0);
        tokio::fs::write(&expected, b"riff").await.unwrap();

        // ffmpeg never runs: the slice is already on disk.
        let out = tool.trim("master.wav", 0.0, 4.0).await.unwrap();
        assert_eq!(out, expected.to_string_lossy());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
