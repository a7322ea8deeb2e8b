//! Per-episode JSON manifest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use vigil_core::error::CoreError;
use vigil_core::models::episode::{CloseReason, Episode, TriggerNote};
use vigil_core::ports::episode_sink::Artifact;

/// Manifest schema version
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeManifest {
    pub version: u32,
    pub episode_id: u64,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<CloseReason>,
    pub frame_count: usize,
    /// Frames recorded before the first trigger
    pub lookback_frames: usize,
    pub fps: f32,
    pub width: u32,
    pub height: u32,
    pub representative_frame: usize,
    pub triggers: Vec<TriggerNote>,
    /// File names are relative to the manifest's directory
    pub artifacts: Vec<Artifact>,
}

impl EpisodeManifest {
    pub fn build(episode: &Episode, run_id: &str, fps: f32, artifacts: &[Artifact]) -> Self {
        let (width, height) = episode
            .frames()
            .first()
            .map(|f| (f.width(), f.height()))
            .unwrap_or((0, 0));

        let artifacts = artifacts
            .iter()
            .map(|a| Artifact {
                kind: a.kind,
                path: a
                    .path
                    .file_name()
                    .map(Into::into)
                    .unwrap_or_else(|| a.path.clone()),
            })
            .collect();

        Self {
            version: MANIFEST_VERSION,
            episode_id: episode.id(),
            run_id: run_id.to_string(),
            started_at: episode.started_at(),
            ended_at: episode.ended_at(),
            duration_secs: episode.duration().as_secs_f64(),
            close_reason: episode.close_reason(),
            frame_count: episode.frame_count(),
            lookback_frames: episode.lookback_len(),
            fps,
            width,
            height,
            representative_frame: episode.representative_index().unwrap_or(0),
            triggers: episode.triggers().to_vec(),
            artifacts,
        }
    }

    /// Writes pretty-printed JSON to `path`.
    pub fn write_to(&self, path: &Path) -> Result<(), CoreError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
