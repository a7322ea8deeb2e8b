//! Episode persistence port.
//!
//! Implementation: `vigil-storage::episode_writer::EpisodeFileWriter`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::CoreError;
use crate::models::episode::Episode;

/// Kind of file produced for an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// H.264 MP4 (ffmpeg)
    Mp4Video,
    /// Animated GIF, used when MP4 encoding is unavailable
    GifVideo,
    /// Motion-JPEG AVI for older players
    MjpegAvi,
    /// JPEG of the representative frame
    StillImage,
    /// JSON episode manifest
    Manifest,
}

impl ArtifactKind {
    pub fn is_primary_video(&self) -> bool {
        matches!(self, ArtifactKind::Mp4Video | ArtifactKind::GifVideo)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

/// Files written for one episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeArtifacts {
    pub episode_id: u64,
    pub directory: PathBuf,
    pub artifacts: Vec<Artifact>,
}

impl EpisodeArtifacts {
    /// Path of the first artifact of `kind`.
    pub fn path_of(&self, kind: ArtifactKind) -> Option<&PathBuf> {
        self.artifacts
            .iter()
            .find(|a| a.kind == kind)
            .map(|a| &a.path)
    }

    /// The MP4 or GIF, whichever was written.
    pub fn primary_video(&self) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.kind.is_primary_video())
    }
}

/// Persists closed episodes.
///
/// The sink takes ownership of the episode; the controller never sees it
/// again.
#[async_trait]
pub trait EpisodeSink: Send + Sync {
    /// Writes a primary video, a compatibility video and a still image.
    /// Fails with [`CoreError::EmptyEpisode`] for zero frames and
    /// [`CoreError::Write`] when the destination is not writable.
    async fn write(&self, episode: Episode) -> Result<EpisodeArtifacts, CoreError>;
}
