//! Episode file writer.
//!
//! Turns a closed episode into files under `<output>/<run_id>/`. Encoding is
//! CPU-bound and runs on the blocking pool so the sampling loop never waits
//! on it.

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use image::RgbaImage;
use std::borrow::Cow;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use vigil_core::config::{AppConfig, PrimaryVideoFormat};
use vigil_core::error::CoreError;
use vigil_core::models::episode::Episode;
use vigil_core::ports::episode_sink::{Artifact, ArtifactKind, EpisodeArtifacts, EpisodeSink};
use vigil_vision::encoder::encode_jpeg;

use crate::manifest::EpisodeManifest;
use crate::video::avi::write_mjpeg_avi;
use crate::video::ffmpeg::{encode_mp4, ffmpeg_available};
use crate::video::gif::encode_gif;
use crate::video::uniform_frames;

/// Output settings for episode files
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub primary_video: PrimaryVideoFormat,
    pub ffmpeg_path: String,
    pub fps: f32,
    pub jpeg_quality: u8,
    pub write_legacy_video: bool,
    pub write_manifest: bool,
}

impl WriterOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            primary_video: config.output.primary_video,
            ffmpeg_path: config.output.ffmpeg_path.clone(),
            fps: config.video_fps(),
            jpeg_quality: config.output.jpeg_quality,
            write_legacy_video: config.output.write_legacy_video,
            write_manifest: config.output.write_manifest,
        }
    }
}

/// Run identifier for a session started at `started`, e.g. `run_20260118_143005`.
pub fn run_id_for(started: DateTime<Local>) -> String {
    started.format("run_%Y%m%d_%H%M%S").to_string()
}

/// File stem shared by an episode's artifacts.
pub fn episode_stem(episode_id: u64, started_at: DateTime<Utc>) -> String {
    format!(
        "episode_{:03}_{}",
        episode_id,
        started_at.with_timezone(&Local).format("%Y%m%d_%H%M%S")
    )
}

/// Writes episodes into one run directory.
pub struct EpisodeFileWriter {
    run_dir: PathBuf,
    run_id: String,
    options: WriterOptions,
    mp4_available: bool,
}

impl EpisodeFileWriter {
    /// Creates `<output_root>/<run_id>` and probes ffmpeg when MP4 output may
    /// be used.
    pub async fn create(
        output_root: &Path,
        run_id: impl Into<String>,
        options: WriterOptions,
    ) -> Result<Self, CoreError> {
        let run_id = run_id.into();
        let run_dir = output_root.join(&run_id);
        fs::create_dir_all(&run_dir).await.map_err(|e| {
            CoreError::Write(format!(
                "cannot create run directory {}: {e}",
                run_dir.display()
            ))
        })?;

        let mp4_available = match options.primary_video {
            PrimaryVideoFormat::Gif => false,
            PrimaryVideoFormat::Auto | PrimaryVideoFormat::Mp4 => {
                let ffmpeg = options.ffmpeg_path.clone();
                tokio::task::spawn_blocking(move || ffmpeg_available(&ffmpeg))
                    .await
                    .unwrap_or(false)
            }
        };

        match (options.primary_video, mp4_available) {
            (PrimaryVideoFormat::Mp4, false) => warn!(
                ffmpeg = %options.ffmpeg_path,
                "ffmpeg not found; MP4 output will fail"
            ),
            (PrimaryVideoFormat::Auto, false) => info!(
                ffmpeg = %options.ffmpeg_path,
                "ffmpeg not found, primary video falls back to GIF"
            ),
            _ => {}
        }

        info!(
            run_dir = %run_dir.display(),
            fps = options.fps,
            mp4 = mp4_available,
            "episode writer ready"
        );

        Ok(Self {
            run_dir,
            run_id,
            options,
            mp4_available,
        })
    }

    /// Directory shared by every episode of this run.
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

#[async_trait]
impl EpisodeSink for EpisodeFileWriter {
    async fn write(&self, episode: Episode) -> Result<EpisodeArtifacts, CoreError> {
        if episode.is_empty() {
            warn!(episode_id = episode.id(), "refusing to write empty episode");
            return Err(CoreError::EmptyEpisode {
                episode_id: episode.id(),
            });
        }

        // The run directory may have been removed while the session ran.
        fs::create_dir_all(&self.run_dir).await.map_err(|e| {
            CoreError::Write(format!(
                "output directory {} is not writable: {e}",
                self.run_dir.display()
            ))
        })?;

        let job = WriteJob {
            dir: self.run_dir.clone(),
            run_id: self.run_id.clone(),
            options: self.options.clone(),
            mp4_available: self.mp4_available,
        };
        let episode_id = episode.id();

        let artifacts = tokio::task::spawn_blocking(move || job.run(&episode))
            .await
            .map_err(|e| CoreError::Internal(format!("episode writer task failed: {e}")))??;

        info!(
            episode_id,
            files = artifacts.artifacts.len(),
            dir = %artifacts.directory.display(),
            "episode written"
        );
        Ok(artifacts)
    }
}

struct WriteJob {
    dir: PathBuf,
    run_id: String,
    options: WriterOptions,
    mp4_available: bool,
}

impl WriteJob {
    fn run(&self, episode: &Episode) -> Result<EpisodeArtifacts, CoreError> {
        let stem = episode_stem(episode.id(), episode.started_at());
        let frames = uniform_frames(episode.frames())?;
        let (width, height) = frames
            .first()
            .map(|f| f.dimensions())
            .ok_or(CoreError::EmptyEpisode {
                episode_id: episode.id(),
            })?;

        let mut artifacts = Vec::with_capacity(4);
        artifacts.push(self.write_primary(&stem, &frames)?);

        let representative = episode.representative_index().unwrap_or(0);
        let jpegs = if self.options.write_legacy_video {
            frames
                .iter()
                .map(|f| encode_jpeg(f, self.options.jpeg_quality))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };

        if !jpegs.is_empty() {
            let path = self.dir.join(format!("{stem}.avi"));
            let file = File::create(&path).map_err(|e| write_error(&path, e))?;
            write_mjpeg_avi(
                &mut BufWriter::new(file),
                &jpegs,
                width,
                height,
                self.options.fps,
            )?;
            debug!(path = %path.display(), "avi written");
            artifacts.push(Artifact {
                kind: ArtifactKind::MjpegAvi,
                path,
            });
        }

        let still = match jpegs.get(representative) {
            Some(jpeg) => Cow::Borrowed(jpeg),
            None => {
                let source = frames.get(representative).unwrap_or(&frames[0]);
                Cow::Owned(encode_jpeg(source, self.options.jpeg_quality)?)
            }
        };
        let still_path = self.dir.join(format!("{stem}.jpg"));
        std::fs::write(&still_path, still.as_slice()).map_err(|e| write_error(&still_path, e))?;
        artifacts.push(Artifact {
            kind: ArtifactKind::StillImage,
            path: still_path,
        });

        if self.options.write_manifest {
            let path = self.dir.join(format!("{stem}.json"));
            let manifest =
                EpisodeManifest::build(episode, &self.run_id, self.options.fps, &artifacts);
            manifest.write_to(&path)?;
            artifacts.push(Artifact {
                kind: ArtifactKind::Manifest,
                path,
            });
        }

        Ok(EpisodeArtifacts {
            episode_id: episode.id(),
            directory: self.dir.clone(),
            artifacts,
        })
    }

    fn write_primary(
        &self,
        stem: &str,
        frames: &[Cow<'_, RgbaImage>],
    ) -> Result<Artifact, CoreError> {
        let fps = self.options.fps;

        if self.options.primary_video != PrimaryVideoFormat::Gif {
            let path = self.dir.join(format!("{stem}.mp4"));
            let result = if self.mp4_available {
                encode_mp4(&self.options.ffmpeg_path, frames, fps, &path)
            } else {
                Err(CoreError::Write(format!(
                    "ffmpeg ({}) is not available",
                    self.options.ffmpeg_path
                )))
            };

            match (result, self.options.primary_video) {
                (Ok(()), _) => {
                    return Ok(Artifact {
                        kind: ArtifactKind::Mp4Video,
                        path,
                    })
                }
                (Err(e), PrimaryVideoFormat::Mp4) => return Err(e),
                (Err(e), _) => {
                    if self.mp4_available {
                        warn!(error = %e, "mp4 encoding failed, writing GIF instead");
                    }
                    // ffmpeg may leave a partial file behind
                    let _ = std::fs::remove_file(&path);
                }
            }
        }

        let path = self.dir.join(format!("{stem}.gif"));
        encode_gif(frames, fps, &path)?;
        Ok(Artifact {
            kind: ArtifactKind::GifVideo,
            path,
        })
    }
}

fn write_error(path: &Path, e: std::io::Error) -> CoreError {
    CoreError::Write(format!("{}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::time::{Duration, Instant};
    use vigil_core::models::episode::CloseReason;
    use vigil_core::models::frame::Frame;
    use vigil_core::models::verdict::Verdict;

    fn gif_options() -> WriterOptions {
        WriterOptions {
            primary_video: PrimaryVideoFormat::Gif,
            ffmpeg_path: "ffmpeg".to_string(),
            fps: 1.0,
            jpeg_quality: 80,
            write_legacy_video: true,
            write_manifest: true,
        }
    }

    fn episode(frames: usize, trigger_at: usize) -> Episode {
        let t0 = Instant::now();
        let now = Utc::now();
        let mut ep = Episode::new(1, t0, now);
        for i in 0..frames {
            let frame = Frame::new(
                i as u64 + 1,
                t0 + Duration::from_secs(i as u64),
                now + chrono::Duration::seconds(i as i64),
                RgbaImage::from_pixel(16, 12, Rgba([i as u8 * 20, 0, 0, 255])),
            );
            let verdict = if i == trigger_at {
                Verdict::triggered("spark")
            } else {
                Verdict::clear()
            };
            ep.record(frame, &verdict);
        }
        ep.close(CloseReason::CooldownElapsed)
    }

    #[test]
    fn names() {
        let local = Local::now();
        let id = run_id_for(local);
        assert!(id.starts_with("run_"));
        assert_eq!(id.len(), "run_20260118_143005".len());

        let stem = episode_stem(7, Utc::now());
        assert!(stem.starts_with("episode_007_"));
    }

    #[tokio::test]
    async fn writes_all_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let writer = EpisodeFileWriter::create(root.path(), "run_test", gif_options())
            .await
            .unwrap();
        assert_eq!(writer.run_dir(), root.path().join("run_test"));

        let out = writer.write(episode(6, 0)).await.unwrap();
        assert_eq!(out.episode_id, 1);
        assert_eq!(out.artifacts.len(), 4);

        let gif = out.path_of(ArtifactKind::GifVideo).unwrap();
        let avi = out.path_of(ArtifactKind::MjpegAvi).unwrap();
        let still = out.path_of(ArtifactKind::StillImage).unwrap();
        let manifest = out.path_of(ArtifactKind::Manifest).unwrap();
        for path in [gif, avi, still, manifest] {
            assert!(path.exists(), "{} missing", path.display());
            assert!(path.starts_with(root.path().join("run_test")));
        }
        assert_eq!(out.primary_video().unwrap().kind, ArtifactKind::GifVideo);

        let still_img = image::open(still).unwrap();
        assert_eq!((still_img.width(), still_img.height()), (16, 12));

        let avi_bytes = std::fs::read(avi).unwrap();
        assert_eq!(&avi_bytes[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(avi_bytes[48..52].try_into().unwrap()), 6);

        let manifest: EpisodeManifest =
            serde_json::from_str(&std::fs::read_to_string(manifest).unwrap()).unwrap();
        assert_eq!(manifest.frame_count, 6);
        assert_eq!(manifest.run_id, "run_test");
    }

    #[tokio::test]
    async fn optional_artifacts_can_be_disabled() {
        let root = tempfile::tempdir().unwrap();
        let options = WriterOptions {
            write_legacy_video: false,
            write_manifest: false,
            ..gif_options()
        };
        let writer = EpisodeFileWriter::create(root.path(), "run_min", options)
            .await
            .unwrap();

        let out = writer.write(episode(3, 2)).await.unwrap();
        let kinds: Vec<_> = out.artifacts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ArtifactKind::GifVideo, ArtifactKind::StillImage]);
    }

    #[tokio::test]
    async fn empty_episode_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let writer = EpisodeFileWriter::create(root.path(), "run_empty", gif_options())
            .await
            .unwrap();

        let empty = Episode::new(9, Instant::now(), Utc::now());
        let err = writer.write(empty).await.unwrap_err();
        assert!(matches!(err, CoreError::EmptyEpisode { episode_id: 9 }));
        let entries = std::fs::read_dir(writer.run_dir()).unwrap().count();
        assert_eq!(entries, 0);
    }

    #[tokio::test]
    async fn auto_falls_back_to_gif_without_ffmpeg() {
        let root = tempfile::tempdir().unwrap();
        let options = WriterOptions {
            primary_video: PrimaryVideoFormat::Auto,
            ffmpeg_path: "/nonexistent/vigil-ffmpeg".to_string(),
            ..gif_options()
        };
        let writer = EpisodeFileWriter::create(root.path(), "run_auto", options)
            .await
            .unwrap();

        let out = writer.write(episode(2, 0)).await.unwrap();
        assert_eq!(out.primary_video().unwrap().kind, ArtifactKind::GifVideo);
        assert!(out.path_of(ArtifactKind::Mp4Video).is_none());
    }

    #[tokio::test]
    async fn mp4_only_fails_without_ffmpeg() {
        let root = tempfile::tempdir().unwrap();
        let options = WriterOptions {
            primary_video: PrimaryVideoFormat::Mp4,
            ffmpeg_path: "/nonexistent/vigil-ffmpeg".to_string(),
            ..gif_options()
        };
        let writer = EpisodeFileWriter::create(root.path(), "run_mp4", options)
            .await
            .unwrap();

        let err = writer.write(episode(2, 0)).await.unwrap_err();
        assert!(matches!(err, CoreError::Write(_)));
    }

    #[tokio::test]
    async fn unwritable_root_fails_create() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let err = EpisodeFileWriter::create(&blocker, "run", gif_options())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::Write(_)));
    }
}
