//! End-to-end monitoring sessions with a scripted screen and oracle.
//!
//! Ticks are one second apart on a paused clock; tick `n` captures frame
//! `seq = n`. Episodes are written by the real file writer (GIF primary).

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use vigil_core::config::PrimaryVideoFormat;
use vigil_core::error::CoreError;
use vigil_core::models::episode::CloseReason;
use vigil_core::models::region::Region;
use vigil_core::models::session::SessionSummary;
use vigil_core::models::verdict::{TriggerDescription, Verdict};
use vigil_core::ports::frame_source::FrameSource;
use vigil_core::ports::oracle::{ClassificationRequest, TriggerOracle};
use vigil_network::classifier::{ClassifierPolicy, TriggerClassifier};
use vigil_recorder::controller::RecordingController;
use vigil_recorder::monitor_loop::{LoopConfig, MonitorLoop};
use vigil_storage::episode_writer::{EpisodeFileWriter, WriterOptions};
use vigil_storage::manifest::EpisodeManifest;
use vigil_vision::sampler::{FrameSampler, SamplerConfig};

const COOLDOWN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
enum Answer {
    Yes,
    No,
    Hang,
    Unavailable,
}

/// 800x600 region source; asks for shutdown once `stop_after` frames exist.
struct ScriptedScreen {
    tick: Arc<AtomicU64>,
    stop_after: u64,
    shutdown: watch::Sender<bool>,
}

#[async_trait]
impl FrameSource for ScriptedScreen {
    async fn capture(&self, region: &Region) -> Result<RgbaImage, CoreError> {
        let n = self.tick.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= self.stop_after {
            let _ = self.shutdown.send(true);
        }
        let shade = (n * 10 % 250) as u8;
        Ok(RgbaImage::from_pixel(
            region.width,
            region.height,
            Rgba([shade, 0, 0, 255]),
        ))
    }

    async fn screen_bounds(&self) -> Result<(u32, u32), CoreError> {
        Ok((1920, 1080))
    }
}

/// Answers according to the current tick.
struct ScriptedOracle {
    tick: Arc<AtomicU64>,
    script: fn(u64) -> Answer,
}

#[async_trait]
impl TriggerOracle for ScriptedOracle {
    async fn evaluate(&self, request: &ClassificationRequest) -> Result<Verdict, CoreError> {
        assert_eq!(request.description.as_str(), "loud crashing noises");
        match (self.script)(self.tick.load(Ordering::SeqCst)) {
            Answer::Yes => Ok(Verdict::triggered("shelves falling").with_confidence(0.9)),
            Answer::No => Ok(Verdict::clear()),
            Answer::Hang => std::future::pending().await,
            Answer::Unavailable => Err(CoreError::ServiceUnavailable("503".to_string())),
        }
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

struct Session {
    summary: SessionSummary,
    run_dir: PathBuf,
    _root: tempfile::TempDir,
}

async fn run_session(ticks: u64, lookback: usize, script: fn(u64) -> Answer) -> Session {
    let root = tempfile::tempdir().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tick = Arc::new(AtomicU64::new(0));

    let screen = Arc::new(ScriptedScreen {
        tick: tick.clone(),
        stop_after: ticks,
        shutdown: shutdown_tx,
    });
    let oracle = Arc::new(ScriptedOracle { tick, script });

    let sampler = FrameSampler::new(
        screen,
        SamplerConfig {
            region: Region::new(0, 0, 800, 600).unwrap(),
            interval: Duration::from_secs(1),
            max_frame_edge: 64,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(1),
        },
    );
    let classifier = TriggerClassifier::new(
        oracle,
        ClassifierPolicy {
            timeout: Duration::from_millis(200),
            retry_delay: Duration::from_millis(50),
            analysis_interval: Duration::ZERO,
            batch_size: 1,
            confidence_threshold: None,
            jpeg_quality: 60,
            rate_limit_backoff: Duration::from_secs(30),
        },
    );
    let writer = EpisodeFileWriter::create(
        root.path(),
        "run_test",
        WriterOptions {
            primary_video: PrimaryVideoFormat::Gif,
            ffmpeg_path: "ffmpeg".to_string(),
            fps: 1.0,
            jpeg_quality: 80,
            write_legacy_video: true,
            write_manifest: true,
        },
    )
    .await
    .unwrap();
    let run_dir = writer.run_dir().to_path_buf();

    let monitor = MonitorLoop::new(
        sampler,
        classifier,
        RecordingController::new(COOLDOWN, lookback),
        Arc::new(writer),
        TriggerDescription::new("loud crashing noises").unwrap(),
        LoopConfig {
            max_consecutive_failures: 5,
            stall_threshold: Duration::from_secs(30),
            status_interval: Duration::from_secs(60),
            writer_queue_capacity: 2,
        },
    );

    let summary = monitor.run(shutdown_rx).await.unwrap();
    Session {
        summary,
        run_dir,
        _root: root,
    }
}

fn files_with_ext(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == ext))
        .collect();
    files.sort();
    files
}

fn manifests(dir: &Path) -> Vec<EpisodeManifest> {
    files_with_ext(dir, "json")
        .iter()
        .map(|p| serde_json::from_str(&std::fs::read_to_string(p).unwrap()).unwrap())
        .collect()
}

fn trigger_on_4(tick: u64) -> Answer {
    if tick == 4 {
        Answer::Yes
    } else {
        Answer::No
    }
}

#[tokio::test(start_paused = true)]
async fn single_trigger_records_six_frames() {
    let session = run_session(12, 0, trigger_on_4).await;

    assert_eq!(session.summary.frames_sampled, 12);
    assert_eq!(session.summary.triggers, 1);
    assert_eq!(session.summary.episodes_written, 1);

    let manifests = manifests(&session.run_dir);
    assert_eq!(manifests.len(), 1);
    let m = &manifests[0];
    assert_eq!(m.frame_count, 6);
    assert_eq!(m.lookback_frames, 0);
    assert_eq!(m.triggers.len(), 1);
    assert_eq!(m.triggers[0].frame_seq, 4);
    assert_eq!(m.representative_frame, 0);
    assert_eq!(m.close_reason, Some(CloseReason::CooldownElapsed));
    assert!((m.duration_secs - 5.0).abs() < 1e-6);

    assert_eq!(files_with_ext(&session.run_dir, "gif").len(), 1);
    assert_eq!(files_with_ext(&session.run_dir, "avi").len(), 1);
    assert_eq!(files_with_ext(&session.run_dir, "jpg").len(), 1);
    let still = image::open(&files_with_ext(&session.run_dir, "jpg")[0]).unwrap();
    assert_eq!((still.width(), still.height()), (64, 48));
}

#[tokio::test(start_paused = true)]
async fn lookback_adds_pre_trigger_frames() {
    let session = run_session(12, 2, trigger_on_4).await;

    let manifests = manifests(&session.run_dir);
    assert_eq!(manifests.len(), 1);
    assert_eq!(manifests[0].frame_count, 8);
    assert_eq!(manifests[0].lookback_frames, 2);
    assert_eq!(manifests[0].triggers[0].frame_index, 2);
}

#[tokio::test(start_paused = true)]
async fn oracle_timeout_counts_as_no_trigger() {
    fn script(tick: u64) -> Answer {
        match tick {
            4 => Answer::Hang,
            6 => Answer::Yes,
            _ => Answer::No,
        }
    }
    let session = run_session(14, 0, script).await;

    assert_eq!(session.summary.frames_sampled, 14);
    assert_eq!(session.summary.classification_failures, 1);
    assert_eq!(session.summary.triggers, 1);

    let manifests = manifests(&session.run_dir);
    assert_eq!(manifests.len(), 1);
    assert_eq!(manifests[0].triggers[0].frame_seq, 6);
    assert_eq!(manifests[0].frame_count, 6);
}

#[tokio::test(start_paused = true)]
async fn no_trigger_writes_nothing() {
    let session = run_session(10, 2, |_| Answer::No).await;

    assert_eq!(session.summary.episodes_opened, 0);
    assert_eq!(std::fs::read_dir(&session.run_dir).unwrap().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_while_recording_flushes_one_episode() {
    let session = run_session(6, 0, trigger_on_4).await;

    assert_eq!(session.summary.episodes_opened, 1);
    assert_eq!(session.summary.episodes_written, 1);
    let manifests = manifests(&session.run_dir);
    assert_eq!(manifests.len(), 1);
    assert_eq!(manifests[0].frame_count, 3);
    assert_eq!(manifests[0].close_reason, Some(CloseReason::Shutdown));
}

#[tokio::test(start_paused = true)]
async fn repeated_triggers_keep_one_episode_open() {
    fn script(tick: u64) -> Answer {
        if (3..=15).step_by(3).any(|t| t == tick) {
            Answer::Yes
        } else {
            Answer::No
        }
    }
    let session = run_session(25, 0, script).await;

    let manifests = manifests(&session.run_dir);
    assert_eq!(manifests.len(), 1);
    // ticks 3..=20: cooldown runs out five ticks after the trigger at 15
    assert_eq!(manifests[0].frame_count, 18);
    assert_eq!(manifests[0].triggers.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn unavailable_oracle_never_stops_the_loop() {
    let session = run_session(8, 0, |_| Answer::Unavailable).await;

    assert_eq!(session.summary.frames_sampled, 8);
    assert_eq!(session.summary.classification_failures, 8);
    assert_eq!(session.summary.episodes_opened, 0);
}
