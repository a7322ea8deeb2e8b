//! Monitor loop.
//!
//! One sampling tick = capture, classify, feed the controller, hand any
//! closed episode to the writer task. The loop ends on shutdown (flushing the
//! active episode) or when capture stalls.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use vigil_core::config::AppConfig;
use vigil_core::error::CoreError;
use vigil_core::models::episode::{CloseReason, Episode, RecordingState};
use vigil_core::models::session::SessionSummary;
use vigil_core::models::verdict::TriggerDescription;
use vigil_core::ports::episode_sink::EpisodeSink;
use vigil_core::ports::preview::PreviewSink;
use vigil_core::throttle::WarnThrottle;
use vigil_network::classifier::{SignalSource, TriggerClassifier};
use vigil_vision::sampler::FrameSampler;

use crate::controller::RecordingController;

/// Window of the "capture failed" warning
const CAPTURE_WARN_WINDOW: Duration = Duration::from_secs(10);

/// Loop limits
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Consecutive capture failures that end the session
    pub max_consecutive_failures: u32,
    /// Capture time without a frame that ends the session, on top of the
    /// sampling interval and the capture backoff
    pub stall_threshold: Duration,
    /// Period of the status log line (zero disables it)
    pub status_interval: Duration,
    /// Closed episodes that may wait for the writer
    pub writer_queue_capacity: usize,
}

impl LoopConfig {
    /// Loop limits from the capture, logging and recording sections.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_consecutive_failures: config.capture.max_consecutive_failures,
            stall_threshold: config.capture.stall_threshold(),
            status_interval: Duration::from_secs(config.logging.status_interval_secs),
            writer_queue_capacity: config.recording.writer_queue_capacity,
        }
    }
}

/// Writer task outcome
#[derive(Debug, Default, Clone, Copy)]
struct WriterTally {
    written: u64,
    failed: u64,
}

pub struct MonitorLoop {
    sampler: FrameSampler,
    classifier: TriggerClassifier,
    controller: RecordingController,
    sink: Arc<dyn EpisodeSink>,
    preview: Option<Arc<dyn PreviewSink>>,
    description: TriggerDescription,
    config: LoopConfig,
}

impl MonitorLoop {
    pub fn new(
        sampler: FrameSampler,
        classifier: TriggerClassifier,
        controller: RecordingController,
        sink: Arc<dyn EpisodeSink>,
        description: TriggerDescription,
        config: LoopConfig,
    ) -> Self {
        Self {
            sampler,
            classifier,
            controller,
            sink,
            preview: None,
            description,
            config,
        }
    }

    /// Publishes every sampled frame to `preview`.
    pub fn with_preview(mut self, preview: Arc<dyn PreviewSink>) -> Self {
        self.preview = Some(preview);
        self
    }

    /// Runs until `shutdown` turns `true` (or its sender is dropped).
    ///
    /// On exit the active episode is flushed and every queued episode is
    /// written before this returns. Fails with [`CoreError::CaptureStalled`]
    /// when no frame could be captured for too long.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<SessionSummary, CoreError> {
        let started = Instant::now();
        let (tx, rx) = mpsc::channel(self.config.writer_queue_capacity.max(1));
        let writer = spawn_writer(self.sink.clone(), rx);

        let mut summary = SessionSummary::default();
        let capture_warn = WarnThrottle::new(CAPTURE_WARN_WINDOW);
        let mut last_status = started;

        info!(
            region = %self.sampler.region(),
            interval_ms = self.sampler.interval().as_millis() as u64,
            cooldown_secs = self.controller.cooldown().as_secs(),
            oracle = self.classifier.oracle_name(),
            description = %self.description,
            "monitoring started"
        );

        let outcome: Result<(), CoreError> = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            let captured = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break Ok(());
                    }
                    continue;
                }
                result = tokio::time::timeout(
                    self.stall_budget(),
                    self.sampler.next_frame(),
                ) => result,
            };

            match captured {
                Err(_) => {
                    break Err(self.stalled(started));
                }
                Ok(Err(e)) => {
                    summary.capture_failures += 1;
                    if e.is_fatal() {
                        error!(error = %e, "capture cannot continue");
                        break Err(e);
                    }
                    if let Some(suppressed) = capture_warn.check() {
                        warn!(
                            error = %e,
                            failures = self.sampler.consecutive_failures(),
                            suppressed,
                            "capture failed"
                        );
                    }
                    if self.sampler.consecutive_failures() >= self.config.max_consecutive_failures
                        || self.since_last_frame(started) >= self.stall_budget()
                    {
                        break Err(self.stalled(started));
                    }
                    if let Some(episode) = self.controller.poll(Instant::now().into_std()) {
                        dispatch(&tx, episode, &mut summary).await;
                    }
                }
                Ok(Ok(frame)) => {
                    summary.frames_sampled += 1;

                    let signal = self.classifier.signal(&frame, &self.description).await;
                    match signal.source {
                        SignalSource::Classified => summary.frames_classified += 1,
                        SignalSource::Failed => summary.classification_failures += 1,
                        SignalSource::Skipped => {}
                    }
                    if signal.verdict.triggered {
                        summary.triggers += 1;
                    }

                    if let Some(preview) = &self.preview {
                        let state = if signal.verdict.triggered {
                            RecordingState::Active
                        } else {
                            self.controller.state()
                        };
                        preview.publish(&frame, state);
                    }

                    if let Some(episode) = self.controller.observe(frame, &signal.verdict) {
                        dispatch(&tx, episode, &mut summary).await;
                    }
                }
            }

            if !self.config.status_interval.is_zero()
                && last_status.elapsed() >= self.config.status_interval
            {
                last_status = Instant::now();
                self.log_status(&summary);
            }
        };

        let reason = if outcome.is_ok() {
            CloseReason::Shutdown
        } else {
            CloseReason::Fatal
        };
        if let Some(episode) = self.controller.flush(reason) {
            dispatch(&tx, episode, &mut summary).await;
        }
        drop(tx);

        match writer.await {
            Ok(tally) => {
                summary.episodes_written = tally.written;
                summary.write_failures += tally.failed;
            }
            Err(e) => error!(error = %e, "episode writer task failed"),
        }

        summary.episodes_opened = self.controller.episodes_opened();
        summary.duration = started.elapsed();
        info!(
            frames = summary.frames_sampled,
            classified = summary.frames_classified,
            triggers = summary.triggers,
            episodes = summary.episodes_written,
            write_failures = summary.write_failures,
            capture_failures = summary.capture_failures,
            duration_secs = summary.duration.as_secs(),
            "monitoring stopped"
        );

        outcome.map(|()| summary)
    }

    /// Longest healthy gap between two frames.
    fn stall_budget(&self) -> Duration {
        self.config.stall_threshold + self.sampler.interval() + self.sampler.backoff_max()
    }

    fn since_last_frame(&self, started: Instant) -> Duration {
        self.sampler.last_success().unwrap_or(started).elapsed()
    }

    fn stalled(&self, started: Instant) -> CoreError {
        let secs = self.since_last_frame(started).as_secs();
        let failures = self.sampler.consecutive_failures();
        error!(secs, failures, "capture stalled");
        CoreError::CaptureStalled { secs, failures }
    }

    fn log_status(&self, summary: &SessionSummary) {
        let stats = self.classifier.stats();
        info!(
            state = %self.controller.state(),
            frames = summary.frames_sampled,
            oracle_calls = stats.calls,
            triggers = summary.triggers,
            episodes = self.controller.episodes_opened(),
            backing_off = self.classifier.is_backing_off(),
            "status"
        );
    }
}

async fn dispatch(tx: &mpsc::Sender<Episode>, episode: Episode, summary: &mut SessionSummary) {
    let episode_id = episode.id();
    if tx.send(episode).await.is_err() {
        summary.write_failures += 1;
        error!(episode_id, "episode writer is gone, episode dropped");
    } else {
        debug!(episode_id, "episode queued for writing");
    }
}

fn spawn_writer(sink: Arc<dyn EpisodeSink>, mut rx: mpsc::Receiver<Episode>) -> JoinHandle<WriterTally> {
    tokio::spawn(async move {
        let mut tally = WriterTally::default();
        while let Some(episode) = rx.recv().await {
            let episode_id = episode.id();
            let frames = episode.frame_count();
            match sink.write(episode).await {
                Ok(artifacts) => {
                    tally.written += 1;
                    info!(
                        episode_id,
                        frames,
                        video = ?artifacts.primary_video().map(|a| &a.path),
                        "episode saved"
                    );
                }
                Err(e) => {
                    tally.failed += 1;
                    error!(episode_id, error = %e, "failed to save episode");
                }
            }
        }
        tally
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use vigil_core::models::region::Region;
    use vigil_core::models::verdict::Verdict;
    use vigil_core::ports::episode_sink::EpisodeArtifacts;
    use vigil_core::ports::frame_source::FrameSource;
    use vigil_core::ports::oracle::{ClassificationRequest, TriggerOracle};
    use vigil_network::classifier::ClassifierPolicy;
    use vigil_vision::sampler::SamplerConfig;

    /// Solid frames; requests shutdown after `stop_after` captures.
    struct CountingSource {
        tick: Arc<AtomicU64>,
        stop_after: u64,
        shutdown: watch::Sender<bool>,
    }

    #[async_trait]
    impl FrameSource for CountingSource {
        async fn capture(&self, _region: &Region) -> Result<RgbaImage, CoreError> {
            let n = self.tick.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.stop_after {
                let _ = self.shutdown.send(true);
            }
            Ok(RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255])))
        }

        async fn screen_bounds(&self) -> Result<(u32, u32), CoreError> {
            Ok((100, 100))
        }
    }

    struct BrokenSource;

    /// Never finishes a capture.
    struct FrozenSource;

    #[async_trait]
    impl FrameSource for FrozenSource {
        async fn capture(&self, _region: &Region) -> Result<RgbaImage, CoreError> {
            std::future::pending().await
        }

        async fn screen_bounds(&self) -> Result<(u32, u32), CoreError> {
            Ok((100, 100))
        }
    }

    #[async_trait]
    impl FrameSource for BrokenSource {
        async fn capture(&self, _region: &Region) -> Result<RgbaImage, CoreError> {
            Err(CoreError::Capture("display gone".to_string()))
        }

        async fn screen_bounds(&self) -> Result<(u32, u32), CoreError> {
            Ok((100, 100))
        }
    }

    /// Triggers on the listed ticks.
    struct TickOracle {
        tick: Arc<AtomicU64>,
        triggers: Vec<u64>,
    }

    #[async_trait]
    impl TriggerOracle for TickOracle {
        async fn evaluate(&self, _request: &ClassificationRequest) -> Result<Verdict, CoreError> {
            let n = self.tick.load(Ordering::SeqCst);
            Ok(if self.triggers.contains(&n) {
                Verdict::triggered("seen")
            } else {
                Verdict::clear()
            })
        }

        fn provider_name(&self) -> &str {
            "tick"
        }
    }

    #[derive(Default)]
    struct MemorySink {
        episodes: Mutex<Vec<(Vec<u64>, Option<CloseReason>)>>,
    }

    #[async_trait]
    impl EpisodeSink for MemorySink {
        async fn write(&self, episode: Episode) -> Result<EpisodeArtifacts, CoreError> {
            let seqs = episode.frames().iter().map(|f| f.seq).collect();
            self.episodes.lock().push((seqs, episode.close_reason()));
            Ok(EpisodeArtifacts {
                episode_id: episode.id(),
                directory: "mem".into(),
                artifacts: Vec::new(),
            })
        }
    }

    /// Fails the first write, then behaves like `MemorySink`.
    #[derive(Default)]
    struct FailFirstSink {
        failed: AtomicBool,
        inner: MemorySink,
    }

    #[async_trait]
    impl EpisodeSink for FailFirstSink {
        async fn write(&self, episode: Episode) -> Result<EpisodeArtifacts, CoreError> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(CoreError::Write("disk full".to_string()));
            }
            self.inner.write(episode).await
        }
    }

    fn sampler(source: Arc<dyn FrameSource>) -> FrameSampler {
        sampler_every(source, Duration::from_secs(1))
    }

    fn sampler_every(source: Arc<dyn FrameSource>, interval: Duration) -> FrameSampler {
        FrameSampler::new(
            source,
            SamplerConfig {
                region: Region::new(0, 0, 8, 8).unwrap(),
                interval,
                max_frame_edge: 64,
                backoff_base: Duration::from_millis(100),
                backoff_max: Duration::from_millis(400),
            },
        )
    }

    fn policy() -> ClassifierPolicy {
        ClassifierPolicy {
            timeout: Duration::from_millis(200),
            retry_delay: Duration::from_millis(50),
            analysis_interval: Duration::ZERO,
            batch_size: 1,
            confidence_threshold: None,
            jpeg_quality: 70,
            rate_limit_backoff: Duration::from_secs(30),
        }
    }

    fn loop_config() -> LoopConfig {
        LoopConfig {
            max_consecutive_failures: 3,
            stall_threshold: Duration::from_secs(30),
            status_interval: Duration::ZERO,
            writer_queue_capacity: 2,
        }
    }

    fn build(
        ticks: u64,
        triggers: Vec<u64>,
        sink: Arc<dyn EpisodeSink>,
    ) -> (MonitorLoop, watch::Receiver<bool>) {
        build_every(ticks, triggers, sink, Duration::from_secs(1))
    }

    fn build_every(
        ticks: u64,
        triggers: Vec<u64>,
        sink: Arc<dyn EpisodeSink>,
        interval: Duration,
    ) -> (MonitorLoop, watch::Receiver<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tick = Arc::new(AtomicU64::new(0));
        let source = Arc::new(CountingSource {
            tick: tick.clone(),
            stop_after: ticks,
            shutdown: shutdown_tx,
        });
        let oracle = Arc::new(TickOracle { tick, triggers });
        let monitor = MonitorLoop::new(
            sampler_every(source, interval),
            TriggerClassifier::new(oracle, policy()),
            RecordingController::new(Duration::from_secs(5), 0),
            sink,
            TriggerDescription::new("a red light").unwrap(),
            loop_config(),
        );
        (monitor, shutdown_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn closed_episode_reaches_sink() {
        let sink = Arc::new(MemorySink::default());
        let (monitor, shutdown) = build(12, vec![4], sink.clone());

        let summary = monitor.run(shutdown).await.unwrap();

        assert_eq!(summary.frames_sampled, 12);
        assert_eq!(summary.frames_classified, 12);
        assert_eq!(summary.triggers, 1);
        assert_eq!(summary.episodes_opened, 1);
        assert_eq!(summary.episodes_written, 1);
        let episodes = sink.episodes.lock();
        assert_eq!(
            episodes.as_slice(),
            &[(vec![4, 5, 6, 7, 8, 9], Some(CloseReason::CooldownElapsed))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_active_episode() {
        let sink = Arc::new(MemorySink::default());
        let (monitor, shutdown) = build(6, vec![4], sink.clone());

        let summary = monitor.run(shutdown).await.unwrap();

        assert_eq!(summary.episodes_written, 1);
        let episodes = sink.episodes.lock();
        assert_eq!(
            episodes.as_slice(),
            &[(vec![4, 5, 6], Some(CloseReason::Shutdown))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_capture_failures_stall() {
        let (_tx, shutdown) = watch::channel(false);
        let oracle = Arc::new(TickOracle {
            tick: Arc::new(AtomicU64::new(0)),
            triggers: Vec::new(),
        });
        let sink = Arc::new(MemorySink::default());
        let monitor = MonitorLoop::new(
            sampler(Arc::new(BrokenSource)),
            TriggerClassifier::new(oracle, policy()),
            RecordingController::new(Duration::from_secs(5), 0),
            sink.clone(),
            TriggerDescription::new("anything").unwrap(),
            loop_config(),
        );

        let err = monitor.run(shutdown).await.unwrap_err();
        assert!(matches!(err, CoreError::CaptureStalled { failures: 3, .. }));
        assert!(sink.episodes.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_longer_than_stall_threshold_is_healthy() {
        let sink = Arc::new(MemorySink::default());
        let (monitor, shutdown) = build_every(5, vec![], sink.clone(), Duration::from_secs(60));

        let summary = monitor.run(shutdown).await.unwrap();

        assert_eq!(summary.frames_sampled, 5);
        assert_eq!(summary.capture_failures, 0);
        assert!(summary.duration >= Duration::from_secs(240));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_capture_stalls() {
        let (_tx, shutdown) = watch::channel(false);
        let oracle = Arc::new(TickOracle {
            tick: Arc::new(AtomicU64::new(0)),
            triggers: Vec::new(),
        });
        let monitor = MonitorLoop::new(
            sampler(Arc::new(FrozenSource)),
            TriggerClassifier::new(oracle, policy()),
            RecordingController::new(Duration::from_secs(5), 0),
            Arc::new(MemorySink::default()),
            TriggerDescription::new("anything").unwrap(),
            loop_config(),
        );

        let started = Instant::now();
        let err = monitor.run(shutdown).await.unwrap_err();

        assert!(matches!(err, CoreError::CaptureStalled { failures: 0, .. }));
        // 30 s threshold + 1 s interval + 400 ms backoff cap
        assert!(started.elapsed() >= Duration::from_millis(31_400));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_is_counted_and_loop_continues() {
        let sink = Arc::new(FailFirstSink::default());
        let (monitor, shutdown) = build(20, vec![2, 10], sink.clone());

        let summary = monitor.run(shutdown).await.unwrap();

        assert_eq!(summary.frames_sampled, 20);
        assert_eq!(summary.episodes_opened, 2);
        assert_eq!(summary.episodes_written, 1);
        assert_eq!(summary.write_failures, 1);
        let episodes = sink.inner.episodes.lock();
        assert_eq!(
            episodes.as_slice(),
            &[(vec![10, 11, 12, 13, 14, 15], Some(CloseReason::CooldownElapsed))]
        );
    }
}
