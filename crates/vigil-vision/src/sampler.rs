//! Tick-driven frame sampler.
//!
//! Pulls one image of the configured region per sampling tick, downscales it
//! and stamps it with a monotonic timestamp. After a failed capture the next
//! attempt is delayed by an exponential backoff.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace};
use vigil_core::config::CaptureConfig;
use vigil_core::error::CoreError;
use vigil_core::models::frame::Frame;
use vigil_core::models::region::Region;
use vigil_core::ports::frame_source::FrameSource;

use crate::resize::limit_edge;

/// Sampler settings
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub region: Region,
    pub interval: Duration,
    pub max_frame_edge: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl SamplerConfig {
    /// Builds sampler settings; the region must be configured.
    pub fn from_capture(config: &CaptureConfig) -> Result<Self, CoreError> {
        let region = config
            .region
            .ok_or_else(|| CoreError::validation("capture.region", "no region configured"))?;
        Ok(Self {
            region,
            interval: config.sampling_interval(),
            max_frame_edge: config.max_frame_edge,
            backoff_base: config.backoff_base(),
            backoff_max: config.backoff_max(),
        })
    }
}

/// Frame sampler
pub struct FrameSampler {
    source: Arc<dyn FrameSource>,
    config: SamplerConfig,
    ticker: Option<Interval>,
    last_seq: u64,
    consecutive_failures: u32,
    last_success: Option<Instant>,
}

impl FrameSampler {
    pub fn new(source: Arc<dyn FrameSource>, config: SamplerConfig) -> Self {
        Self {
            source,
            config,
            ticker: None,
            last_seq: 0,
            consecutive_failures: 0,
            last_success: None,
        }
    }

    /// Waits for the next tick and captures one frame.
    ///
    /// The first call returns immediately; later calls follow the sampling
    /// interval. Missed ticks are delayed, not replayed in a burst.
    pub async fn next_frame(&mut self) -> Result<Frame, CoreError> {
        let period = self.config.interval;
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        ticker.tick().await;

        let backoff = self.backoff_delay();
        if !backoff.is_zero() {
            trace!(backoff_ms = backoff.as_millis() as u64, "capture backoff");
            tokio::time::sleep(backoff).await;
        }

        let captured = self.source.capture(&self.config.region).await.and_then(|image| {
            limit_edge(image, self.config.max_frame_edge)
                .map_err(|e| CoreError::Capture(format!("failed to downscale frame: {e}")))
        });

        match captured {
            Ok(image) => {
                let now = Instant::now();
                if self.consecutive_failures > 0 {
                    debug!(
                        failures = self.consecutive_failures,
                        "capture recovered"
                    );
                }
                self.consecutive_failures = 0;
                self.last_success = Some(now);
                self.last_seq += 1;
                Ok(Frame::new(self.last_seq, now.into_std(), Utc::now(), image))
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                Err(match e {
                    CoreError::Capture(_) | CoreError::Config(_) | CoreError::Validation { .. } => e,
                    other => CoreError::Capture(other.to_string()),
                })
            }
        }
    }

    /// Delay applied before the next capture attempt:
    /// `backoff_base * 2^(failures - 1)`, capped at `backoff_max`.
    pub fn backoff_delay(&self) -> Duration {
        if self.consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let exponent = (self.consecutive_failures - 1).min(16);
        self.config
            .backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.config.backoff_max)
    }

    /// Failed captures since the last frame.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Time of the last successful capture.
    pub fn last_success(&self) -> Option<Instant> {
        self.last_success
    }

    /// Region being sampled.
    pub fn region(&self) -> &Region {
        &self.config.region
    }

    /// Sampling period.
    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Longest delay [`Self::backoff_delay`] can return.
    pub fn backoff_max(&self) -> Duration {
        self.config.backoff_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `fail_first` captures, then returns a solid image.
    struct FlakySource {
        fail_first: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl FrameSource for FlakySource {
        async fn capture(&self, region: &Region) -> Result<RgbaImage, CoreError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(CoreError::Capture("display busy".into()));
            }
            Ok(RgbaImage::from_pixel(region.width, region.height, Rgba([9, 9, 9, 255])))
        }

        async fn screen_bounds(&self) -> Result<(u32, u32), CoreError> {
            Ok((1920, 1080))
        }
    }

    fn config(region: Region) -> SamplerConfig {
        SamplerConfig {
            region,
            interval: Duration::from_secs(1),
            max_frame_edge: 400,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_millis(350),
        }
    }

    fn sampler(fail_first: u32) -> FrameSampler {
        let source = Arc::new(FlakySource {
            fail_first,
            calls: AtomicU32::new(0),
        });
        FrameSampler::new(source, config(Region::new(0, 0, 800, 600).unwrap()))
    }

    #[tokio::test(start_paused = true)]
    async fn frames_follow_interval() {
        let mut sampler = sampler(0);
        let first = sampler.next_frame().await.unwrap();
        let second = sampler.next_frame().await.unwrap();
        let third = sampler.next_frame().await.unwrap();

        assert_eq!((first.seq, second.seq, third.seq), (1, 2, 3));
        assert_eq!(second.timestamp - first.timestamp, Duration::from_secs(1));
        assert_eq!(third.timestamp - second.timestamp, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_downscaled() {
        let mut sampler = sampler(0);
        let frame = sampler.next_frame().await.unwrap();
        assert_eq!((frame.width(), frame.height()), (400, 300));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_count_and_reset() {
        let mut sampler = sampler(2);
        assert!(matches!(sampler.next_frame().await, Err(CoreError::Capture(_))));
        assert_eq!(sampler.consecutive_failures(), 1);
        assert!(sampler.next_frame().await.is_err());
        assert_eq!(sampler.consecutive_failures(), 2);

        let frame = sampler.next_frame().await.unwrap();
        assert_eq!(frame.seq, 1);
        assert_eq!(sampler.consecutive_failures(), 0);
        assert!(sampler.last_success().is_some());
    }

    #[test]
    fn backoff_is_bounded() {
        let mut sampler = sampler(0);
        assert_eq!(sampler.backoff_delay(), Duration::ZERO);
        sampler.consecutive_failures = 1;
        assert_eq!(sampler.backoff_delay(), Duration::from_millis(100));
        sampler.consecutive_failures = 2;
        assert_eq!(sampler.backoff_delay(), Duration::from_millis(200));
        sampler.consecutive_failures = 3;
        assert_eq!(sampler.backoff_delay(), Duration::from_millis(350));
        sampler.consecutive_failures = 40;
        assert_eq!(sampler.backoff_delay(), Duration::from_millis(350));
    }

    #[test]
    fn config_requires_region() {
        let capture = CaptureConfig::default();
        assert!(SamplerConfig::from_capture(&capture).is_err());

        let capture = CaptureConfig {
            region: Some(Region::new(0, 0, 10, 10).unwrap()),
            ..Default::default()
        };
        let cfg = SamplerConfig::from_capture(&capture).unwrap();
        assert_eq!(cfg.interval, Duration::from_secs(1));
    }
}
