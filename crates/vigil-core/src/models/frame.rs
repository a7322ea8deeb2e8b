//! Sampled frame.

use chrono::{DateTime, Utc};
use image::RgbaImage;
use std::fmt;
use std::time::Instant;

/// One image of the monitored region, captured at a single sampling tick.
///
/// A frame has exactly one owner at a time (lookback buffer, active episode or
/// writer) and is never mutated after capture.
pub struct Frame {
    /// Monotonic sequence number within the session, starting at 1
    pub seq: u64,
    /// Monotonic capture time, used for cooldown arithmetic
    pub timestamp: Instant,
    /// Wall-clock capture time, used for file names and manifests
    pub captured_at: DateTime<Utc>,
    /// RGBA pixels of the region (possibly downscaled)
    pub image: RgbaImage,
}

impl Frame {
    /// Wraps a captured image.
    pub fn new(seq: u64, timestamp: Instant, captured_at: DateTime<Utc>, image: RgbaImage) -> Self {
        Self {
            seq,
            timestamp,
            captured_at,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

// Pixel buffers stay out of Debug output.
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("seq", &self.seq)
            .field("captured_at", &self.captured_at)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .finish()
    }
}
