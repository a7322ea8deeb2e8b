//! Episodes: contiguous trigger-to-cooldown recordings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use super::frame::Frame;
use super::verdict::Verdict;

/// Recording controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    Active,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingState::Idle => f.write_str("idle"),
            RecordingState::Active => f.write_str("active"),
        }
    }
}

/// Why an episode was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// No positive verdict for a full cooldown period
    CooldownElapsed,
    /// Graceful shutdown flushed the active episode
    Shutdown,
    /// The loop hit an unrecoverable error and flushed what it had
    Fatal,
}

/// A positive verdict recorded inside an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerNote {
    /// Index of the triggering frame within the episode
    pub frame_index: usize,
    /// Session sequence number of the triggering frame
    pub frame_seq: u64,
    pub captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One recording episode.
///
/// Opened when a trigger moves the controller from idle to active, extended
/// on every tick while active, and moved out of the controller by value when
/// it closes. Frames are kept in capture order.
pub struct Episode {
    id: u64,
    start_time: Instant,
    started_at: DateTime<Utc>,
    last_trigger_time: Instant,
    frames: Vec<Frame>,
    lookback_len: usize,
    triggers: Vec<TriggerNote>,
    close_reason: Option<CloseReason>,
}

impl Episode {
    /// Creates an empty episode opened at `start_time`.
    pub fn new(id: u64, start_time: Instant, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            start_time,
            started_at,
            last_trigger_time: start_time,
            frames: Vec::new(),
            lookback_len: 0,
            triggers: Vec::new(),
            close_reason: None,
        }
    }

    /// Prepends pre-trigger context. Only valid before any frame is recorded.
    pub fn seed_lookback(&mut self, frames: Vec<Frame>) {
        debug_assert!(self.frames.is_empty(), "lookback seeded after recording");
        self.lookback_len = frames.len();
        self.frames = frames;
    }

    /// Appends a frame; a positive verdict refreshes `last_trigger_time`.
    pub fn record(&mut self, frame: Frame, verdict: &Verdict) {
        debug_assert!(
            self.frames
                .last()
                .map_or(true, |last| last.timestamp <= frame.timestamp),
            "frames must be appended in capture order"
        );

        if verdict.triggered {
            if frame.timestamp > self.last_trigger_time {
                self.last_trigger_time = frame.timestamp;
            }
            self.triggers.push(TriggerNote {
                frame_index: self.frames.len(),
                frame_seq: frame.seq,
                captured_at: frame.captured_at,
                confidence: verdict.confidence,
                reason: verdict.raw_reason.clone(),
            });
        }
        self.frames.push(frame);
    }

    /// `now - last_trigger_time >= cooldown`.
    pub fn cooldown_elapsed(&self, now: Instant, cooldown: Duration) -> bool {
        now.saturating_duration_since(self.last_trigger_time) >= cooldown
    }

    /// Marks the episode closed.
    pub fn close(mut self, reason: CloseReason) -> Self {
        self.close_reason = Some(reason);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Monotonic time of the opening trigger.
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Wall-clock time of the first frame.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Monotonic time of the latest trigger; the cooldown runs from here.
    pub fn last_trigger_time(&self) -> Instant {
        self.last_trigger_time
    }

    /// Wall-clock time of the last frame, or the start time when empty.
    pub fn ended_at(&self) -> DateTime<Utc> {
        self.frames
            .last()
            .map_or(self.started_at, |f| f.captured_at)
    }

    /// Frames in capture order, lookback first.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of leading frames that came from the lookback buffer.
    pub fn lookback_len(&self) -> usize {
        self.lookback_len
    }

    /// Triggering frames seen so far.
    pub fn triggers(&self) -> &[TriggerNote] {
        &self.triggers
    }

    /// `None` while the episode is still open.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Span between the first and the last frame.
    pub fn duration(&self) -> Duration {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last.timestamp.saturating_duration_since(first.timestamp),
            _ => Duration::ZERO,
        }
    }

    /// Index of the frame used for the still image.
    ///
    /// Highest-confidence triggering frame (earliest on ties), then the first
    /// triggering frame, then the first frame.
    pub fn representative_index(&self) -> Option<usize> {
        if self.frames.is_empty() {
            return None;
        }

        let best = self
            .triggers
            .iter()
            .filter_map(|t| t.confidence.map(|c| (t.frame_index, c)))
            .fold(None::<(usize, f32)>, |best, (idx, c)| match best {
                Some((_, best_c)) if best_c >= c => best,
                _ => Some((idx, c)),
            });

        Some(
            best.map(|(idx, _)| idx)
                .or_else(|| self.triggers.first().map(|t| t.frame_index))
                .unwrap_or(0),
        )
    }

    /// Frame used for the still image.
    pub fn representative_frame(&self) -> Option<&Frame> {
        self.representative_index().map(|i| &self.frames[i])
    }
}

impl fmt::Debug for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Episode")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .field("frames", &self.frames.len())
            .field("lookback_len", &self.lookback_len)
            .field("triggers", &self.triggers.len())
            .field("close_reason", &self.close_reason)
            .finish()
    }
}
