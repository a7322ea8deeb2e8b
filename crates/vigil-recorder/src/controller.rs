//! Recording state machine.
//!
//! ```text
//!            trigger
//!   IDLE ───────────────▶ ACTIVE ──┐ every tick: append frame,
//!    ▲                      │   ◀──┘ trigger refreshes the cooldown
//!    └──────────────────────┘
//!     now - last_trigger >= cooldown  (episode handed off)
//! ```
//!
//! Closed episodes leave the controller by value, so at most one episode is
//! ever owned here.

use std::time::{Duration, Instant};
use tracing::{debug, info};
use vigil_core::models::episode::{CloseReason, Episode, RecordingState};
use vigil_core::models::frame::Frame;
use vigil_core::models::verdict::Verdict;

use crate::lookback::LookbackBuffer;

pub struct RecordingController {
    cooldown: Duration,
    lookback: LookbackBuffer,
    active: Option<Episode>,
    next_id: u64,
}

impl RecordingController {
    /// `cooldown` is measured from the last positive verdict; up to
    /// `lookback_frames` idle frames are prepended to a new episode.
    pub fn new(cooldown: Duration, lookback_frames: usize) -> Self {
        Self {
            cooldown,
            lookback: LookbackBuffer::new(lookback_frames),
            active: None,
            next_id: 1,
        }
    }

    /// Current state; `Active` while an episode is open.
    pub fn state(&self) -> RecordingState {
        if self.active.is_some() {
            RecordingState::Active
        } else {
            RecordingState::Idle
        }
    }

    /// Episodes opened so far.
    pub fn episodes_opened(&self) -> u64 {
        self.next_id - 1
    }

    /// Quiet period that closes an episode.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Feeds one tick. Returns the episode this tick closed, if any.
    ///
    /// While active the frame is always appended, including on the tick that
    /// closes the episode.
    pub fn observe(&mut self, frame: Frame, verdict: &Verdict) -> Option<Episode> {
        let now = frame.timestamp;

        if let Some(episode) = self.active.as_mut() {
            episode.record(frame, verdict);
            if verdict.triggered {
                debug!(episode_id = episode.id(), "trigger refreshed cooldown");
            }
            if episode.cooldown_elapsed(now, self.cooldown) {
                return self.close(CloseReason::CooldownElapsed);
            }
            return None;
        }

        if verdict.triggered {
            self.open(frame, verdict);
        } else {
            self.lookback.push(frame);
        }
        None
    }

    /// Closes the active episode if its cooldown has run out at `now`
    /// (used on ticks that produced no frame).
    pub fn poll(&mut self, now: Instant) -> Option<Episode> {
        let elapsed = self
            .active
            .as_ref()
            .is_some_and(|episode| episode.cooldown_elapsed(now, self.cooldown));
        if elapsed {
            self.close(CloseReason::CooldownElapsed)
        } else {
            None
        }
    }

    /// Closes the active episode unconditionally.
    pub fn flush(&mut self, reason: CloseReason) -> Option<Episode> {
        self.close(reason)
    }

    fn open(&mut self, frame: Frame, verdict: &Verdict) {
        let id = self.next_id;
        self.next_id += 1;

        let mut episode = Episode::new(id, frame.timestamp, frame.captured_at);
        let lookback = self.lookback.drain();
        let lookback_len = lookback.len();
        episode.seed_lookback(lookback);

        info!(
            episode_id = id,
            seq = frame.seq,
            lookback = lookback_len,
            confidence = ?verdict.confidence,
            reason = verdict.raw_reason.as_deref().unwrap_or(""),
            "recording started"
        );
        episode.record(frame, verdict);
        self.active = Some(episode);
    }

    fn close(&mut self, reason: CloseReason) -> Option<Episode> {
        let episode = self.active.take()?.close(reason);
        info!(
            episode_id = episode.id(),
            frames = episode.frame_count(),
            triggers = episode.triggers().len(),
            duration_secs = episode.duration().as_secs_f64(),
            reason = ?reason,
            "recording stopped"
        );
        Some(episode)
    }
}
