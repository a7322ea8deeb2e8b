//! # vigil-recorder
//!
//! Turns a stream of (frame, verdict) pairs into episodes.
//!
//! - [`lookback`]: bounded pre-trigger frame buffer
//! - [`controller`]: IDLE/ACTIVE recording state machine with cooldown
//! - [`monitor_loop`]: sample, classify, record and hand off until shutdown

pub mod controller;
pub mod lookback;
pub mod monitor_loop;
