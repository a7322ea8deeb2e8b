//! # vigil-network
//!
//! Reaches the multimodal classification oracle over HTTP and turns its
//! answers into per-tick verdicts.
//!
//! - [`ai_vision_client`]: `TriggerOracle` adapter for Gemini, Anthropic and
//!   OpenAI-compatible APIs
//! - [`verdict_parser`]: provider response and answer parsing
//! - [`classifier`]: timeout, single retry, rate-limit backoff, cadence
//! - [`secret`]: redacting API key holder

pub mod ai_vision_client;
pub mod classifier;
pub mod secret;
pub mod verdict_parser;
