//! Application configuration.
//!
//! Capture region and cadence, classifier provider, recording policy, output
//! and preview settings. Loaded through [`crate::config_manager::ConfigManager`]
//! from defaults, an optional JSON file and `VIGIL__*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::error::CoreError;
use crate::models::region::Region;

/// Lower bound for the recording cooldown.
pub const MIN_COOLDOWN_SECS: u64 = 5;

/// Largest image batch sent in one classification call.
pub const MAX_BATCH_SIZE: usize = 8;

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Region capture and sampling
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Trigger classification
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Episode recording policy
    #[serde(default)]
    pub recording: RecordingConfig,
    /// Artifact output
    #[serde(default)]
    pub output: OutputConfig,
    /// Live preview
    #[serde(default)]
    pub preview: PreviewConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ============================================================
// Capture
// ============================================================

/// Region capture and sampling cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Monitored region; required before monitoring starts
    #[serde(default)]
    pub region: Option<Region>,
    /// Monitor to capture (default: primary)
    #[serde(default)]
    pub monitor_index: Option<usize>,
    /// Sampling tick period (ms)
    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u64,
    /// Frames are downscaled so the longest edge is at most this many pixels
    #[serde(default = "default_max_frame_edge")]
    pub max_frame_edge: u32,
    /// Consecutive capture failures before the session is abandoned
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// First retry delay after a capture failure (ms)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Retry delay cap (ms)
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Seconds without a frame before capture is declared stalled
    #[serde(default = "default_stall_threshold_secs")]
    pub stall_threshold_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            region: None,
            monitor_index: None,
            sampling_interval_ms: default_sampling_interval_ms(),
            max_frame_edge: default_max_frame_edge(),
            max_consecutive_failures: default_max_consecutive_failures(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            stall_threshold_secs: default_stall_threshold_secs(),
        }
    }
}

impl CaptureConfig {
    /// Time between sampling ticks.
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Capture time without a frame that ends the session.
    pub fn stall_threshold(&self) -> Duration {
        Duration::from_secs(self.stall_threshold_secs)
    }
}

fn default_sampling_interval_ms() -> u64 {
    1000
}
fn default_max_frame_edge() -> u32 {
    1280
}
fn default_max_consecutive_failures() -> u32 {
    10
}
fn default_backoff_base_ms() -> u64 {
    250
}
fn default_backoff_max_ms() -> u64 {
    5_000
}
fn default_stall_threshold_secs() -> u64 {
    30
}

// ============================================================
// Classifier
// ============================================================

/// Multimodal oracle provider; decides request format and auth header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OracleProvider {
    /// Google Gemini: `x-goog-api-key` header + `models/{model}:generateContent`
    #[default]
    Gemini,
    /// Anthropic Claude: `x-api-key` header + `/v1/messages`
    Anthropic,
    /// OpenAI-compatible: `Authorization: Bearer` + `/v1/chat/completions`
    OpenAi,
}

impl OracleProvider {
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            OracleProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            OracleProvider::Anthropic => "https://api.anthropic.com/v1/messages",
            OracleProvider::OpenAi => "https://api.openai.com/v1/chat/completions",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            OracleProvider::Gemini => "gemini-2.0-flash",
            OracleProvider::Anthropic => "claude-sonnet-4-5-20250929",
            OracleProvider::OpenAi => "gpt-4o-mini",
        }
    }

    /// Environment variable holding the API key.
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            OracleProvider::Gemini => "GOOGLE_API_KEY",
            OracleProvider::Anthropic => "ANTHROPIC_API_KEY",
            OracleProvider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl std::str::FromStr for OracleProvider {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(OracleProvider::Gemini),
            "anthropic" | "claude" => Ok(OracleProvider::Anthropic),
            "openai" | "open_ai" => Ok(OracleProvider::OpenAi),
            other => Err(CoreError::Config(format!(
                "unknown provider \"{other}\" (expected gemini, anthropic or openai)"
            ))),
        }
    }
}

/// Trigger classification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub provider: OracleProvider,
    /// Endpoint override (default: provider endpoint)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Model override (default: provider model)
    #[serde(default)]
    pub model: Option<String>,
    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Per-call deadline (s)
    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,
    /// Delay before the single retry of a transient failure (ms)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Minimum spacing between oracle calls (ms, 0 = every tick)
    #[serde(default)]
    pub analysis_interval_ms: u64,
    /// Recent frames sent per call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// When set, `confidence >= threshold` decides the verdict
    #[serde(default)]
    pub confidence_threshold: Option<f32>,
    /// JPEG quality of the oracle payload
    #[serde(default = "default_payload_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Response token cap
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Backoff applied after a 429 without `Retry-After` (s)
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: OracleProvider::default(),
            endpoint: None,
            model: None,
            api_key_env: None,
            timeout_secs: default_classifier_timeout_secs(),
            retry_delay_ms: default_retry_delay_ms(),
            analysis_interval_ms: 0,
            batch_size: default_batch_size(),
            confidence_threshold: None,
            jpeg_quality: default_payload_jpeg_quality(),
            max_output_tokens: default_max_output_tokens(),
            rate_limit_backoff_secs: default_rate_limit_backoff_secs(),
        }
    }
}

impl ClassifierConfig {
    /// Configured endpoint or the provider default.
    pub fn resolved_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| self.provider.default_endpoint().to_string())
    }

    /// Configured model or the provider default.
    pub fn resolved_model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    /// Name of the environment variable holding the API key.
    pub fn resolved_api_key_env(&self) -> String {
        self.api_key_env
            .clone()
            .unwrap_or_else(|| self.provider.default_api_key_env().to_string())
    }

    /// Deadline for one oracle call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::from_millis(self.analysis_interval_ms)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }
}

fn default_classifier_timeout_secs() -> u64 {
    10
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_batch_size() -> usize {
    1
}
fn default_payload_jpeg_quality() -> u8 {
    80
}
fn default_max_output_tokens() -> u32 {
    256
}
fn default_rate_limit_backoff_secs() -> u64 {
    30
}

// ============================================================
// Recording
// ============================================================

/// Episode recording policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Quiet period after the last trigger before an episode closes (s, >= 5)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Pre-trigger frames prepended to a new episode (0 = off)
    #[serde(default)]
    pub lookback_frames: usize,
    /// Closed episodes that may wait for the writer
    #[serde(default = "default_writer_queue_capacity")]
    pub writer_queue_capacity: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            lookback_frames: 0,
            writer_queue_capacity: default_writer_queue_capacity(),
        }
    }
}

impl RecordingConfig {
    /// Cooldown, never below [`MIN_COOLDOWN_SECS`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs.max(MIN_COOLDOWN_SECS))
    }
}

fn default_cooldown_secs() -> u64 {
    MIN_COOLDOWN_SECS
}
fn default_writer_queue_capacity() -> usize {
    4
}

// ============================================================
// Output
// ============================================================

/// Primary video container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryVideoFormat {
    /// MP4 when ffmpeg is available, animated GIF otherwise
    #[default]
    Auto,
    /// MP4 only; fails the primary video when ffmpeg is missing
    Mp4,
    /// Animated GIF
    Gif,
}

impl std::str::FromStr for PrimaryVideoFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(PrimaryVideoFormat::Auto),
            "mp4" => Ok(PrimaryVideoFormat::Mp4),
            "gif" => Ok(PrimaryVideoFormat::Gif),
            other => Err(CoreError::Config(format!(
                "unknown video format \"{other}\" (expected auto, mp4 or gif)"
            ))),
        }
    }
}

/// Artifact output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output root (default: platform data directory)
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub primary_video: PrimaryVideoFormat,
    /// ffmpeg executable
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// Playback rate (default: derived from the sampling interval)
    #[serde(default)]
    pub video_fps: Option<f32>,
    /// JPEG quality for stills and MJPEG frames
    #[serde(default = "default_output_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Write the Motion-JPEG AVI
    #[serde(default = "default_true")]
    pub write_legacy_video: bool,
    /// Write the JSON manifest
    #[serde(default = "default_true")]
    pub write_manifest: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            primary_video: PrimaryVideoFormat::default(),
            ffmpeg_path: default_ffmpeg_path(),
            video_fps: None,
            jpeg_quality: default_output_jpeg_quality(),
            write_legacy_video: true,
            write_manifest: true,
        }
    }
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}
fn default_output_jpeg_quality() -> u8 {
    90
}

// ============================================================
// Preview
// ============================================================

/// Live preview of the monitored region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Minimum time between preview file updates (ms)
    #[serde(default = "default_preview_refresh_ms")]
    pub refresh_ms: u64,
    /// Longest edge of the preview image
    #[serde(default = "default_preview_max_edge")]
    pub max_edge: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            refresh_ms: default_preview_refresh_ms(),
            max_edge: default_preview_max_edge(),
        }
    }
}

impl PreviewConfig {
    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }
}

fn default_preview_refresh_ms() -> u64 {
    500
}
fn default_preview_max_edge() -> u32 {
    480
}

// ============================================================
// Logging
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Period of the status log line (s, 0 = off)
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: default_status_interval_secs(),
        }
    }
}

fn default_status_interval_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

// ============================================================
// AppConfig
// ============================================================

impl AppConfig {
    /// Built-in defaults
    pub fn default_config() -> Self {
        Self {
            capture: CaptureConfig::default(),
            classifier: ClassifierConfig::default(),
            recording: RecordingConfig::default(),
            output: OutputConfig::default(),
            preview: PreviewConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Raises values that have an enforced minimum.
    pub fn normalize(&mut self) {
        if self.recording.cooldown_secs < MIN_COOLDOWN_SECS {
            warn!(
                requested = self.recording.cooldown_secs,
                minimum = MIN_COOLDOWN_SECS,
                "cooldown below minimum, raised"
            );
            self.recording.cooldown_secs = MIN_COOLDOWN_SECS;
        }
    }

    /// Checks everything that can be checked without touching the screen.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(region) = &self.capture.region {
            region.validate()?;
        }
        if self.capture.sampling_interval_ms == 0 {
            return Err(CoreError::validation(
                "capture.sampling_interval_ms",
                "must be greater than 0",
            ));
        }
        if self.capture.max_frame_edge < 16 {
            return Err(CoreError::validation(
                "capture.max_frame_edge",
                "must be at least 16",
            ));
        }
        if self.capture.max_consecutive_failures == 0 {
            return Err(CoreError::validation(
                "capture.max_consecutive_failures",
                "must be at least 1",
            ));
        }
        if self.capture.backoff_base_ms > self.capture.backoff_max_ms {
            return Err(CoreError::validation(
                "capture.backoff_base_ms",
                "must not exceed capture.backoff_max_ms",
            ));
        }
        if self.capture.stall_threshold_secs == 0 {
            return Err(CoreError::validation(
                "capture.stall_threshold_secs",
                "must be greater than 0",
            ));
        }
        if self.classifier.timeout_secs == 0 {
            return Err(CoreError::validation(
                "classifier.timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.classifier.batch_size == 0 || self.classifier.batch_size > MAX_BATCH_SIZE {
            return Err(CoreError::validation(
                "classifier.batch_size",
                format!("must be between 1 and {MAX_BATCH_SIZE}"),
            ));
        }
        if let Some(threshold) = self.classifier.confidence_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(CoreError::validation(
                    "classifier.confidence_threshold",
                    "must be within 0.0..=1.0",
                ));
            }
        }
        for (field, quality) in [
            ("classifier.jpeg_quality", self.classifier.jpeg_quality),
            ("output.jpeg_quality", self.output.jpeg_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(CoreError::validation(field, "must be within 1..=100"));
            }
        }
        if self.recording.writer_queue_capacity == 0 {
            return Err(CoreError::validation(
                "recording.writer_queue_capacity",
                "must be at least 1",
            ));
        }
        if let Some(fps) = self.output.video_fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(CoreError::validation(
                    "output.video_fps",
                    "must be a positive number",
                ));
            }
        }
        Ok(())
    }

    /// Playback rate of written videos.
    pub fn video_fps(&self) -> f32 {
        self.output.video_fps.unwrap_or_else(|| {
            (1000.0 / self.capture.sampling_interval_ms.max(1) as f32).max(0.1)
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::default_config()
    }
}
