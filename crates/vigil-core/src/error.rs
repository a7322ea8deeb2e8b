//! Vigil core error type.
//!
//! Adapter crates return `CoreError` directly; the binary wraps it in `anyhow`
//! for top-level context.

use thiserror::Error;

/// Core layer error.
///
/// Variants are grouped by how the monitor loop reacts to them:
/// configuration errors are fatal before the loop starts, capture stalls are
/// fatal inside it, classification errors degrade to a neutral verdict and
/// write errors are logged while the loop keeps running.
#[derive(Debug, Error)]
pub enum CoreError {
    // -- configuration ------------------------------------------------------
    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Field validation failure
    #[error("validation failed: {field}: {message}")]
    Validation {
        /// Name of the offending field
        field: String,
        /// Failure reason
        message: String,
    },

    // -- capture ------------------------------------------------------------
    /// The configured region could not be read
    #[error("capture error: {0}")]
    Capture(String),

    /// No frame was produced for longer than the health threshold
    #[error("capture stalled: no frame for {secs}s ({failures} consecutive failures)")]
    CaptureStalled {
        /// Seconds since the last successful frame
        secs: u64,
        /// Consecutive failed capture attempts
        failures: u32,
    },

    // -- classification -----------------------------------------------------
    /// Transport failure (connect, reset, body read)
    #[error("network error: {0}")]
    Network(String),

    /// Operation exceeded its deadline
    #[error("timed out after {timeout_ms}ms")]
    Timeout {
        /// Exceeded deadline in milliseconds
        timeout_ms: u64,
    },

    /// Rate limit exceeded (429)
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimit {
        /// Seconds to wait before the next request
        retry_after_secs: u64,
    },

    /// Service temporarily unavailable (5xx)
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Request rejected by the service (4xx other than 429); never retried
    #[error("request rejected ({status}): {message}")]
    ClientRequest {
        /// HTTP status code
        status: u16,
        /// Truncated response body
        message: String,
    },

    /// The oracle answered but the answer could not be interpreted
    #[error("unreadable oracle response: {0}")]
    OracleResponse(String),

    // -- persistence --------------------------------------------------------
    /// Artifact could not be written
    #[error("write error: {0}")]
    Write(String),

    /// An episode without frames was handed to the writer
    #[error("episode {episode_id} has no frames")]
    EmptyEpisode {
        /// Episode sequence number
        episode_id: u64,
    },

    // -- plumbing -----------------------------------------------------------
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected internal state
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Transient failures worth one retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Network(_) | CoreError::Timeout { .. } | CoreError::ServiceUnavailable(_)
        )
    }

    /// Failures that end the monitoring session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::Config(_) | CoreError::Validation { .. } | CoreError::CaptureStalled { .. }
        )
    }

    /// Configuration problems detected before monitoring starts.
    pub fn is_config(&self) -> bool {
        matches!(self, CoreError::Config(_) | CoreError::Validation { .. })
    }

    /// Shorthand for a [`CoreError::Validation`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(e: config::ConfigError) -> Self {
        CoreError::Config(e.to_string())
    }
}
