//! Classification verdicts and the trigger description they are judged against.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Free-text description of what counts as a trigger.
///
/// Supplied once per session and sent unchanged with every classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TriggerDescription(String);

impl TriggerDescription {
    /// Trims `text`; empty descriptions are rejected.
    pub fn new(text: impl Into<String>) -> Result<Self, CoreError> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CoreError::validation(
                "trigger_description",
                "must not be empty",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TriggerDescription {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TriggerDescription> for String {
    fn from(value: TriggerDescription) -> Self {
        value.0
    }
}

impl fmt::Display for TriggerDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-tick trigger decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the frame matches the trigger description
    pub triggered: bool,
    /// Oracle confidence in `[0.0, 1.0]`, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Short explanation returned by the oracle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_reason: Option<String>,
}

impl Verdict {
    /// "No signal" for this tick: skipped, timed out or failed.
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Positive verdict with a reason.
    pub fn triggered(reason: impl Into<String>) -> Self {
        Self {
            triggered: true,
            confidence: None,
            raw_reason: Some(reason.into()),
        }
    }

    /// Negative answer from the oracle.
    pub fn clear() -> Self {
        Self::default()
    }

    /// Attaches a confidence, clamped to `[0.0, 1.0]`. NaN is dropped.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = if confidence.is_nan() {
            None
        } else {
            Some(confidence.clamp(0.0, 1.0))
        };
        self
    }

    /// Applies a confidence threshold.
    ///
    /// With a threshold and a reported confidence, `confidence >= threshold`
    /// decides (a tie triggers). Otherwise the oracle's boolean stands.
    pub fn apply_threshold(mut self, threshold: Option<f32>) -> Self {
        if let (Some(threshold), Some(confidence)) = (threshold, self.confidence) {
            self.triggered = confidence >= threshold;
        }
        self
    }
}
