//! Session statistics.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counters reported when a monitoring session ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub frames_sampled: u64,
    pub frames_classified: u64,
    pub triggers: u64,
    pub classification_failures: u64,
    pub capture_failures: u64,
    pub episodes_opened: u64,
    pub episodes_written: u64,
    pub write_failures: u64,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl SessionSummary {
    /// Share of sampled frames that reached the oracle.
    pub fn classification_ratio(&self) -> f64 {
        if self.frames_sampled == 0 {
            0.0
        } else {
            self.frames_classified as f64 / self.frames_sampled as f64
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_handles_empty_session() {
        assert_eq!(SessionSummary::default().classification_ratio(), 0.0);
    }

    #[test]
    fn ratio_counts_classified_frames() {
        let summary = SessionSummary {
            frames_sampled: 10,
            frames_classified: 5,
            ..Default::default()
        };
        assert!((summary.classification_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn serializes_duration_as_seconds() {
        let summary = SessionSummary {
            duration: Duration::from_millis(1500),
            ..Default::default()
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["duration"], 1.5);
    }
}
