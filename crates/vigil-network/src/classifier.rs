//! Trigger classifier.
//!
//! Wraps a [`TriggerOracle`] with the per-tick policy: analysis cadence,
//! rate-limit backoff, a per-call deadline, one retry of transient failures
//! and the confidence threshold. [`TriggerClassifier::signal`] never fails;
//! anything that goes wrong becomes a neutral verdict.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use vigil_core::config::ClassifierConfig;
use vigil_core::error::CoreError;
use vigil_core::models::frame::Frame;
use vigil_core::models::verdict::{TriggerDescription, Verdict};
use vigil_core::ports::oracle::{ClassificationRequest, EncodedImage, TriggerOracle};
use vigil_core::throttle::{OnceLog, WarnThrottle};
use vigil_vision::encoder::encode_for_oracle;

/// Window of the "classification failed" warning
const FAILURE_WARN_WINDOW: Duration = Duration::from_secs(30);

/// Classifier policy
#[derive(Debug, Clone)]
pub struct ClassifierPolicy {
    pub timeout: Duration,
    pub retry_delay: Duration,
    pub analysis_interval: Duration,
    pub batch_size: usize,
    pub confidence_threshold: Option<f32>,
    pub jpeg_quality: u8,
    pub rate_limit_backoff: Duration,
}

impl From<&ClassifierConfig> for ClassifierPolicy {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            timeout: config.timeout(),
            retry_delay: config.retry_delay(),
            analysis_interval: config.analysis_interval(),
            batch_size: config.batch_size.max(1),
            confidence_threshold: config.confidence_threshold,
            jpeg_quality: config.jpeg_quality,
            rate_limit_backoff: config.rate_limit_backoff(),
        }
    }
}

/// How a tick's verdict came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    /// The oracle answered
    Classified,
    /// Not sent: analysis cadence or rate-limit backoff
    Skipped,
    /// The call failed; the verdict is neutral
    Failed,
}

/// Loop-facing classification result.
#[derive(Debug, Clone)]
pub struct TickSignal {
    pub verdict: Verdict,
    pub source: SignalSource,
}

impl TickSignal {
    fn skipped() -> Self {
        Self {
            verdict: Verdict::neutral(),
            source: SignalSource::Skipped,
        }
    }
}

/// Call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifierStats {
    pub calls: u64,
    pub triggers: u64,
    pub failures: u64,
    pub retries: u64,
    pub skipped: u64,
}

/// Trigger classifier
pub struct TriggerClassifier {
    oracle: Arc<dyn TriggerOracle>,
    policy: ClassifierPolicy,
    recent: VecDeque<EncodedImage>,
    last_analysis: Option<Instant>,
    backoff_until: Option<Instant>,
    failure_warn: WarnThrottle,
    client_errors: OnceLog,
    stats: ClassifierStats,
}

impl TriggerClassifier {
    pub fn new(oracle: Arc<dyn TriggerOracle>, policy: ClassifierPolicy) -> Self {
        info!(
            oracle = oracle.provider_name(),
            timeout_ms = policy.timeout.as_millis() as u64,
            batch = policy.batch_size,
            "trigger classifier ready"
        );
        Self {
            oracle,
            recent: VecDeque::with_capacity(policy.batch_size),
            policy,
            last_analysis: None,
            backoff_until: None,
            failure_warn: WarnThrottle::new(FAILURE_WARN_WINDOW),
            client_errors: OnceLog::new(),
            stats: ClassifierStats::default(),
        }
    }

    /// Classifies `frame` (with up to `batch_size - 1` earlier frames).
    ///
    /// Bounded by the per-call deadline; a transient failure is retried once
    /// after `retry_delay`. Client errors are never retried.
    pub async fn classify(
        &mut self,
        frame: &Frame,
        description: &TriggerDescription,
    ) -> Result<Verdict, CoreError> {
        let encoded = encode_for_oracle(&frame.image, self.policy.jpeg_quality)?;
        if self.recent.len() == self.policy.batch_size {
            self.recent.pop_front();
        }
        self.recent.push_back(encoded);

        let request = ClassificationRequest {
            images: self.recent.iter().cloned().collect(),
            description: description.clone(),
        };

        self.stats.calls += 1;
        let verdict = match self.call_once(&request).await {
            Err(e) if e.is_transient() => {
                debug!(error = %e, seq = frame.seq, "transient classification failure, retrying once");
                self.stats.retries += 1;
                tokio::time::sleep(self.policy.retry_delay).await;
                self.call_once(&request).await
            }
            other => other,
        }?;

        Ok(verdict.apply_threshold(self.policy.confidence_threshold))
    }

    async fn call_once(&self, request: &ClassificationRequest) -> Result<Verdict, CoreError> {
        tokio::time::timeout(self.policy.timeout, self.oracle.evaluate(request))
            .await
            .map_err(|_| CoreError::Timeout {
                timeout_ms: self.policy.timeout.as_millis() as u64,
            })?
    }

    /// Per-tick signal: applies cadence and backoff, classifies, and turns
    /// every failure into a neutral verdict.
    pub async fn signal(&mut self, frame: &Frame, description: &TriggerDescription) -> TickSignal {
        let now = Instant::now();

        if let Some(until) = self.backoff_until {
            if now < until {
                self.stats.skipped += 1;
                return TickSignal::skipped();
            }
            self.backoff_until = None;
            info!("rate-limit backoff over, resuming classification");
        }

        if let Some(last) = self.last_analysis {
            if now.saturating_duration_since(last) < self.policy.analysis_interval {
                self.stats.skipped += 1;
                return TickSignal::skipped();
            }
        }
        self.last_analysis = Some(now);

        match self.classify(frame, description).await {
            Ok(verdict) => {
                if verdict.triggered {
                    self.stats.triggers += 1;
                }
                TickSignal {
                    verdict,
                    source: SignalSource::Classified,
                }
            }
            Err(e) => {
                self.stats.failures += 1;
                self.report_failure(&e, frame.seq);
                TickSignal {
                    verdict: Verdict::neutral(),
                    source: SignalSource::Failed,
                }
            }
        }
    }

    fn report_failure(&mut self, e: &CoreError, seq: u64) {
        match e {
            CoreError::RateLimit { retry_after_secs } => {
                let wait = if *retry_after_secs > 0 {
                    Duration::from_secs(*retry_after_secs)
                } else {
                    self.policy.rate_limit_backoff
                };
                self.backoff_until = Some(Instant::now() + wait);
                warn!(
                    wait_secs = wait.as_secs(),
                    "oracle rate limit hit, pausing classification"
                );
            }
            CoreError::ClientRequest { status, message } => {
                let key = format!("{status}:{message}");
                if self.client_errors.first(&key) {
                    error!(
                        status,
                        message = %message,
                        "oracle rejected the request; check model, API key and payload"
                    );
                } else {
                    debug!(status, seq, "oracle rejected the request again");
                }
            }
            other => match self.failure_warn.check() {
                Some(suppressed) => warn!(
                    error = %other,
                    seq,
                    suppressed,
                    "classification failed, treating tick as no trigger"
                ),
                None => debug!(error = %other, seq, "classification failed"),
            },
        }
    }

    /// Counters since construction.
    pub fn stats(&self) -> ClassifierStats {
        self.stats
    }

    /// Provider name of the wrapped oracle.
    pub fn oracle_name(&self) -> &str {
        self.oracle.provider_name()
    }

    /// Whether a rate-limit backoff is in effect.
    pub fn is_backing_off(&self) -> bool {
        self.backoff_until.map_or(false, |until| Instant::now() < until)
    }
}
