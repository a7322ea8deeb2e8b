//! Multimodal classification oracle client.
//!
//! Sends the sampled region image(s) and the trigger description to a
//! multimodal model and reads back a verdict. Request shape and auth header
//! depend on the provider:
//!
//! - Gemini: `POST {endpoint}/models/{model}:generateContent`, `x-goog-api-key`
//! - Anthropic: `POST /v1/messages`, `x-api-key`
//! - OpenAI-compatible: `POST /v1/chat/completions`, `Authorization: Bearer`

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;
use tracing::{debug, warn};

use vigil_core::config::{ClassifierConfig, OracleProvider};
use vigil_core::error::CoreError;
use vigil_core::models::verdict::Verdict;
use vigil_core::ports::oracle::{ClassificationRequest, EncodedImage, TriggerOracle};

use crate::secret::ApiKey;
use crate::verdict_parser::{
    extract_claude_text, extract_gemini_text, extract_openai_text, parse_verdict_text,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

// ============================================================
// RemoteVisionOracle
// ============================================================

/// Remote multimodal oracle: `TriggerOracle` implementation
#[derive(Debug)]
pub struct RemoteVisionOracle {
    http_client: reqwest::Client,
    provider: OracleProvider,
    endpoint: String,
    model: String,
    api_key: ApiKey,
    max_output_tokens: u32,
    timeout: Duration,
    /// `provider/model`, for logs
    name: String,
}

impl RemoteVisionOracle {
    /// Builds the HTTP client for the configured provider.
    pub fn new(config: &ClassifierConfig, api_key: ApiKey) -> Result<Self, CoreError> {
        let timeout = config.timeout();
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("failed to build HTTP client: {e}")))?;

        let endpoint = config.resolved_endpoint();
        let model = config.resolved_model();
        let name = format!("{:?}/{}", config.provider, model).to_lowercase();

        debug!(
            endpoint = %endpoint,
            model = %model,
            timeout_secs = config.timeout_secs,
            "RemoteVisionOracle initialised"
        );

        Ok(Self {
            http_client,
            provider: config.provider,
            endpoint,
            model,
            api_key,
            max_output_tokens: config.max_output_tokens,
            timeout,
            name,
        })
    }

    fn system_prompt() -> &'static str {
        r#"You watch a live screen region for one specific situation that the user has described.
Judge only what is visible in the images. Images are ordered oldest first; decide about the newest one.
Reply with JSON only, no prose:
{"triggered": true or false, "confidence": number between 0.0 and 1.0, "reason": "explanation in at most 20 words"}"#
    }

    fn user_prompt(request: &ClassificationRequest) -> String {
        format!(
            "User's trigger description: \"{}\"\n\
             Does the newest image contain this trigger based on the user's description?",
            request.description
        )
    }

    fn request_url(&self) -> String {
        match self.provider {
            OracleProvider::Gemini => format!(
                "{}/models/{}:generateContent",
                self.endpoint.trim_end_matches('/'),
                self.model
            ),
            OracleProvider::Anthropic | OracleProvider::OpenAi => self.endpoint.clone(),
        }
    }

    fn build_body(&self, request: &ClassificationRequest) -> serde_json::Value {
        let user_prompt = Self::user_prompt(request);
        match self.provider {
            OracleProvider::Gemini => {
                let mut parts: Vec<serde_json::Value> = request
                    .images
                    .iter()
                    .map(|img| {
                        serde_json::json!({
                            "inline_data": {
                                "mime_type": img.mime_type,
                                "data": B64.encode(&img.data)
                            }
                        })
                    })
                    .collect();
                parts.push(serde_json::json!({ "text": user_prompt }));

                serde_json::json!({
                    "system_instruction": { "parts": [{ "text": Self::system_prompt() }] },
                    "contents": [{ "role": "user", "parts": parts }],
                    "generationConfig": {
                        "maxOutputTokens": self.max_output_tokens,
                        "temperature": 0.0,
                        "responseMimeType": "application/json"
                    }
                })
            }
            OracleProvider::Anthropic => {
                let mut content: Vec<serde_json::Value> = request
                    .images
                    .iter()
                    .map(|img| {
                        serde_json::json!({
                            "type": "image",
                            "source": {
                                "type": "base64",
                                "media_type": img.mime_type,
                                "data": B64.encode(&img.data)
                            }
                        })
                    })
                    .collect();
                content.push(serde_json::json!({ "type": "text", "text": user_prompt }));

                serde_json::json!({
                    "model": self.model,
                    "max_tokens": self.max_output_tokens,
                    "system": Self::system_prompt(),
                    "messages": [{ "role": "user", "content": content }]
                })
            }
            OracleProvider::OpenAi => {
                let mut content: Vec<serde_json::Value> = request
                    .images
                    .iter()
                    .map(|img| {
                        serde_json::json!({
                            "type": "image_url",
                            "image_url": { "url": data_url(img) }
                        })
                    })
                    .collect();
                content.push(serde_json::json!({ "type": "text", "text": user_prompt }));

                serde_json::json!({
                    "model": self.model,
                    "max_tokens": self.max_output_tokens,
                    "messages": [
                        { "role": "system", "content": Self::system_prompt() },
                        { "role": "user", "content": content }
                    ]
                })
            }
        }
    }

    fn extract_text(&self, body: &str) -> Result<String, CoreError> {
        match self.provider {
            OracleProvider::Gemini => extract_gemini_text(body),
            OracleProvider::Anthropic => extract_claude_text(body),
            OracleProvider::OpenAi => extract_openai_text(body),
        }
    }

    fn map_transport_error(&self, e: reqwest::Error) -> CoreError {
        if e.is_timeout() {
            CoreError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            CoreError::Network(format!("oracle request failed: {e}"))
        }
    }
}

fn data_url(img: &EncodedImage) -> String {
    format!("data:{};base64,{}", img.mime_type, B64.encode(&img.data))
}

/// `Retry-After` in seconds; 0 when absent or not numeric.
fn retry_after_secs(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

/// Maps a non-success HTTP status to a classification error.
pub fn map_status(status: u16, retry_after_secs: u64, body: &str) -> CoreError {
    let message: String = body.chars().take(200).collect();
    match status {
        429 => CoreError::RateLimit { retry_after_secs },
        500..=599 => CoreError::ServiceUnavailable(format!("{status}: {message}")),
        _ => CoreError::ClientRequest { status, message },
    }
}

#[async_trait]
impl TriggerOracle for RemoteVisionOracle {
    async fn evaluate(&self, request: &ClassificationRequest) -> Result<Verdict, CoreError> {
        if request.images.is_empty() {
            return Err(CoreError::Internal(
                "classification request without images".to_string(),
            ));
        }

        debug!(
            model = %self.model,
            images = request.images.len(),
            "calling classification oracle"
        );

        let mut builder = self
            .http_client
            .post(self.request_url())
            .header("Content-Type", "application/json")
            .json(&self.build_body(request));

        builder = match self.provider {
            OracleProvider::Gemini => builder.header("x-goog-api-key", self.api_key.expose()),
            OracleProvider::Anthropic => builder
                .header("x-api-key", self.api_key.expose())
                .header("anthropic-version", ANTHROPIC_VERSION),
            OracleProvider::OpenAi => {
                builder.header("Authorization", format!("Bearer {}", self.api_key.expose()))
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let retry_after = retry_after_secs(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            warn!(status = %status, "oracle returned an error status");
            return Err(map_status(status.as_u16(), retry_after, &body));
        }

        let text = self.extract_text(&body)?;
        let verdict = parse_verdict_text(&text)?;

        debug!(
            triggered = verdict.triggered,
            confidence = ?verdict.confidence,
            reason = ?verdict.raw_reason,
            "oracle verdict"
        );

        Ok(verdict)
    }

    fn provider_name(&self) -> &str {
        &self.name
    }
}

// ============================================================
// Tests
// ============================================================
