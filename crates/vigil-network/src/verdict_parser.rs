//! Oracle response parsing.
//!
//! Two layers: pulling the model's text out of each provider's response
//! envelope, then reading a verdict from that text. The text is expected to be
//! JSON (`{"triggered", "confidence", "reason"}`); the plain
//! `Trigger: <reason>` / `No` answer format is accepted as well.

use serde::Deserialize;
use vigil_core::error::CoreError;
use vigil_core::models::verdict::Verdict;

/// Confidence above which a JSON answer without `triggered` counts as a trigger
const IMPLIED_TRIGGER_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Deserialize)]
struct VerdictJson {
    #[serde(default, alias = "trigger", alias = "is_trigger")]
    triggered: Option<bool>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default, alias = "explanation")]
    reason: Option<String>,
}

fn truncate(text: &str) -> String {
    text.chars().take(200).collect()
}

fn parse_body(body: &str) -> Result<serde_json::Value, CoreError> {
    serde_json::from_str(body)
        .map_err(|e| CoreError::OracleResponse(format!("response is not JSON: {e}")))
}

/// Gemini `generateContent`: `candidates[0].content.parts[*].text`
pub fn extract_gemini_text(body: &str) -> Result<String, CoreError> {
    let response = parse_body(body)?;

    if let Some(reason) = response
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(|r| r.as_str())
    {
        return Err(CoreError::OracleResponse(format!("prompt blocked: {reason}")));
    }

    let parts = response
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|cand| cand.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| CoreError::OracleResponse("no candidate in Gemini response".to_string()))?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        return Err(CoreError::OracleResponse("empty Gemini answer".to_string()));
    }
    Ok(text)
}

/// Anthropic messages: concatenated `content[type=text].text`
pub fn extract_claude_text(body: &str) -> Result<String, CoreError> {
    let response = parse_body(body)?;

    let blocks = response
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| CoreError::OracleResponse("no content in Claude response".to_string()))?;

    let text: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()).map_or(true, |t| t == "text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        return Err(CoreError::OracleResponse("empty Claude answer".to_string()));
    }
    Ok(text)
}

/// OpenAI chat completions: `choices[0].message.content`
pub fn extract_openai_text(body: &str) -> Result<String, CoreError> {
    let response = parse_body(body)?;

    response
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(|t| t.as_str())
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| CoreError::OracleResponse("no answer in OpenAI response".to_string()))
}

/// Reads a verdict from the model's answer text.
pub fn parse_verdict_text(text: &str) -> Result<Verdict, CoreError> {
    let trimmed = text.trim();

    if let Some(verdict) = parse_json_answer(trimmed) {
        return Ok(verdict);
    }

    if let Some(verdict) = parse_legacy_answer(trimmed) {
        return Ok(verdict);
    }

    Err(CoreError::OracleResponse(format!(
        "unrecognised answer: {}",
        truncate(trimmed)
    )))
}

/// JSON answer, possibly wrapped in prose or a markdown fence.
fn parse_json_answer(text: &str) -> Option<Verdict> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }

    let parsed: VerdictJson = serde_json::from_str(&text[start..=end]).ok()?;
    let triggered = match (parsed.triggered, parsed.confidence) {
        (Some(t), _) => t,
        (None, Some(c)) => c >= IMPLIED_TRIGGER_CONFIDENCE,
        (None, None) => return None,
    };

    let mut verdict = Verdict {
        triggered,
        confidence: None,
        raw_reason: parsed.reason.filter(|r| !r.trim().is_empty()),
    };
    if let Some(c) = parsed.confidence {
        verdict = verdict.with_confidence(c);
    }
    Some(verdict)
}

/// A line starting with `Trigger: <reason>`, or an answer starting with "No".
fn parse_legacy_answer(text: &str) -> Option<Verdict> {
    const MARKER: &str = "Trigger:";

    let marked = text
        .lines()
        .find_map(|line| line.trim_start().strip_prefix(MARKER));
    if let Some(rest) = marked {
        let reason = rest.trim();
        return Some(if reason.is_empty() {
            Verdict {
                triggered: true,
                ..Verdict::default()
            }
        } else {
            Verdict::triggered(reason)
        });
    }

    let lower = text.to_ascii_lowercase();
    let first_word: String = lower
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if first_word == "no" {
        return Some(Verdict::clear());
    }
    None
}
