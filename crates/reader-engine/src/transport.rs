use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;
use tracing::debug;

/// Finish reasons Gemini uses when a candidate was withheld by policy.
const SAFETY_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "IMAGE_SAFETY",
];

/// One `generateContent` round trip. Split out so clients can be exercised
/// against canned responses.
pub trait ContentTransport: Send + Sync {
    fn generate_content(&self, model: &str, payload: &Value) -> Result<Value>;
}

pub struct GeminiTransport {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl GeminiTransport {
    pub fn new(api_base: &str, api_key: &str) -> Result<Self> {
        // Analysis with a thinking budget routinely takes longer than
        // reqwest's default 30s; the session never times a call out itself.
        let http = HttpClient::builder()
            .timeout(None::<Duration>)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            http,
        })
    }

    pub fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

impl ContentTransport for GeminiTransport {
    fn generate_content(&self, model: &str, payload: &Value) -> Result<Value> {
        let endpoint = self.endpoint_for_model(model);
        debug!(%endpoint, "sending generateContent request");
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(payload)
            .send()
            // The URL carries the API key as a query parameter.
            .map_err(|err| anyhow::Error::new(err.without_url()))
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_json_or_error("Gemini", response)
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(|err| anyhow::Error::new(err.without_url()))
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Concatenated non-thought text of the first candidate.
pub(crate) fn candidate_text(response: &Value) -> String {
    response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Policy block signalled in the payload itself rather than as an HTTP error.
pub(crate) fn block_reason(response: &Value) -> Option<String> {
    if let Some(reason) = response
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
        .filter(|reason| !reason.trim().is_empty())
    {
        return Some(reason.to_string());
    }
    response
        .get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|candidate| candidate.get("finishReason").and_then(Value::as_str))
        .find(|reason| SAFETY_FINISH_REASONS.contains(reason))
        .map(str::to_string)
}

pub(crate) fn mentions_policy_block(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("safety") || lowered.contains("blocked")
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() || parts.last().is_some_and(|last| last == trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        block_reason, candidate_text, error_chain_text, mentions_policy_block, truncate_text,
        GeminiTransport,
    };

    #[test]
    fn endpoint_accepts_bare_and_prefixed_model_names() -> anyhow::Result<()> {
        let transport = GeminiTransport::new("https://example.test/v1beta/", "key")?;
        assert_eq!(
            transport.endpoint_for_model("gemini-3-pro-preview"),
            "https://example.test/v1beta/models/gemini-3-pro-preview:generateContent"
        );
        assert_eq!(
            transport.endpoint_for_model(" models/gemini-2.5-flash "),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        Ok(())
    }

    #[test]
    fn candidate_text_skips_thoughts_and_joins_parts() {
        let response = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "planning...", "thought": true},
                    {"text": "{\"a\":"},
                    {"text": "1}"}
                ]}
            }]
        });
        assert_eq!(candidate_text(&response), "{\"a\":1}");
        assert_eq!(candidate_text(&json!({})), "");
    }

    #[test]
    fn block_reason_reads_prompt_feedback_and_finish_reason() {
        assert_eq!(
            block_reason(&json!({"promptFeedback": {"blockReason": "SAFETY"}})).as_deref(),
            Some("SAFETY")
        );
        assert_eq!(
            block_reason(&json!({"candidates": [{"finishReason": "PROHIBITED_CONTENT"}]}))
                .as_deref(),
            Some("PROHIBITED_CONTENT")
        );
        assert!(block_reason(&json!({"candidates": [{"finishReason": "STOP"}]})).is_none());
    }

    #[test]
    fn policy_markers_are_case_insensitive() {
        assert!(mentions_policy_block("Response was Blocked by policy"));
        assert!(mentions_policy_block("SAFETY filter triggered"));
        assert!(!mentions_policy_block("connection reset by peer"));
    }

    #[test]
    fn error_chain_text_keeps_nested_contexts_once() {
        let err = anyhow::anyhow!("socket closed")
            .context("Gemini request failed (https://example.test)")
            .context("Gemini request failed (https://example.test)");
        let rendered = error_chain_text(&err, 400);
        assert_eq!(
            rendered,
            "Gemini request failed (https://example.test) | caused by: socket closed"
        );
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
