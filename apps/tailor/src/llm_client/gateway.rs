//! Model Gateway: the single place that speaks a provider wire format.
//!
//! Everything above this module sees only `CallRequest` in and `CallResult` out. Both supported
//! providers expose the OpenAI chat-completions shape, so dispatch differs only in URL and key.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

/// Transport-level tries per attempt (connect failures, 429 and 5xx).
const MAX_TRANSPORT_TRIES: u32 = 3;
const POOL_MAX_IDLE_PER_HOST: usize = 10;
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];
const PROBE_PROMPT: &str = "respond with \"working\" - do not add any other text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openrouter")]
    OpenRouter,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "openrouter" => Ok(Provider::OpenRouter),
            other => Err(GatewayError::UnsupportedProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unsupported LLM provider: {0}")]
    UnsupportedProvider(String),
}

/// One attempt of a logical call. Built fresh per attempt; the call-id is shared by all attempts.
#[derive(Debug, Clone, Serialize)]
pub struct CallRequest {
    pub call_id: String,
    pub attempt: u32,
    pub prompt: String,
    pub system_message: Option<String>,
    pub model: String,
}

impl CallRequest {
    /// Chat messages in provider order: optional system message, then the user prompt.
    pub fn messages(&self) -> Vec<Value> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_message {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": self.prompt}));
        messages
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Normalized result of one successful attempt.
#[derive(Debug, Clone, Serialize)]
pub struct CallResult {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: String,
    pub latency: Duration,
}

/// A model provider reachable by the call orchestrator.
///
/// Carried as `Arc<dyn ModelGateway>` so jobs share the pooled transport without sharing
/// any per-call state.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    fn provider(&self) -> Provider;

    async fn complete(&self, request: &CallRequest) -> Result<CallResult, GatewayError>;
}

/// HTTP gateway for OpenAI-compatible chat-completions endpoints.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    provider: Provider,
    api_url: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

impl HttpGateway {
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .build()?;

        Ok(Self {
            client,
            provider: config.provider,
            api_url: config.api_url().to_string(),
            api_key: config.api_key().to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Sends a minimal prompt and reports whether the model answered `working`.
    pub async fn probe(&self, model: &str) -> Result<bool, GatewayError> {
        let request = CallRequest {
            call_id: "probe".to_string(),
            attempt: 1,
            prompt: PROBE_PROMPT.to_string(),
            system_message: None,
            model: model.to_string(),
        };
        let result = self.send(&request, 10, 0.1).await?;
        Ok(is_probe_reply(&result.content))
    }

    async fn send(
        &self,
        request: &CallRequest,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<CallResult, GatewayError> {
        let body = json!({
            "model": request.model,
            "messages": request.messages(),
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let started = Instant::now();
        let mut last_error: Option<GatewayError> = None;

        for try_no in 0..MAX_TRANSPORT_TRIES {
            if try_no > 0 {
                // 1s, 2s
                let delay = Duration::from_millis(1000 * (1 << (try_no - 1)));
                warn!(
                    call_id = %request.call_id,
                    "Transport try {} failed, retrying after {}ms",
                    try_no,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) if e.is_connect() => {
                    last_error = Some(GatewayError::Http(e));
                    continue;
                }
                Err(e) => return Err(GatewayError::Http(e)),
            };

            let status = response.status();
            if is_retryable_status(status) {
                let message = response.text().await.unwrap_or_default();
                warn!(call_id = %request.call_id, "{} returned {}: {}", self.provider, status, message);
                last_error = Some(GatewayError::Api {
                    status: status.as_u16(),
                    message,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GatewayError::Api {
                    status: status.as_u16(),
                    message: provider_error_message(&body),
                });
            }

            let payload: Value = response.json().await?;
            let result = normalize_response(&payload, started.elapsed())?;

            debug!(
                call_id = %request.call_id,
                model = %result.model,
                prompt_tokens = result.usage.prompt_tokens,
                completion_tokens = result.usage.completion_tokens,
                "Provider call succeeded"
            );
            return Ok(result);
        }

        Err(last_error.unwrap_or_else(|| {
            GatewayError::InvalidResponse("transport retries exhausted".to_string())
        }))
    }
}

#[async_trait]
impl ModelGateway for HttpGateway {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn complete(&self, request: &CallRequest) -> Result<CallResult, GatewayError> {
        self.send(request, self.max_tokens, self.temperature).await
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status.as_u16())
}

/// Pulls `error.message` out of a provider error body when present.
fn provider_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Checks the structural contract of a chat-completions body.
pub fn validate_response(payload: &Value) -> Result<(), GatewayError> {
    let object = payload.as_object().ok_or_else(|| {
        GatewayError::InvalidResponse(format!("expected object response, got {payload}"))
    })?;

    let missing: Vec<&str> = ["choices", "usage", "model"]
        .into_iter()
        .filter(|k| !object.contains_key(*k))
        .collect();
    if !missing.is_empty() {
        return Err(GatewayError::InvalidResponse(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    let first = object["choices"]
        .as_array()
        .and_then(|choices| choices.first())
        .ok_or_else(|| GatewayError::InvalidResponse("empty choices in response".to_string()))?;

    if first.get("message").map_or(true, |m| !m.is_object()) {
        return Err(GatewayError::InvalidResponse(
            "invalid choice structure".to_string(),
        ));
    }
    Ok(())
}

/// Validates a provider body and folds it into a `CallResult`.
pub fn normalize_response(payload: &Value, latency: Duration) -> Result<CallResult, GatewayError> {
    validate_response(payload)?;

    let choice = &payload["choices"][0];
    let content = message_text(&choice["message"]["content"])
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| GatewayError::InvalidResponse("empty content".to_string()))?;

    let usage = serde_json::from_value::<TokenUsage>(payload["usage"].clone()).unwrap_or_default();

    Ok(CallResult {
        content,
        model: payload["model"].as_str().unwrap_or_default().to_string(),
        usage,
        finish_reason: choice["finish_reason"]
            .as_str()
            .unwrap_or("unknown")
            .to_string(),
        latency,
    })
}

/// Message content is either a plain string or a list of typed parts.
fn message_text(content: &Value) -> Option<String> {
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let text: Vec<&str> = parts
                .iter()
                .filter(|p| p.get("type").and_then(Value::as_str).unwrap_or("text") == "text")
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect();
            (!text.is_empty()).then(|| text.join(""))
        }
        _ => None,
    }
}

fn is_probe_reply(content: &str) -> bool {
    content
        .trim()
        .to_lowercase()
        .replace(['"', '\''], "")
        == "working"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(content: Value) -> Value {
        json!({
            "id": "chatcmpl-1",
            "model": "gpt-4-0613",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        })
    }

    #[test]
    fn test_provider_parse_is_case_insensitive() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!(" openrouter ".parse::<Provider>().unwrap(), Provider::OpenRouter);
        assert!(matches!(
            "anthropic".parse::<Provider>(),
            Err(GatewayError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn test_normalize_plain_string_content() {
        let result = normalize_response(&completion(json!("Hello")), Duration::from_millis(5)).unwrap();
        assert_eq!(result.content, "Hello");
        assert_eq!(result.model, "gpt-4-0613");
        assert_eq!(result.finish_reason, "stop");
        assert_eq!(result.usage.total_tokens, 17);
    }

    #[test]
    fn test_normalize_content_parts() {
        let parts = json!([
            {"type": "text", "text": "Hel"},
            {"type": "image_url", "image_url": {"url": "x"}},
            {"type": "text", "text": "lo"}
        ]);
        let result = normalize_response(&completion(parts), Duration::ZERO).unwrap();
        assert_eq!(result.content, "Hello");
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let err = validate_response(&json!({"choices": []})).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("usage") && msg.contains("model"), "{msg}");
    }

    #[test]
    fn test_validate_rejects_empty_choices() {
        let payload = json!({"choices": [], "usage": {}, "model": "m"});
        assert!(validate_response(&payload).is_err());
    }

    #[test]
    fn test_validate_rejects_choice_without_message() {
        let payload = json!({"choices": [{"text": "hi"}], "usage": {}, "model": "m"});
        assert!(validate_response(&payload).is_err());
    }

    #[test]
    fn test_normalize_rejects_blank_content() {
        assert!(normalize_response(&completion(json!("   ")), Duration::ZERO).is_err());
        assert!(normalize_response(&completion(Value::Null), Duration::ZERO).is_err());
    }

    #[test]
    fn test_messages_put_system_first() {
        let request = CallRequest {
            call_id: "c".to_string(),
            attempt: 1,
            prompt: "p".to_string(),
            system_message: Some("s".to_string()),
            model: "m".to_string(),
        };
        let messages = request.messages();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "p");
    }

    #[test]
    fn test_provider_error_message_extraction() {
        let body = r#"{"error": {"message": "Invalid API key"}}"#;
        assert_eq!(provider_error_message(body), "Invalid API key");
        assert_eq!(provider_error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_probe_reply_cleaning() {
        assert!(is_probe_reply("\"Working\"\n"));
        assert!(is_probe_reply("'working'"));
        assert!(!is_probe_reply("working!"));
    }
}
