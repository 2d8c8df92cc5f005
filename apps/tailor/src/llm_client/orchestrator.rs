//! Call Orchestrator: whole-call retry with capped exponential backoff.
//!
//! The gateway already retries transport hiccups; this layer retries any failed attempt
//! (including invalid responses) up to `max_attempts`, tags every attempt with one call-id,
//! and writes the request/response/error audit trail.
//!
//! Each logical job owns its own orchestrator. Only the gateway (and its connection pool)
//! and the audit sink are shared.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rand::seq::SliceRandom;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::llm_client::audit::{AuditEndpoint, AuditEntry, AuditSink};
use crate::llm_client::backoff::BackoffPolicy;
use crate::llm_client::gateway::{CallRequest, CallResult, GatewayError, ModelGateway};

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("API call {call_id} failed after {attempts} attempts. Last error: {source}")]
    Exhausted {
        call_id: String,
        attempts: u32,
        #[source]
        source: GatewayError,
    },
}

pub struct CallOrchestrator {
    gateway: Arc<dyn ModelGateway>,
    audit: Arc<dyn AuditSink>,
    default_model: String,
    model_candidates: Vec<String>,
    max_attempts: u32,
    backoff: BackoffPolicy,
    sequence: AtomicU64,
}

impl CallOrchestrator {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        audit: Arc<dyn AuditSink>,
        default_model: impl Into<String>,
        max_attempts: u32,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            gateway,
            audit,
            default_model: default_model.into(),
            model_candidates: Vec::new(),
            max_attempts: max_attempts.max(1),
            backoff,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn from_config(
        config: &Config,
        gateway: Arc<dyn ModelGateway>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self::new(
            gateway,
            audit,
            config.default_model.clone(),
            config.retry.max_attempts,
            config.retry.policy(),
        )
        .with_candidates(config.model_candidates.clone())
    }

    /// Models drawn from when a call names none. Empty means `default_model` every time.
    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.model_candidates = candidates;
        self
    }

    #[cfg(test)]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn pick_model(&self) -> String {
        self.model_candidates
            .choose(&mut rand::thread_rng())
            .unwrap_or(&self.default_model)
            .clone()
    }

    /// Sends the prompt and returns the text content of the first successful attempt.
    pub async fn invoke(
        &self,
        prompt: &str,
        system_message: Option<&str>,
        model: Option<&str>,
    ) -> Result<String, InvokeError> {
        self.invoke_result(prompt, system_message, model)
            .await
            .map(|result| result.content)
    }

    /// Like `invoke`, but returns the full normalized result.
    pub async fn invoke_result(
        &self,
        prompt: &str,
        system_message: Option<&str>,
        model: Option<&str>,
    ) -> Result<CallResult, InvokeError> {
        let call_id = self.next_call_id();
        let model = match model {
            Some(model) => model.to_string(),
            None => self.pick_model(),
        };
        let request_payload = json!({
            "prompt": prompt,
            "system_message": system_message.unwrap_or_default(),
            "model": model,
        });

        info!(call_id = %call_id, model = %model, "Initiating API call");

        let mut attempt = 1;
        loop {
            let request = CallRequest {
                call_id: call_id.clone(),
                attempt,
                prompt: prompt.to_string(),
                system_message: system_message.map(String::from),
                model: model.clone(),
            };

            debug!(call_id = %call_id, attempt, max_attempts = self.max_attempts, "API call attempt");
            self.record_audit(&request, AuditEndpoint::Request, request_payload.clone(), Value::Null, None);

            match self.gateway.complete(&request).await {
                Ok(result) => {
                    let response_payload = json!({
                        "content": result.content,
                        "model": result.model,
                        "usage": result.usage,
                        "finish_reason": result.finish_reason,
                        "latency_secs": result.latency.as_secs_f64(),
                    });
                    self.record_audit(&request, AuditEndpoint::Response, request_payload, response_payload, None);
                    info!(
                        call_id = %call_id,
                        attempt,
                        latency_ms = result.latency.as_millis() as u64,
                        "API call completed"
                    );
                    return Ok(result);
                }
                Err(e) => {
                    self.record_audit(
                        &request,
                        AuditEndpoint::Error,
                        request_payload.clone(),
                        Value::Null,
                        Some(e.to_string()),
                    );

                    if attempt >= self.max_attempts {
                        error!(
                            call_id = %call_id,
                            attempts = attempt,
                            "API call failed after {} attempts. Last error: {e}",
                            attempt
                        );
                        return Err(InvokeError::Exhausted {
                            call_id,
                            attempts: attempt,
                            source: e,
                        });
                    }

                    let delay = self.backoff.delay(attempt);
                    warn!(
                        call_id = %call_id,
                        attempt,
                        "API call attempt failed: {e}. Retrying in {:.1}s",
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn next_call_id(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}_{seq:04}", Utc::now().format("%Y%m%d_%H%M%S_%6f"))
    }

    fn record_audit(
        &self,
        request: &CallRequest,
        endpoint: AuditEndpoint,
        request_payload: Value,
        response_payload: Value,
        error: Option<String>,
    ) {
        self.audit.record(&AuditEntry {
            timestamp: Utc::now(),
            call_id: request.call_id.clone(),
            attempt: request.attempt,
            endpoint,
            model: request.model.clone(),
            provider: self.gateway.provider().to_string(),
            request: request_payload,
            response: response_payload,
            success: error.is_none(),
            error,
        });
    }
}
