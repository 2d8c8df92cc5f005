use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

/// GET /health
/// Returns a simple status object with service version.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "tailor"
    }))
}

/// GET /health/llm
/// Sends the connectivity probe to the configured provider. Never retried.
pub async fn llm_health_handler(State(state): State<AppState>) -> Json<Value> {
    let model = state.config.selected_model().to_string();
    let provider = state.config.provider.as_str();
    match state.gateway.probe(&model).await {
        Ok(working) => Json(json!({
            "status": probe_status(working),
            "provider": provider,
            "model": model,
            "working": working
        })),
        Err(e) => {
            warn!("LLM connectivity probe failed: {e}");
            Json(json!({
                "status": "unavailable",
                "provider": provider,
                "model": model,
                "working": false,
                "error": e.to_string()
            }))
        }
    }
}

fn probe_status(working: bool) -> &'static str {
    if working {
        "ok"
    } else {
        "degraded"
    }
}
