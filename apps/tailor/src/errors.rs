use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ingest::IngestError;
use crate::llm_client::gateway::GatewayError;
use crate::llm_client::orchestrator::InvokeError;
use crate::llm_client::prompts::PromptError;
use crate::optimize::OptimizeError;
use crate::placeholder::PlaceholderError;
use crate::refine::RefineError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        AppError::Llm(e.to_string())
    }
}

impl From<InvokeError> for AppError {
    fn from(e: InvokeError) -> Self {
        AppError::Llm(e.to_string())
    }
}

impl From<PromptError> for AppError {
    fn from(e: PromptError) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<PlaceholderError> for AppError {
    fn from(e: PlaceholderError) -> Self {
        AppError::UnprocessableEntity(e.to_string())
    }
}

impl From<RefineError> for AppError {
    fn from(e: RefineError) -> Self {
        match e {
            RefineError::UnknownCategory(_) => AppError::Validation(e.to_string()),
            RefineError::Prompt(e) => e.into(),
            RefineError::Invoke(e) => e.into(),
        }
    }
}

impl From<OptimizeError> for AppError {
    fn from(e: OptimizeError) -> Self {
        if e.is_invariant_violation() {
            return AppError::UnprocessableEntity(e.to_string());
        }
        match e {
            OptimizeError::NoSourceMaterial | OptimizeError::EmptyPool(_) => AppError::Validation(e.to_string()),
            OptimizeError::Prompt(e) => e.into(),
            OptimizeError::Invoke(e) => e.into(),
            OptimizeError::Refine(e) => e.into(),
            other => AppError::UnprocessableEntity(other.to_string()),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::EmptyInput => AppError::Validation(e.to_string()),
            IngestError::Prompt(e) => e.into(),
            IngestError::Invoke(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::Config(msg) => {
                tracing::error!("Configuration error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "The service is misconfigured".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skill_count_maps_to_422() {
        let err: AppError = OptimizeError::SkillCount { expected: 10, found: 9 }.into();
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_empty_pool_maps_to_400() {
        let err: AppError = OptimizeError::EmptyPool("skills").into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_missing_prompt_is_config_error() {
        let err: AppError = OptimizeError::Prompt(PromptError::Missing("skills_prompt".into())).into();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_exhaustion_is_llm_error() {
        let err: AppError = InvokeError::Exhausted {
            call_id: "c".into(),
            attempts: 5,
            source: GatewayError::InvalidResponse("bad".into()),
        }
        .into();
        assert!(matches!(err, AppError::Llm(msg) if msg.contains("after 5 attempts")));
    }
}
