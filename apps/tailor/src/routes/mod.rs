pub mod extract;
pub mod health;
pub mod optimize;
pub mod templates;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/health/llm", get(health::llm_health_handler))
        // Tailoring
        .route("/api/v1/optimize", post(optimize::handle_optimize))
        // Extraction
        .route("/api/v1/extract/job", post(extract::handle_extract_job))
        .route("/api/v1/extract/source", post(extract::handle_extract_source))
        .route("/api/v1/extract/job/upload", post(extract::handle_upload_job))
        .route("/api/v1/extract/source/upload", post(extract::handle_upload_source))
        // Templates
        .route(
            "/api/v1/templates/validate",
            post(templates::handle_validate_template),
        )
        .route(
            "/api/v1/templates/render",
            post(templates::handle_render_template),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::test_config;
    use crate::llm_client::audit::MemoryAuditSink;
    use crate::llm_client::{HttpGateway, PromptStore};

    fn app() -> Router {
        let config = test_config();
        let state = AppState {
            gateway: Arc::new(HttpGateway::from_config(&config).unwrap()),
            audit: Arc::new(MemoryAuditSink::new()),
            prompts: Arc::new(PromptStore::builtin().unwrap()),
            config,
        };
        build_router(state)
    }

    async fn send(app: Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn template() -> String {
        let skills: String = (1..=10).map(|i| format!("<SKILL {i}> ")).collect();
        format!("<OverView>\n{skills}\n<Experience-Bullet1-BoldedOverview-J1>: <Experience-Bullet1-Description-J1>")
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_validate_template_route() {
        let (status, body) = send(app(), "POST", "/api/v1/templates/validate", json!({"template": template()})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], true);
        assert_eq!(body["skill_slots"], json!([1, 2, 3, 4, 5, 6, 7, 8, 9, 10]));
    }

    #[tokio::test]
    async fn test_render_rejects_invalid_template() {
        let bundle = json!({
            "job_id": "00000000-0000-0000-0000-000000000000",
            "objective": "o",
            "skills": [],
            "bullets": [],
            "match_rating": 50.0,
            "explanation": "",
            "job": {}
        });
        let (status, body) = send(
            app(),
            "POST",
            "/api/v1/templates/render",
            json!({"template": "<OverView>", "bundle": bundle}),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "UNPROCESSABLE_ENTITY");
    }

    #[tokio::test]
    async fn test_optimize_validates_before_calling_model() {
        let (status, body) = send(
            app(),
            "POST",
            "/api/v1/optimize",
            json!({"sources": [], "job": {"Title": "Engineer"}}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, _) = send(
            app(),
            "POST",
            "/api/v1/optimize",
            json!({"sources": [], "job": {"cleaned_description": "Build APIs"}}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_extract_requires_inline_text() {
        let (status, _) = send(app(), "POST", "/api/v1/extract/job", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // A server-side path is not an input; the body carries no text.
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("notes.txt");
        std::fs::write(&secret, "server-only contents").unwrap();
        let (status, body) = send(
            app(),
            "POST",
            "/api/v1/extract/source",
            json!({"file_path": secret}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(!body.to_string().contains("server-only contents"));
    }

    async fn upload(uri: &str, file_name: Option<&str>, content: &[u8]) -> (StatusCode, Value) {
        let boundary = "tailor-boundary";
        let disposition = match file_name {
            Some(name) => format!("form-data; name=\"file\"; filename=\"{name}\""),
            None => "form-data; name=\"note\"".to_string(),
        };
        let mut body = format!("--{boundary}\r\nContent-Disposition: {disposition}\r\n\r\n").into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_upload_without_file_field_is_rejected() {
        let (status, body) = upload("/api/v1/extract/job/upload", None, b"hello").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_upload_of_unreadable_file_is_unprocessable() {
        let (status, body) = upload("/api/v1/extract/source/upload", Some("resume.bin"), b"\x00\x01").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "UNPROCESSABLE_ENTITY");
    }
}
