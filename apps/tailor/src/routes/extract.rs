use std::io::Write;
use std::path::Path;

use anyhow::anyhow;
use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::ingest::{extract_job, extract_source, extract_text};
use crate::optimize::{JobMetadata, SourceMaterial};
use crate::state::AppState;

/// Inline posting or resume text. Files go through the multipart upload routes instead.
#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl ExtractRequest {
    fn into_text(self) -> Result<(String, String), AppError> {
        match self.raw_text {
            Some(text) => Ok((text, self.file_name.unwrap_or_default())),
            None => Err(AppError::Validation("raw_text is required".to_string())),
        }
    }
}

/// POST /api/v1/extract/job
pub async fn handle_extract_job(
    State(state): State<AppState>,
    Json(req): Json<ExtractRequest>,
) -> Result<Json<JobMetadata>, AppError> {
    let (raw_text, file_name) = req.into_text()?;
    job_from_text(&state, &raw_text, &file_name).await
}

/// POST /api/v1/extract/source
pub async fn handle_extract_source(
    State(state): State<AppState>,
    Json(req): Json<ExtractRequest>,
) -> Result<Json<SourceMaterial>, AppError> {
    let (raw_text, file_name) = req.into_text()?;
    source_from_text(&state, &raw_text, &file_name).await
}

/// POST /api/v1/extract/job/upload (multipart, first file field)
pub async fn handle_upload_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<JobMetadata>, AppError> {
    let (raw_text, file_name) = read_upload(multipart).await?;
    job_from_text(&state, &raw_text, &file_name).await
}

/// POST /api/v1/extract/source/upload (multipart, first file field)
pub async fn handle_upload_source(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<SourceMaterial>, AppError> {
    let (raw_text, file_name) = read_upload(multipart).await?;
    source_from_text(&state, &raw_text, &file_name).await
}

async fn job_from_text(state: &AppState, raw_text: &str, file_name: &str) -> Result<Json<JobMetadata>, AppError> {
    let invoker = state.orchestrator();
    let job = extract_job(&invoker, &state.prompts, raw_text, file_name).await?;
    Ok(Json(job))
}

async fn source_from_text(
    state: &AppState,
    raw_text: &str,
    file_name: &str,
) -> Result<Json<SourceMaterial>, AppError> {
    let invoker = state.orchestrator();
    let source = extract_source(&invoker, &state.prompts, raw_text, file_name).await?;
    Ok(Json(source))
}

/// Text of the first multipart field that carries a file name.
async fn read_upload(mut multipart: Multipart) -> Result<(String, String), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?
    {
        let Some(file_name) = field.file_name().map(String::from) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?;
        let text = extract_upload(&file_name, bytes.to_vec()).await?;
        return Ok((text, file_name));
    }
    Err(AppError::Validation("upload has no file field".to_string()))
}

/// Stages the bytes in a temp file named with the upload's extension, then extracts.
async fn extract_upload(file_name: &str, bytes: Vec<u8>) -> Result<String, AppError> {
    let suffix = upload_suffix(file_name);
    // PDF parsing is CPU-bound and synchronous
    let text = tokio::task::spawn_blocking(move || -> std::io::Result<Option<String>> {
        let mut staged = tempfile::Builder::new()
            .prefix("tailor-upload-")
            .suffix(&suffix)
            .tempfile()?;
        staged.write_all(&bytes)?;
        staged.flush()?;
        Ok(extract_text(staged.path()))
    })
    .await
    .map_err(|e| AppError::Internal(anyhow!("text extraction task failed: {e}")))?
    .map_err(|e| AppError::Internal(anyhow!("failed to stage upload: {e}")))?;

    text.ok_or_else(|| AppError::UnprocessableEntity(format!("Could not read text from {file_name}")))
}

/// ".ext" from the client's file name; anything but a plain alphanumeric extension is dropped.
fn upload_suffix(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_suffix() {
        assert_eq!(upload_suffix("Resume.PDF"), ".pdf");
        assert_eq!(upload_suffix("posting.txt"), ".txt");
        assert_eq!(upload_suffix("no_extension"), "");
        assert_eq!(upload_suffix("weird.t/xt"), "");
    }

    #[tokio::test]
    async fn test_extract_upload_reads_staged_text() {
        let text = extract_upload("posting.txt", b"Platform Engineer\nRemote".to_vec())
            .await
            .unwrap();
        assert_eq!(text, "Platform Engineer\nRemote");
    }

    #[tokio::test]
    async fn test_extract_upload_rejects_unsupported_kind() {
        let err = extract_upload("blob.bin", vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, AppError::UnprocessableEntity(_)));
    }
}
