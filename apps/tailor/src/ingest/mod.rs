//! Ingestion: raw posting/resume text → typed records via the model and the sanitizer.

pub mod text;

use chrono::Local;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::llm_client::orchestrator::{CallOrchestrator, InvokeError};
use crate::llm_client::prompts::{PromptError, PromptStore, JOB_EXTRACTION, RESUME_EXTRACTION};
use crate::optimize::models::{JobEntry, JobMetadata, SourceMaterial};
use crate::sanitize::{job_schema, sanitize, source_schema};

pub use text::extract_text;

const APPLY_BY: &str = "Apply by";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("No text to extract from")]
    EmptyInput,

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

async fn ask(
    invoker: &CallOrchestrator,
    prompts: &PromptStore,
    prompt_name: &str,
    raw_text: &str,
) -> Result<String, IngestError> {
    if raw_text.trim().is_empty() {
        return Err(IngestError::EmptyInput);
    }
    let rendered = prompts.render(prompt_name, &[("raw_text", raw_text)])?;
    Ok(invoker
        .invoke(&rendered.prompt, Some(&rendered.system_message), None)
        .await?)
}

/// Extracts posting details. Fields the model could not supply read "UNKNOWN".
pub async fn extract_job(
    invoker: &CallOrchestrator,
    prompts: &PromptStore,
    raw_text: &str,
    file_name: &str,
) -> Result<JobMetadata, IngestError> {
    let reply = ask(invoker, prompts, JOB_EXTRACTION, raw_text).await?;
    let record = sanitize(&reply, &job_schema());

    let job = JobMetadata {
        jid: Local::now().format("%Y%m%d_%H%M%S").to_string(),
        title: record.text("Title").to_string(),
        company: record.text("Company Name").to_string(),
        location: record.text("Location").to_string(),
        field: record.text("field").to_string(),
        salary: record.text("Salary").to_string(),
        posting_date: normalize_posting_date(record.text("posting_date")),
        cleaned_description: record.text("cleaned_description").to_string(),
        source_file: file_name.to_string(),
    };
    info!(jid = %job.jid, tier = ?record.tier(), "Extracted job posting {}", job.title);
    Ok(job)
}

/// Extracts a resume into source material. Malformed job entries degrade to empty fields.
pub async fn extract_source(
    invoker: &CallOrchestrator,
    prompts: &PromptStore,
    raw_text: &str,
    file_name: &str,
) -> Result<SourceMaterial, IngestError> {
    let reply = ask(invoker, prompts, RESUME_EXTRACTION, raw_text).await?;
    let record = sanitize(&reply, &source_schema());

    let source = SourceMaterial {
        id: Uuid::new_v4(),
        objective: record.text("objective").trim().to_string(),
        skills_list: record.strings("skills_list"),
        jobs_section: record.list("jobs_section").iter().map(JobEntry::from_value).collect(),
        education: record.strings("education"),
        certifications: record.strings("certifications"),
        usage_count: 0,
        source_file: file_name.to_string(),
    };
    info!(
        source_id = %source.id,
        tier = ?record.tier(),
        skills = source.skills_list.len(),
        jobs = source.jobs_section.len(),
        "Extracted resume {file_name}"
    );
    Ok(source)
}

/// "Posted today. Apply by 03/01/2025" → "03/01/2025"
pub fn normalize_posting_date(raw: &str) -> String {
    match raw.rsplit_once(APPLY_BY) {
        Some((_, after)) => after.trim().to_string(),
        None => raw.to_string(),
    }
}
