use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::optimize::OptimizationBundle;
use crate::placeholder::{extract_slots, pair_by_length, render_template, validate_template, Pairing};

#[derive(Debug, Deserialize)]
pub struct ValidateTemplateRequest {
    pub template: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateTemplateResponse {
    pub valid: bool,
    pub skill_slots: Vec<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RenderTemplateRequest {
    pub template: String,
    pub bundle: OptimizationBundle,
}

#[derive(Debug, Serialize)]
pub struct RenderTemplateResponse {
    pub rendered: String,
    pub skill_pairs: Pairing,
}

/// POST /api/v1/templates/validate
pub async fn handle_validate_template(Json(req): Json<ValidateTemplateRequest>) -> Json<ValidateTemplateResponse> {
    let valid = validate_template(&req.template);
    let skill_slots = extract_slots(&req.template).into_keys().collect();
    Json(ValidateTemplateResponse { valid, skill_slots })
}

/// POST /api/v1/templates/render
pub async fn handle_render_template(
    Json(req): Json<RenderTemplateRequest>,
) -> Result<Json<RenderTemplateResponse>, AppError> {
    let rendered = render_template(&req.template, &req.bundle)?;
    let skill_pairs = pair_by_length(&extract_slots(&req.template), &req.bundle.skills);
    Ok(Json(RenderTemplateResponse { rendered, skill_pairs }))
}
