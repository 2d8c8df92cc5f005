use axum::{extract::State, Json};
use serde::Deserialize;

use crate::errors::AppError;
use crate::optimize::{JobMetadata, OptimizationBundle, Optimizer, OptimizerSettings, SourceMaterial};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub sources: Vec<SourceMaterial>,
    pub job: JobMetadata,
}

/// POST /api/v1/optimize
pub async fn handle_optimize(
    State(state): State<AppState>,
    Json(req): Json<OptimizeRequest>,
) -> Result<Json<OptimizationBundle>, AppError> {
    if req.job.cleaned_description.trim().is_empty() {
        return Err(AppError::Validation("job.cleaned_description is required".to_string()));
    }
    let invoker = state.orchestrator();
    let optimizer = Optimizer::new(&invoker, &state.prompts, OptimizerSettings::from_config(&state.config));
    let bundle = optimizer.optimize(&req.sources, &req.job).await?;
    Ok(Json(bundle))
}
