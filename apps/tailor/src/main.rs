mod config;
mod errors;
mod ingest;
mod llm_client;
mod optimize;
mod placeholder;
mod refine;
mod routes;
mod sanitize;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::{CsvAuditSink, HttpGateway, PromptStore};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing provider key or malformed numbers)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tailor v{}", env!("CARGO_PKG_VERSION"));

    // Prompt store: operator file if configured, built-in set otherwise
    let prompts = match &config.prompts_path {
        Some(path) => PromptStore::load(path)
            .with_context(|| format!("Failed to load prompts from {}", path.display()))?,
        None => PromptStore::builtin()?,
    };
    prompts.ensure_complete()?;
    info!("Prompt store loaded");

    // Audit trail (CSV, one row per request/response/error event)
    let audit = Arc::new(CsvAuditSink::new(config.audit_log_path.clone()));
    info!("Audit log: {}", audit.path().display());

    // Pooled provider gateway, shared by every job
    let gateway = Arc::new(HttpGateway::from_config(&config)?);
    info!(
        "LLM gateway initialized (provider: {}, default model: {}, candidates: {:?})",
        config.provider,
        config.default_model,
        config.model_candidates
    );

    let state = AppState {
        config: config.clone(),
        gateway,
        audit,
        prompts: Arc::new(prompts),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the frontend host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
