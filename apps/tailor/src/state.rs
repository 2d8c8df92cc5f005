use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::{AuditSink, CallOrchestrator, HttpGateway, PromptStore};

/// Shared application state injected into all route handlers via Axum extractors.
///
/// Holds only what is safe to share across jobs: the pooled gateway, the audit sink and the
/// prompt store. Per-job call state lives in the orchestrator each request builds.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub gateway: Arc<HttpGateway>,
    pub audit: Arc<dyn AuditSink>,
    pub prompts: Arc<PromptStore>,
}

impl AppState {
    /// A fresh orchestrator for one logical job.
    pub fn orchestrator(&self) -> CallOrchestrator {
        CallOrchestrator::from_config(&self.config, self.gateway.clone(), self.audit.clone())
    }
}
