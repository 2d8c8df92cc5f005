/// LLM Client: the single point of entry for all model calls.
///
/// ARCHITECTURAL RULE: No other module may talk to a provider directly.
/// Callers go through `CallOrchestrator::invoke`, which owns retries and the audit trail;
/// only `gateway` knows the wire format.
pub mod audit;
pub mod backoff;
pub mod gateway;
pub mod orchestrator;
pub mod prompts;

pub use audit::{AuditSink, CsvAuditSink};
pub use gateway::HttpGateway;
pub use orchestrator::CallOrchestrator;
pub use prompts::PromptStore;
