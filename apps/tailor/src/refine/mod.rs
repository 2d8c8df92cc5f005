//! Refinement Engine: drives oversized text toward a category budget.
//!
//! Iteration k asks the model for a 10·k% reduction. The text is re-checked after every
//! shrink; once `max_iterations` shrinks have run without passing, a single summarization of
//! the ORIGINAL text replaces the result unconditionally.
//!
//! Budget ratios (words = chars/5, tokens = chars/4, 1.3 tokens per word) are calibrated
//! constants. Do not tune them.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ContentLimits;
use crate::llm_client::orchestrator::{CallOrchestrator, InvokeError};
use crate::llm_client::prompts::{PromptError, PromptStore, SECTION_REDUCTION, SECTION_SUMMARIZATION};

pub const DEFAULT_MAX_ITERATIONS: u32 = 2;

const TOKENS_PER_WORD: f64 = 1.3;
const CHARS_PER_WORD: usize = 5;
const CHARS_PER_TOKEN: usize = 4;
const REDUCTION_STEP_PERCENT: u32 = 10;

#[derive(Debug, Error)]
pub enum RefineError {
    #[error("Unknown section type: {0}")]
    UnknownCategory(String),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("Failed to refine section: {0}")]
    Invoke(#[from] InvokeError),
}

/// Approximate token count: 1.3 tokens per whitespace-delimited word, truncated.
pub fn estimate_tokens(text: &str) -> usize {
    (text.split_whitespace().count() as f64 * TOKENS_PER_WORD) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryBudget {
    pub max_chars: usize,
    pub max_words: usize,
    pub max_tokens: usize,
    pub tolerance: f64,
}

impl CategoryBudget {
    pub fn from_chars(max_chars: usize, tolerance: f64) -> Self {
        Self {
            max_chars,
            max_words: max_chars / CHARS_PER_WORD,
            max_tokens: max_chars / CHARS_PER_TOKEN,
            tolerance,
        }
    }

    /// Resolves a section name to its budget: `overview`, `skill*`, or `bullet*`.
    pub fn for_category(category: &str, limits: &ContentLimits) -> Result<Self, RefineError> {
        let max_chars = if category == "overview" {
            limits.max_overview_chars
        } else if category.starts_with("skill") {
            limits.max_skill_chars
        } else if category.starts_with("bullet") {
            limits.max_bullet_chars
        } else {
            return Err(RefineError::UnknownCategory(category.to_string()));
        };
        Ok(Self::from_chars(max_chars, limits.tolerance))
    }

    pub fn accepts(&self, text: &str) -> bool {
        let char_limit = self.max_chars as f64 * (1.0 + self.tolerance);
        text.chars().count() as f64 <= char_limit
            && text.split_whitespace().count() <= self.max_words
            && estimate_tokens(text) <= self.max_tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementStatus {
    Converged,
    FallbackApplied,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefinementOutcome {
    pub text: String,
    pub iterations: u32,
    pub status: RefinementStatus,
    pub original_chars: usize,
    pub final_chars: usize,
}

pub struct RefinementEngine<'a> {
    invoker: &'a CallOrchestrator,
    prompts: &'a PromptStore,
    limits: ContentLimits,
}

impl<'a> RefinementEngine<'a> {
    pub fn new(invoker: &'a CallOrchestrator, prompts: &'a PromptStore, limits: ContentLimits) -> Self {
        Self {
            invoker,
            prompts,
            limits,
        }
    }

    pub async fn refine(&self, text: &str, category: &str, max_iterations: u32) -> Result<String, RefineError> {
        self.refine_outcome(text, category, max_iterations)
            .await
            .map(|outcome| outcome.text)
    }

    pub async fn refine_outcome(
        &self,
        text: &str,
        category: &str,
        max_iterations: u32,
    ) -> Result<RefinementOutcome, RefineError> {
        let budget = CategoryBudget::for_category(category, &self.limits)?;
        let original_chars = text.chars().count();
        let mut current = text.to_string();
        let mut iterations = 0;

        loop {
            if budget.accepts(&current) {
                debug!(category, iterations, chars = current.chars().count(), "Section within limits");
                return Ok(RefinementOutcome {
                    final_chars: current.chars().count(),
                    text: current,
                    iterations,
                    status: RefinementStatus::Converged,
                    original_chars,
                });
            }
            if iterations >= max_iterations {
                break;
            }

            iterations += 1;
            let reduction = REDUCTION_STEP_PERCENT * iterations;
            current = self.reduce(&current, category, reduction).await?;
            debug!(
                category,
                iteration = iterations,
                chars = current.chars().count(),
                tokens = estimate_tokens(&current),
                "Section reduced by {reduction}%"
            );
        }

        let summary = self.summarize(text, category, budget.max_chars).await?;
        info!(
            category,
            iterations,
            original_chars,
            final_chars = summary.chars().count(),
            "Summarization fallback applied"
        );
        Ok(RefinementOutcome {
            final_chars: summary.chars().count(),
            text: summary,
            iterations,
            status: RefinementStatus::FallbackApplied,
            original_chars,
        })
    }

    async fn reduce(&self, text: &str, category: &str, reduction: u32) -> Result<String, RefineError> {
        let pct = reduction.to_string();
        let rendered = self.prompts.render(
            SECTION_REDUCTION,
            &[("section_name", category), ("reduction_percentage", &pct), ("text", text)],
        )?;
        let reply = self
            .invoker
            .invoke(&rendered.prompt, Some(&rendered.system_message), None)
            .await?;
        Ok(reply.trim().to_string())
    }

    async fn summarize(&self, original: &str, category: &str, max_chars: usize) -> Result<String, RefineError> {
        let max = max_chars.to_string();
        let rendered = self.prompts.render(
            SECTION_SUMMARIZATION,
            &[("section_name", category), ("max_chars", &max), ("text", original)],
        )?;
        let reply = self
            .invoker
            .invoke(&rendered.prompt, Some(&rendered.system_message), None)
            .await?;
        Ok(reply.trim().to_string())
    }
}
