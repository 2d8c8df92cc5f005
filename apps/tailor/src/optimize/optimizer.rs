//! Optimization Orchestrator: tailors pooled source material to one job posting.
//!
//! Flow: select_top_sources → gather pool → objective → skills → bullets → evaluation.
//!
//! Stages run strictly in sequence on one CallOrchestrator. Any stage failure aborts the
//! job; a bundle is only constructed after all four stages have passed.

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::config::{Config, ContentLimits};
use crate::llm_client::orchestrator::{CallOrchestrator, InvokeError};
use crate::llm_client::prompts::{PromptError, PromptStore, BULLETS, EVALUATION, OBJECTIVE, SKILLS};
use crate::optimize::models::{BulletRecord, JobMetadata, OptimizationBundle, SourceMaterial};
use crate::optimize::selection::{select_top_sources, CandidatePool};
use crate::refine::{RefineError, RefinementEngine};
use crate::sanitize::{evaluation_schema, extract_json_array, sanitize};

/// The skills stage must return exactly this many items.
pub const REQUIRED_SKILL_COUNT: usize = 10;

const MAX_MATCH_RATING: f64 = 100.0;

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("No source material provided")]
    NoSourceMaterial,

    #[error("No {0} found in the selected sources")]
    EmptyPool(&'static str),

    #[error("Expected {expected} skills, got {found}")]
    SkillCount { expected: usize, found: usize },

    #[error("Malformed bullets response: {0}")]
    MalformedBullets(String),

    #[error("Missing evaluation field: {0}")]
    MissingEvaluationField(&'static str),

    #[error("Invalid match rating: {0}")]
    InvalidRating(String),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error(transparent)]
    Refine(#[from] RefineError),
}

impl OptimizeError {
    /// Cardinality and structure violations: the model answered, but not in the required shape.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            OptimizeError::SkillCount { .. }
                | OptimizeError::MalformedBullets(_)
                | OptimizeError::MissingEvaluationField(_)
                | OptimizeError::InvalidRating(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    pub top_n: usize,
    pub iteration_limit: u32,
    pub limits: ContentLimits,
}

impl OptimizerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_n: config.top_source_count,
            iteration_limit: config.iteration_limit,
            limits: config.limits.clone(),
        }
    }
}

struct Evaluation {
    match_rating: f64,
    explanation: String,
}

pub struct Optimizer<'a> {
    invoker: &'a CallOrchestrator,
    prompts: &'a PromptStore,
    settings: OptimizerSettings,
}

impl<'a> Optimizer<'a> {
    pub fn new(invoker: &'a CallOrchestrator, prompts: &'a PromptStore, settings: OptimizerSettings) -> Self {
        Self {
            invoker,
            prompts,
            settings,
        }
    }

    pub async fn optimize(
        &self,
        sources: &[SourceMaterial],
        job: &JobMetadata,
    ) -> Result<OptimizationBundle, OptimizeError> {
        let job_id = Uuid::new_v4();
        let span = tracing::info_span!("optimize", job_id = %job_id, jid = %job.jid);
        self.run(job_id, sources, job).instrument(span).await
    }

    async fn run(
        &self,
        job_id: Uuid,
        sources: &[SourceMaterial],
        job: &JobMetadata,
    ) -> Result<OptimizationBundle, OptimizeError> {
        if sources.is_empty() {
            return Err(OptimizeError::NoSourceMaterial);
        }

        let selected = select_top_sources(sources, self.settings.top_n);
        let pool = CandidatePool::gather(&selected);
        info!(
            selected = selected.len(),
            objectives = pool.objectives.len(),
            skills = pool.skills.len(),
            bullets = pool.bullets.len(),
            "Starting match optimization for {}",
            job.title
        );

        let description = job.cleaned_description.as_str();
        let objective = self.optimize_objective(&pool, description).await?;
        let skills = self.optimize_skills(&pool, description).await?;
        let bullets = self.optimize_bullets(&pool, description).await?;
        let evaluation = self.evaluate(&objective, &skills, &bullets, description).await?;

        info!(match_rating = evaluation.match_rating, "Match optimization complete");

        Ok(OptimizationBundle {
            job_id,
            objective,
            skills,
            bullets,
            match_rating: evaluation.match_rating,
            explanation: evaluation.explanation,
            job: job.clone(),
        })
    }

    fn refiner(&self) -> RefinementEngine<'_> {
        RefinementEngine::new(self.invoker, self.prompts, self.settings.limits.clone())
    }

    async fn ask(&self, prompt_name: &str, vars: &[(&str, &str)]) -> Result<String, OptimizeError> {
        let rendered = self.prompts.render(prompt_name, vars)?;
        let reply = self
            .invoker
            .invoke(&rendered.prompt, Some(&rendered.system_message), None)
            .await?;
        Ok(reply.trim().to_string())
    }

    async fn optimize_objective(&self, pool: &CandidatePool, description: &str) -> Result<String, OptimizeError> {
        if pool.objectives.is_empty() {
            return Err(OptimizeError::EmptyPool("objective statements"));
        }
        let combined = pool.objectives.join("\n");
        let draft = self
            .ask(OBJECTIVE, &[("job_description", description), ("objectives", &combined)])
            .await?;
        let refined = self
            .refiner()
            .refine(&draft, "overview", self.settings.iteration_limit)
            .await?;
        info!(chars = refined.chars().count(), "Objective stage complete");
        Ok(refined)
    }

    async fn optimize_skills(&self, pool: &CandidatePool, description: &str) -> Result<Vec<String>, OptimizeError> {
        if pool.skills.is_empty() {
            return Err(OptimizeError::EmptyPool("skills"));
        }
        let available = pool.skills.join(", ");
        let reply = self
            .ask(SKILLS, &[("job_description", description), ("skills", &available)])
            .await?;
        let skills = parse_skill_list(&reply)?;
        info!(count = skills.len(), "Skills stage complete");
        Ok(skills)
    }

    async fn optimize_bullets(
        &self,
        pool: &CandidatePool,
        description: &str,
    ) -> Result<Vec<BulletRecord>, OptimizeError> {
        if pool.bullets.is_empty() {
            return Err(OptimizeError::EmptyPool("bullet points"));
        }
        let bullet_text = pool.bullet_text();
        let reply = self
            .ask(BULLETS, &[("job_description", description), ("bullets", &bullet_text)])
            .await?;
        let drafts = parse_bullet_array(&reply)?;

        let refiner = self.refiner();
        let mut bullets = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let bolded_overview = refiner
                .refine(&draft.bolded_overview, "bullet_overview", self.settings.iteration_limit)
                .await?;
            let description = refiner
                .refine(&draft.description, "bullet_description", self.settings.iteration_limit)
                .await?;
            bullets.push(BulletRecord {
                bolded_overview,
                description,
            });
        }
        info!(count = bullets.len(), "Bullets stage complete");
        Ok(bullets)
    }

    async fn evaluate(
        &self,
        objective: &str,
        skills: &[String],
        bullets: &[BulletRecord],
        description: &str,
    ) -> Result<Evaluation, OptimizeError> {
        let content = resume_content(objective, skills, bullets);
        let reply = self
            .ask(EVALUATION, &[("job_description", description), ("resume_content", &content)])
            .await?;
        parse_evaluation(&reply)
    }
}

/// Combined document handed to the evaluation prompt.
pub fn resume_content(objective: &str, skills: &[String], bullets: &[BulletRecord]) -> String {
    let experience = serde_json::to_string_pretty(bullets).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Objective:\n{objective}\n\nSkills:\n{}\n\nExperience:\n{experience}",
        skills.join(", ")
    )
}

/// Splits on commas and trims. No repair: any count other than ten is an error.
pub fn parse_skill_list(reply: &str) -> Result<Vec<String>, OptimizeError> {
    let skills: Vec<String> = reply.split(',').map(|s| s.trim().to_string()).collect();
    if skills.len() != REQUIRED_SKILL_COUNT {
        warn!(found = skills.len(), "Skills stage returned wrong count");
        return Err(OptimizeError::SkillCount {
            expected: REQUIRED_SKILL_COUNT,
            found: skills.len(),
        });
    }
    Ok(skills)
}

pub fn parse_bullet_array(reply: &str) -> Result<Vec<BulletRecord>, OptimizeError> {
    let items = extract_json_array(reply)
        .ok_or_else(|| OptimizeError::MalformedBullets("response is not a JSON array".to_string()))?;
    if items.is_empty() {
        return Err(OptimizeError::MalformedBullets("no bullets returned".to_string()));
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let field = |name: &str| -> Result<String, OptimizeError> {
                item.get(name)
                    .and_then(Value::as_str)
                    .map(String::from)
                    .ok_or_else(|| {
                        OptimizeError::MalformedBullets(format!("bullet {} is missing string field '{name}'", i + 1))
                    })
            };
            Ok(BulletRecord {
                bolded_overview: field("bolded_overview")?,
                description: field("description")?,
            })
        })
        .collect()
}

fn parse_evaluation(reply: &str) -> Result<Evaluation, OptimizeError> {
    let record = sanitize(reply, &evaluation_schema());
    for name in ["match_rating", "explanation"] {
        if !record.is_recovered(name) {
            return Err(OptimizeError::MissingEvaluationField(name));
        }
    }

    let raw = record.text("match_rating").trim();
    let match_rating = raw
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .map_err(|_| OptimizeError::InvalidRating(raw.to_string()))?;
    if !match_rating.is_finite() || !(0.0..=MAX_MATCH_RATING).contains(&match_rating) {
        return Err(OptimizeError::InvalidRating(raw.to_string()));
    }

    Ok(Evaluation {
        match_rating,
        explanation: record.text("explanation").to_string(),
    })
}
