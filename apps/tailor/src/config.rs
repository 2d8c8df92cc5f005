use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

use crate::llm_client::backoff::BackoffPolicy;
use crate::llm_client::gateway::Provider;
use crate::refine::DEFAULT_MAX_ITERATIONS;

/// Upper bound for any configured backoff delay, in seconds.
const MAX_BACKOFF_SECS: f64 = 3600.0;

/// Application configuration loaded from environment variables.
/// Fails at startup if the selected provider has no API key.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    pub openai_api_key: String,
    pub openrouter_api_key: String,
    pub openai_api_url: String,
    pub openrouter_api_url: String,
    pub default_model: String,
    /// Optional candidate list; calls that name no model draw one from it at random.
    pub model_candidates: Vec<String>,
    pub api_timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub retry: RetrySettings,
    pub limits: ContentLimits,
    pub top_source_count: usize,
    pub iteration_limit: u32,
    pub prompts_path: Option<PathBuf>,
    pub audit_log_path: PathBuf,
    pub port: u16,
    pub rust_log: String,
}

/// Whole-call retry settings for the call orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_secs: f64,
    pub max_delay_secs: f64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_secs: 2.0,
            max_delay_secs: 60.0,
            multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay_secs: self.initial_delay_secs,
            multiplier: self.multiplier,
            max_delay_secs: self.max_delay_secs,
        }
    }
}

/// Per-category character ceilings used by the refinement engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentLimits {
    pub max_overview_chars: usize,
    pub max_skill_chars: usize,
    pub max_bullet_chars: usize,
    pub tolerance: f64,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            max_overview_chars: 500,
            max_skill_chars: 50,
            max_bullet_chars: 200,
            tolerance: 0.1,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let provider: Provider = optional_env("LLM_PROVIDER")
            .unwrap_or_else(|| "openai".to_string())
            .parse()?;

        let config = Config {
            provider,
            openai_api_key: optional_env("API_KEY_OPENAI").unwrap_or_default(),
            openrouter_api_key: optional_env("API_KEY_OPENROUTER").unwrap_or_default(),
            openai_api_url: optional_env("OPENAI_API_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string()),
            openrouter_api_url: optional_env("OPENROUTER_API_URL")
                .unwrap_or_else(|| "https://openrouter.ai/api/v1/chat/completions".to_string()),
            default_model: optional_env("DEFAULT_MODEL").unwrap_or_else(|| "gpt-4".to_string()),
            model_candidates: optional_env("MODEL_CANDIDATES")
                .map(|raw| parse_list(&raw))
                .unwrap_or_default(),
            api_timeout_secs: parse_env("API_TIMEOUT", 30)?,
            max_tokens: parse_env("MAX_TOKENS", 512)?,
            temperature: parse_env("TEMPERATURE", 0.7)?,
            retry: RetrySettings {
                max_attempts: parse_env("API_MAX_ATTEMPTS", 5)?,
                initial_delay_secs: parse_env("API_INITIAL_DELAY", 2.0)?,
                max_delay_secs: parse_env("API_MAX_DELAY", 60.0)?,
                multiplier: parse_env("API_BACKOFF_MULTIPLIER", 2.0)?,
            },
            limits: ContentLimits {
                max_overview_chars: parse_env("MAX_OVERVIEW_CHARS", 500)?,
                max_skill_chars: parse_env("MAX_SKILL_CHARS", 50)?,
                max_bullet_chars: parse_env("MAX_BULLET_CHARS", 200)?,
                tolerance: parse_env("CONTENT_TOLERANCE", 0.1)?,
            },
            top_source_count: parse_env("TOP_RESUME_COUNT", 5)?,
            iteration_limit: parse_env("ITERATION_LIMIT", DEFAULT_MAX_ITERATIONS)?,
            prompts_path: optional_env("PROMPTS_PATH").map(PathBuf::from),
            audit_log_path: optional_env("AUDIT_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("LOGS/api_calls.csv")),
            port: parse_env("PORT", 8080)?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field invariants that cannot be expressed by parsing alone.
    pub fn validate(&self) -> Result<()> {
        if self.api_key().is_empty() {
            bail!(
                "API key for selected provider ({}) is missing",
                self.provider.as_str()
            );
        }
        if self.retry.max_attempts == 0 {
            bail!("API_MAX_ATTEMPTS must be at least 1");
        }
        let retry = &self.retry;
        for (key, secs) in [
            ("API_INITIAL_DELAY", retry.initial_delay_secs),
            ("API_MAX_DELAY", retry.max_delay_secs),
        ] {
            if !(0.0..=MAX_BACKOFF_SECS).contains(&secs) {
                bail!("{key} must be between 0 and {MAX_BACKOFF_SECS} seconds, got {secs}");
            }
        }
        if !retry.multiplier.is_finite() || retry.multiplier <= 0.0 {
            bail!("API_BACKOFF_MULTIPLIER must be a positive number, got {}", retry.multiplier);
        }
        if !self.limits.tolerance.is_finite() || self.limits.tolerance < 0.0 {
            bail!("CONTENT_TOLERANCE must not be negative");
        }
        Ok(())
    }

    /// API key of the configured provider.
    pub fn api_key(&self) -> &str {
        match self.provider {
            Provider::OpenAi => &self.openai_api_key,
            Provider::OpenRouter => &self.openrouter_api_key,
        }
    }

    /// Endpoint URL of the configured provider.
    pub fn api_url(&self) -> &str {
        match self.provider {
            Provider::OpenAi => &self.openai_api_url,
            Provider::OpenRouter => &self.openrouter_api_url,
        }
    }

    /// Model the connectivity probe and the startup log report: first candidate, else the default.
    pub fn selected_model(&self) -> &str {
        self.model_candidates
            .first()
            .map(String::as_str)
            .unwrap_or(&self.default_model)
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        None => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        provider: Provider::OpenAi,
        openai_api_key: "sk-test".to_string(),
        openrouter_api_key: String::new(),
        openai_api_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
        openrouter_api_url: "http://127.0.0.1:9/api/v1/chat/completions".to_string(),
        default_model: "gpt-4".to_string(),
        model_candidates: vec![],
        api_timeout_secs: 30,
        max_tokens: 512,
        temperature: 0.7,
        retry: RetrySettings::default(),
        limits: ContentLimits::default(),
        top_source_count: 5,
        iteration_limit: 2,
        prompts_path: None,
        audit_log_path: PathBuf::from("LOGS/api_calls.csv"),
        port: 8080,
        rust_log: "info".to_string(),
    }
}
