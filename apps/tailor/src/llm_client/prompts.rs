//! Prompt template store.
//!
//! A name → {prompt, system_message} map loaded once per process. The built-in set ships with
//! the binary; `PROMPTS_PATH` replaces it with an operator-supplied JSON file of the same shape.
//! A missing name is a configuration error and is never retried.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

const BUILTIN_PROMPTS: &str = include_str!("../../prompts/all_prompts.json");

pub const SECTION_REDUCTION: &str = "section_reduction_prompt";
pub const SECTION_SUMMARIZATION: &str = "section_summarization_prompt";
pub const OBJECTIVE: &str = "objective_prompt";
pub const SKILLS: &str = "skills_prompt";
pub const BULLETS: &str = "bullets_prompt";
pub const EVALUATION: &str = "evaluation_prompt";
pub const JOB_EXTRACTION: &str = "job_extraction_prompt";
pub const RESUME_EXTRACTION: &str = "resume_extraction_prompt";

/// Names every stage of the pipeline looks up. Checked at startup.
pub const REQUIRED_PROMPTS: [&str; 8] = [
    SECTION_REDUCTION,
    SECTION_SUMMARIZATION,
    OBJECTIVE,
    SKILLS,
    BULLETS,
    EVALUATION,
    JOB_EXTRACTION,
    RESUME_EXTRACTION,
];

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt template '{0}' is not configured")]
    Missing(String),

    #[error("Failed to read prompt file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid prompt file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptTemplate {
    pub prompt: String,
    pub system_message: String,
}

/// A prompt ready to send: template placeholders already substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub prompt: String,
    pub system_message: String,
}

#[derive(Debug, Clone)]
pub struct PromptStore {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptStore {
    pub fn builtin() -> Result<Self, PromptError> {
        Self::from_json(BUILTIN_PROMPTS)
    }

    pub fn from_json(json: &str) -> Result<Self, PromptError> {
        let templates: HashMap<String, PromptTemplate> = serde_json::from_str(json)?;
        Ok(Self { templates })
    }

    pub fn load(path: &Path) -> Result<Self, PromptError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Fails on the first required name that is absent.
    pub fn ensure_complete(&self) -> Result<(), PromptError> {
        match REQUIRED_PROMPTS
            .iter()
            .find(|name| !self.templates.contains_key(**name))
        {
            Some(name) => Err(PromptError::Missing(name.to_string())),
            None => Ok(()),
        }
    }

    pub fn get(&self, name: &str) -> Result<&PromptTemplate, PromptError> {
        self.templates
            .get(name)
            .ok_or_else(|| PromptError::Missing(name.to_string()))
    }

    /// Looks up `name` and substitutes `{key}` placeholders in its prompt.
    pub fn render(&self, name: &str, vars: &[(&str, &str)]) -> Result<RenderedPrompt, PromptError> {
        let template = self.get(name)?;
        Ok(RenderedPrompt {
            prompt: fill_placeholders(&template.prompt, vars),
            system_message: template.system_message.clone(),
        })
    }
}

/// Single-pass `{key}` substitution. Unknown braces are kept verbatim and substituted values
/// are never re-scanned.
pub fn fill_placeholders(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replacement = after.find('}').and_then(|close| {
            let key = &after[..close];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match replacement {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_store_is_complete() {
        let store = PromptStore::builtin().unwrap();
        store.ensure_complete().unwrap();
    }

    #[test]
    fn test_missing_prompt_is_config_error() {
        let store = PromptStore::from_json(r#"{"a": {"prompt": "p", "system_message": "s"}}"#).unwrap();
        assert!(matches!(store.get("b"), Err(PromptError::Missing(name)) if name == "b"));
        assert!(matches!(store.ensure_complete(), Err(PromptError::Missing(_))));
    }

    #[test]
    fn test_fill_placeholders_keeps_unknown_braces() {
        let out = fill_placeholders(
            "Return {\"a\": 1} for {name} at {pct}%",
            &[("name", "overview"), ("pct", "20")],
        );
        assert_eq!(out, "Return {\"a\": 1} for overview at 20%");
    }

    #[test]
    fn test_fill_placeholders_does_not_rescan_values() {
        let out = fill_placeholders("{text} / {section_name}", &[("text", "{section_name}"), ("section_name", "x")]);
        assert_eq!(out, "{section_name} / x");
    }

    #[test]
    fn test_render_reduction_prompt() {
        let store = PromptStore::builtin().unwrap();
        let rendered = store
            .render(
                SECTION_REDUCTION,
                &[("section_name", "overview"), ("reduction_percentage", "10"), ("text", "Long text")],
            )
            .unwrap();
        assert!(rendered.prompt.contains("overview"));
        assert!(rendered.prompt.contains("10%"));
        assert!(rendered.prompt.ends_with("Long text"));
        assert!(!rendered.system_message.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        std::fs::write(&path, r#"{"x": {"prompt": "{v}!", "system_message": ""}}"#).unwrap();
        let store = PromptStore::load(&path).unwrap();
        assert_eq!(store.render("x", &[("v", "hi")]).unwrap().prompt, "hi!");
    }
}
