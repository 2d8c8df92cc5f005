use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One (bolded overview, description) experience bullet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulletRecord {
    #[serde(default)]
    pub bolded_overview: String,
    #[serde(default)]
    pub description: String,
}

impl BulletRecord {
    pub fn is_complete(&self) -> bool {
        !self.bolded_overview.trim().is_empty() && !self.description.trim().is_empty()
    }

    /// Lenient conversion from model or extraction output. Non-string fields become empty.
    pub fn from_value(value: &Value) -> Self {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            bolded_overview: field("bolded_overview"),
            description: field("description"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub dates: String,
    #[serde(default)]
    pub bullets: Vec<BulletRecord>,
}

impl JobEntry {
    pub fn from_value(value: &Value) -> Self {
        let text = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let bullets = value
            .get("bullets")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(BulletRecord::from_value).collect())
            .unwrap_or_default();
        Self {
            title: text("title"),
            company: text("company"),
            dates: text("dates"),
            bullets,
        }
    }
}

/// A previously written resume used as raw material for tailoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMaterial {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub skills_list: Vec<String>,
    #[serde(default)]
    pub jobs_section: Vec<JobEntry>,
    #[serde(default)]
    pub education: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default)]
    pub source_file: String,
}

/// Target job posting. Accepts both snake_case keys and the extraction schema's keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    #[serde(default)]
    pub jid: String,
    #[serde(default, alias = "Title")]
    pub title: String,
    #[serde(default, alias = "Company Name")]
    pub company: String,
    #[serde(default, alias = "Location")]
    pub location: String,
    #[serde(default)]
    pub field: String,
    #[serde(default, alias = "Salary")]
    pub salary: String,
    #[serde(default)]
    pub posting_date: String,
    #[serde(default)]
    pub cleaned_description: String,
    #[serde(default)]
    pub source_file: String,
}

/// Fully validated tailoring result. Only built once every stage has passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationBundle {
    pub job_id: Uuid,
    pub objective: String,
    pub skills: Vec<String>,
    pub bullets: Vec<BulletRecord>,
    pub match_rating: f64,
    pub explanation: String,
    pub job: JobMetadata,
}
