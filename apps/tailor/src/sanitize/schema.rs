use super::FieldValue;

pub const UNKNOWN: &str = "UNKNOWN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    List,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub default: FieldValue,
}

/// Ordered set of required fields with their kinds and defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, default: &str) -> Self {
        self.push(FieldSpec {
            name: name.to_string(),
            kind: FieldKind::Text,
            default: FieldValue::Text(default.to_string()),
        });
        self
    }

    /// List field defaulting to an empty list.
    pub fn list(mut self, name: &str) -> Self {
        self.push(FieldSpec {
            name: name.to_string(),
            kind: FieldKind::List,
            default: FieldValue::List(Vec::new()),
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    // A later declaration of the same name replaces the earlier one.
    fn push(&mut self, spec: FieldSpec) {
        self.fields.retain(|f| f.name != spec.name);
        self.fields.push(spec);
    }
}

pub fn job_schema() -> Schema {
    Schema::new()
        .text("Title", UNKNOWN)
        .text("Company Name", UNKNOWN)
        .text("Location", UNKNOWN)
        .text("field", UNKNOWN)
        .text("Salary", UNKNOWN)
        .text("posting_date", UNKNOWN)
        .text("cleaned_description", UNKNOWN)
}

pub fn source_schema() -> Schema {
    Schema::new()
        .text("objective", "")
        .list("skills_list")
        .list("jobs_section")
        .list("education")
        .list("certifications")
}

pub fn evaluation_schema() -> Schema {
    Schema::new().text("match_rating", "").text("explanation", "")
}
