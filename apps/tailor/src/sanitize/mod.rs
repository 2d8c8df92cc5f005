//! Response Sanitizer: recovers a schema-shaped record from free-form model output.
//!
//! `sanitize` is total: it never fails and always returns exactly the schema's keys. Recovery
//! runs through ordered tiers, each its own function so each can be tested alone:
//!
//! 1. `unwrap_envelope`: structured envelopes (`content`, `choices[0].message.content`)
//! 2. `strip_fences`: interior of the first ``` block (``` json tag optional)
//! 3. `slice_braces`: first `{` to last `}`
//! 4. `normalize_json_text`: collapse lines, delimiter single quotes → double, close braces
//! 5. `parse_direct`, then `parse_repaired` (trailing commas, whitespace runs)
//! 6. `salvage_fields`: per-field regex, defaults for anything unmatched
//!
//! The first tier that yields a JSON object wins.

mod schema;

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::llm_client::gateway::CallResult;

pub use schema::{evaluation_schema, job_schema, source_schema, FieldKind, Schema};

static TRAILING_COMMA_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\}").unwrap());
static TRAILING_COMMA_ARRAY: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\]").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Raw model output as handed to the sanitizer.
#[derive(Debug, Clone, Copy)]
pub enum RawResponse<'a> {
    Text(&'a str),
    Json(&'a Value),
}

impl<'a> From<&'a str> for RawResponse<'a> {
    fn from(s: &'a str) -> Self {
        RawResponse::Text(s)
    }
}

impl<'a> From<&'a String> for RawResponse<'a> {
    fn from(s: &'a String) -> Self {
        RawResponse::Text(s.as_str())
    }
}

impl<'a> From<&'a Value> for RawResponse<'a> {
    fn from(v: &'a Value) -> Self {
        RawResponse::Json(v)
    }
}

impl<'a> From<&'a CallResult> for RawResponse<'a> {
    fn from(r: &'a CallResult) -> Self {
        RawResponse::Text(r.content.as_str())
    }
}

/// Which tier produced the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecoveryTier {
    /// The input was already a JSON object.
    Structured,
    Direct,
    Repaired,
    /// Regex salvage matched at least one field.
    Salvaged,
    /// Nothing was recoverable; every field holds its default.
    Defaults,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<Value>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            FieldValue::List(items) => Some(items),
            FieldValue::Text(_) => None,
        }
    }
}

/// A record whose key set always equals its schema's field names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanitizedRecord {
    fields: BTreeMap<String, FieldValue>,
    #[serde(skip)]
    defaulted: BTreeSet<String>,
    #[serde(skip)]
    tier: RecoveryTier,
}

impl SanitizedRecord {
    #[cfg(test)]
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Text value of a field, or "" for list fields and unknown names.
    pub fn text(&self, name: &str) -> &str {
        self.get(name).and_then(FieldValue::as_text).unwrap_or("")
    }

    /// List value of a field, or an empty slice for text fields and unknown names.
    pub fn list(&self, name: &str) -> &[Value] {
        self.get(name).and_then(FieldValue::as_list).unwrap_or(&[])
    }

    /// List items coerced to strings (objects and arrays are JSON-encoded).
    pub fn strings(&self, name: &str) -> Vec<String> {
        self.list(name).iter().filter_map(value_to_text).collect()
    }

    /// True when the field was recovered from the input rather than filled with its default.
    pub fn is_recovered(&self, name: &str) -> bool {
        self.fields.contains_key(name) && !self.defaulted.contains(name)
    }

    pub fn tier(&self) -> RecoveryTier {
        self.tier
    }
}

/// Recovers a record matching `schema` from raw model output. Never fails.
pub fn sanitize<'a>(raw: impl Into<RawResponse<'a>>, schema: &Schema) -> SanitizedRecord {
    let raw = raw.into();
    let (object, tier, salvage_text) = match raw {
        RawResponse::Json(value) => match unwrap_envelope(value) {
            Envelope::Object(map) => (Some(map), RecoveryTier::Structured, None),
            Envelope::Text(text) => recover_from_text(&text),
            Envelope::Opaque => (None, RecoveryTier::Defaults, None),
        },
        RawResponse::Text(text) => recover_from_text(text),
    };

    let record = match (object, salvage_text) {
        (Some(map), _) => build_record(&map, schema, tier),
        (None, Some(text)) => salvage_fields(&text, schema),
        (None, None) => build_record(&Map::new(), schema, RecoveryTier::Defaults),
    };

    debug!(
        tier = ?record.tier,
        defaulted = record.defaulted.len(),
        fields = record.fields.len(),
        "Sanitized model response"
    );
    record
}

/// Runs tiers 2–5 on text. Returns the object if one parsed, otherwise the text salvage
/// should run on.
fn recover_from_text(text: &str) -> (Option<Map<String, Value>>, RecoveryTier, Option<String>) {
    let unfenced = strip_fences(text);
    let sliced = slice_braces(unfenced);
    let normalized = normalize_json_text(sliced);

    if let Some(map) = parse_direct(&normalized) {
        return (Some(map), RecoveryTier::Direct, None);
    }
    debug!("Direct JSON parse failed, attempting repair");

    if let Some(map) = parse_repaired(&normalized) {
        return (Some(map), RecoveryTier::Repaired, None);
    }
    debug!("Repaired JSON parse failed, falling back to field salvage");

    (None, RecoveryTier::Salvaged, Some(repair_json_text(&normalized)))
}

enum Envelope {
    Object(Map<String, Value>),
    Text(String),
    Opaque,
}

/// Tier 1: peels provider envelopes until a record object or a text payload remains.
fn unwrap_envelope(value: &Value) -> Envelope {
    let mut current = value;
    loop {
        match current {
            Value::String(s) => return Envelope::Text(s.clone()),
            Value::Object(map) => {
                if let Some(content) = map
                    .get("choices")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("message"))
                    .and_then(|m| m.get("content"))
                {
                    current = content;
                } else if let Some(content) = map.get("content") {
                    current = content;
                } else {
                    return Envelope::Object(map.clone());
                }
            }
            _ => return Envelope::Opaque,
        }
    }
}

/// Tier 2: interior of the first fenced block. A ```json fence is preferred over a bare one;
/// an unterminated fence yields everything after it.
pub fn strip_fences(text: &str) -> &str {
    let after = if let Some((_, rest)) = text.split_once("```json") {
        rest
    } else if let Some((_, rest)) = text.split_once("```") {
        rest
    } else {
        return text;
    };
    match after.split_once("```") {
        Some((inner, _)) => inner,
        None => after,
    }
}

/// Tier 3: slice from the first `{` to the last `}` when both exist in that order.
pub fn slice_braces(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start <= end => &text[start..=end],
        _ => text,
    }
}

/// Tier 4: collapse lines, turn delimiter single quotes into double quotes, and make sure the
/// text is wrapped in braces.
pub fn normalize_json_text(text: &str) -> String {
    let collapsed = text
        .trim()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let mut normalized = normalize_single_quotes(&collapsed);
    if !normalized.starts_with('{') {
        normalized.insert(0, '{');
    }
    if !normalized.ends_with('}') {
        normalized.push('}');
    }
    normalized
}

/// Replaces `'` with `"` only where it sits next to JSON structure (`{ } [ ] : ,` or the
/// ends of the text), so apostrophes inside prose survive.
fn normalize_single_quotes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let is_structural = |c: Option<char>| matches!(c, None | Some('{' | '}' | '[' | ']' | ':' | ','));

    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if c != '\'' {
                return c;
            }
            let prev = chars[..i].iter().rev().copied().find(|c| !c.is_whitespace());
            let next = chars[i + 1..].iter().copied().find(|c| !c.is_whitespace());
            if is_structural(prev) || is_structural(next) {
                '"'
            } else {
                c
            }
        })
        .collect()
}

/// Tier 5a: plain parse; only objects count.
pub fn parse_direct(text: &str) -> Option<Map<String, Value>> {
    parse_object(text)
}

/// Tier 5b: drop trailing commas before `}`/`]` and collapse whitespace runs.
pub fn repair_json_text(text: &str) -> String {
    let text = TRAILING_COMMA_OBJECT.replace_all(text, "}");
    let text = TRAILING_COMMA_ARRAY.replace_all(&text, "]");
    WHITESPACE_RUN.replace_all(&text, " ").into_owned()
}

pub fn parse_repaired(text: &str) -> Option<Map<String, Value>> {
    parse_object(&repair_json_text(text))
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Tier 6: regex extraction of `"field": "value"` (text) and `"field": [...]` (list) pairs.
pub fn salvage_fields(text: &str, schema: &Schema) -> SanitizedRecord {
    let mut found = Map::new();

    for spec in schema.fields() {
        let name = regex::escape(&spec.name);
        match spec.kind {
            FieldKind::Text => {
                let pattern = format!(r#""{name}"\s*:\s*"([^"]+)""#);
                if let Some(caps) = Regex::new(&pattern).ok().and_then(|re| re.captures(text)) {
                    found.insert(spec.name.clone(), Value::String(caps[1].to_string()));
                }
            }
            FieldKind::List => {
                let pattern = format!(r#""{name}"\s*:\s*\["#);
                let Some(m) = Regex::new(&pattern).ok().and_then(|re| re.find(text)) else {
                    continue;
                };
                let start = m.end() - 1;
                if let Some(items) = balanced_array(&text[start..]) {
                    found.insert(spec.name.clone(), Value::Array(items));
                }
            }
        }
    }

    let tier = if found.is_empty() {
        RecoveryTier::Defaults
    } else {
        RecoveryTier::Salvaged
    };
    build_record(&found, schema, tier)
}

/// Parses the bracketed array at the start of `text`, tracking nesting and string literals.
fn balanced_array(text: &str) -> Option<Vec<Value>> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    let span = repair_json_text(&text[..=i]);
                    return match serde_json::from_str::<Value>(&span) {
                        Ok(Value::Array(items)) => Some(items),
                        _ => None,
                    };
                }
            }
            _ => {}
        }
    }
    None
}

/// Copies schema fields out of a parsed object, coercing types and filling defaults.
/// Keys outside the schema are dropped.
fn build_record(object: &Map<String, Value>, schema: &Schema, tier: RecoveryTier) -> SanitizedRecord {
    let mut fields = BTreeMap::new();
    let mut defaulted = BTreeSet::new();

    for spec in schema.fields() {
        let coerced = object.get(&spec.name).and_then(|v| coerce(v, spec.kind));
        match coerced {
            Some(value) => {
                fields.insert(spec.name.clone(), value);
            }
            None => {
                fields.insert(spec.name.clone(), spec.default.clone());
                defaulted.insert(spec.name.clone());
            }
        }
    }

    SanitizedRecord {
        fields,
        defaulted,
        tier,
    }
}

fn coerce(value: &Value, kind: FieldKind) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => value_to_text(value).map(FieldValue::Text),
        FieldKind::List => match value {
            Value::Array(items) => Some(FieldValue::List(items.clone())),
            _ => None,
        },
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Extracts a JSON array from model output: fenced interior, first `[` to last `]`,
/// then a plain parse with the trailing-comma repair as fallback.
pub fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    let unfenced = strip_fences(text).trim();
    let sliced = match (unfenced.find('['), unfenced.rfind(']')) {
        (Some(start), Some(end)) if start <= end => &unfenced[start..=end],
        _ => unfenced,
    };
    match serde_json::from_str::<Value>(sliced) {
        Ok(Value::Array(items)) => Some(items),
        _ => match serde_json::from_str::<Value>(&repair_json_text(sliced)) {
            Ok(Value::Array(items)) => Some(items),
            _ => None,
        },
    }
}
