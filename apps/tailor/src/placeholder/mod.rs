//! Placeholder Engine: slot markers in resume templates.
//!
//! Markers:
//!   `<SKILL N>`       skill slot N, 1..=10 (whitespace between SKILL and N optional)
//!   `<OverView>`      objective
//!   `<Experience-Bullet{i}-(BoldedOverview|Description)-J{j}>`  bullet i of job j
//!
//! Slots are re-extracted on every call. The only cached state is the per-template
//! validation verdict.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::optimize::models::OptimizationBundle;

pub const SKILL_SLOT_COUNT: u32 = 10;
pub const OVERVIEW_MARKER: &str = "<OverView>";

const VALIDATION_CACHE_CAPACITY: usize = 32;

static SKILL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<SKILL\s*(\d+)>").unwrap());
static BULLET_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<Experience-Bullet(\d+)-(BoldedOverview|Description)-J(\d+)>").unwrap());

static VALIDATION_CACHE: Lazy<Mutex<HashMap<String, bool>>> = Lazy::new(|| Mutex::new(HashMap::new()));

#[derive(Debug, Error, PartialEq)]
pub enum PlaceholderError {
    #[error("Empty template")]
    EmptyTemplate,

    #[error("Expected exactly one overview placeholder, found {0}")]
    OverviewCount(usize),

    #[error("Expected {expected} skill placeholders, found {found}")]
    SkillSlotCount { expected: u32, found: usize },

    #[error("Missing bullet point placeholders")]
    MissingBullets,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceholderSlot {
    pub number: u32,
    pub marker: String,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BulletField {
    BoldedOverview,
    Description,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulletSlot {
    pub bullet: u32,
    pub field: BulletField,
    pub job: u32,
    pub marker: String,
    pub span: Range<usize>,
}

/// Two slots sharing a row: the longer value (a) beside the shorter one (b).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotPair {
    pub marker_a: String,
    pub value_a: String,
    pub marker_b: String,
    pub value_b: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Pairing {
    pub pairs: Vec<SlotPair>,
    /// Middle slot left over when the slot count is odd, as (marker, value).
    pub unpaired: Option<(String, String)>,
}

/// Skill slots keyed by number. Numbers outside 1..=10 are skipped; a repeated number keeps
/// its last occurrence.
pub fn extract_slots(template: &str) -> BTreeMap<u32, PlaceholderSlot> {
    let mut slots = BTreeMap::new();
    for caps in SKILL_PATTERN.captures_iter(template) {
        let Ok(number) = caps[1].parse::<u32>() else {
            continue;
        };
        if !(1..=SKILL_SLOT_COUNT).contains(&number) {
            continue;
        }
        let whole = caps.get(0).map(|m| (m.as_str().to_string(), m.range()));
        if let Some((marker, span)) = whole {
            slots.insert(number, PlaceholderSlot { number, marker, span });
        }
    }
    debug!(count = slots.len(), "Extracted skill placeholders");
    slots
}

pub fn extract_bullet_slots(template: &str) -> Vec<BulletSlot> {
    BULLET_PATTERN
        .captures_iter(template)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let bullet = caps[1].parse().ok()?;
            let job = caps[3].parse().ok()?;
            let field = match &caps[2] {
                "BoldedOverview" => BulletField::BoldedOverview,
                _ => BulletField::Description,
            };
            Some(BulletSlot {
                bullet,
                field,
                job,
                marker: whole.as_str().to_string(),
                span: whole.range(),
            })
        })
        .collect()
}

/// Pairs slots for a two-column layout: sort by value length descending (ties by slot
/// number), then pair position i with n-1-i. Slot n takes `values[n-1]`; missing values
/// count as empty.
pub fn pair_by_length<S: AsRef<str>>(slots: &BTreeMap<u32, PlaceholderSlot>, values: &[S]) -> Pairing {
    let mut entries: Vec<(&str, &str)> = slots
        .values()
        .map(|slot| {
            let value = (slot.number as usize)
                .checked_sub(1)
                .and_then(|i| values.get(i))
                .map(AsRef::as_ref)
                .unwrap_or("");
            (slot.marker.as_str(), value)
        })
        .collect();
    entries.sort_by(|a, b| b.1.chars().count().cmp(&a.1.chars().count()));

    let n = entries.len();
    let pairs = (0..n / 2)
        .map(|i| {
            let (marker_a, value_a) = entries[i];
            let (marker_b, value_b) = entries[n - 1 - i];
            SlotPair {
                marker_a: marker_a.to_string(),
                value_a: value_a.to_string(),
                marker_b: marker_b.to_string(),
                value_b: value_b.to_string(),
            }
        })
        .collect();
    let unpaired = (n % 2 == 1).then(|| {
        let (marker, value) = entries[n / 2];
        (marker.to_string(), value.to_string())
    });

    debug!(pairs = n / 2, odd = unpaired.is_some(), "Paired skill placeholders by length");
    Pairing { pairs, unpaired }
}

/// Structural check with the reason for rejection.
pub fn check_template(template: &str) -> Result<(), PlaceholderError> {
    if template.trim().is_empty() {
        return Err(PlaceholderError::EmptyTemplate);
    }
    let overviews = template.matches(OVERVIEW_MARKER).count();
    if overviews != 1 {
        return Err(PlaceholderError::OverviewCount(overviews));
    }
    let skills = extract_slots(template).len();
    if skills != SKILL_SLOT_COUNT as usize {
        return Err(PlaceholderError::SkillSlotCount {
            expected: SKILL_SLOT_COUNT,
            found: skills,
        });
    }
    if !BULLET_PATTERN.is_match(template) {
        return Err(PlaceholderError::MissingBullets);
    }
    Ok(())
}

/// Memoized per literal template text.
pub fn validate_template(template: &str) -> bool {
    if let Some(&verdict) = VALIDATION_CACHE.lock().get(template) {
        return verdict;
    }

    let verdict = match check_template(template) {
        Ok(()) => true,
        Err(e) => {
            warn!("Template validation failed: {e}");
            false
        }
    };

    let mut cache = VALIDATION_CACHE.lock();
    if cache.len() >= VALIDATION_CACHE_CAPACITY {
        cache.clear();
    }
    cache.insert(template.to_string(), verdict);
    verdict
}

/// Substitutes bundle content into a text template. Bullet markers for jobs other than J1, or
/// past the end of the bullet list, are blanked.
pub fn render_template(template: &str, bundle: &OptimizationBundle) -> Result<String, PlaceholderError> {
    check_template(template)?;

    let mut replacements: Vec<(Range<usize>, String)> = Vec::new();

    if let Some(start) = template.find(OVERVIEW_MARKER) {
        replacements.push((start..start + OVERVIEW_MARKER.len(), bundle.objective.clone()));
    }

    // Every marker occurrence, not just the last one kept by extract_slots.
    for caps in SKILL_PATTERN.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        let Ok(number) = caps[1].parse::<usize>() else { continue };
        if !(1..=SKILL_SLOT_COUNT as usize).contains(&number) {
            continue;
        }
        let value = bundle.skills.get(number - 1).cloned().unwrap_or_default();
        replacements.push((whole.range(), value));
    }

    for slot in extract_bullet_slots(template) {
        let record = (slot.job == 1)
            .then(|| (slot.bullet as usize).checked_sub(1))
            .flatten()
            .and_then(|i| bundle.bullets.get(i));
        let value = match (record, slot.field) {
            (Some(b), BulletField::BoldedOverview) => b.bolded_overview.clone(),
            (Some(b), BulletField::Description) => b.description.clone(),
            (None, _) => String::new(),
        };
        replacements.push((slot.span, value));
    }

    replacements.sort_by_key(|(span, _)| span.start);
    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;
    for (span, value) in replacements {
        out.push_str(&template[cursor..span.start]);
        out.push_str(&value);
        cursor = span.end;
    }
    out.push_str(&template[cursor..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::optimize::models::{BulletRecord, JobMetadata};

    fn template() -> String {
        let mut t = String::from("<OverView>\n");
        for row in 0..5 {
            t.push_str(&format!("<SKILL {}>  <SKILL {}>\n", row * 2 + 1, row * 2 + 2));
        }
        t.push_str("<Experience-Bullet1-BoldedOverview-J1>: <Experience-Bullet1-Description-J1>\n");
        t.push_str("<Experience-Bullet2-BoldedOverview-J1>: <Experience-Bullet2-Description-J1>\n");
        t
    }

    fn skills() -> Vec<String> {
        ["Rust", "PostgreSQL", "Distributed Systems", "Go", "Kubernetes", "AWS", "Observability", "C", "gRPC", "CI/CD"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn bundle() -> OptimizationBundle {
        OptimizationBundle {
            job_id: uuid::Uuid::nil(),
            objective: "Backend engineer".to_string(),
            skills: skills(),
            bullets: vec![BulletRecord {
                bolded_overview: "Scaled ingest".to_string(),
                description: "Cut latency".to_string(),
            }],
            match_rating: 90.0,
            explanation: String::new(),
            job: JobMetadata::default(),
        }
    }

    #[test]
    fn test_extract_slots_filters_range() {
        let slots = extract_slots("<SKILL 0> <SKILL1> <SKILL  10> <SKILL 11> <SKILL x> <SKILL 3>");
        assert_eq!(slots.keys().copied().collect::<Vec<_>>(), vec![1, 3, 10]);
        assert_eq!(slots[&1].marker, "<SKILL1>");
        assert_eq!(slots[&10].marker, "<SKILL  10>");
    }

    #[test]
    fn test_duplicate_slot_keeps_last() {
        let slots = extract_slots("<SKILL 2> ... <SKILL2>");
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[&2].marker, "<SKILL2>");
        assert_eq!(slots[&2].span, 14..22);
    }

    #[test]
    fn test_ten_markers_give_five_disjoint_pairs() {
        let t = template();
        assert!(validate_template(&t));

        let slots = extract_slots(&t);
        let pairing = pair_by_length(&slots, &skills());
        assert_eq!(pairing.pairs.len(), 5);
        assert!(pairing.unpaired.is_none());

        let mut seen = HashSet::new();
        for pair in &pairing.pairs {
            assert!(seen.insert(pair.marker_a.clone()));
            assert!(seen.insert(pair.marker_b.clone()));
            assert!(pair.value_a.len() >= pair.value_b.len());
        }
        assert_eq!(seen.len(), 10);

        // longest with shortest
        assert_eq!(pairing.pairs[0].value_a, "Distributed Systems");
        assert_eq!(pairing.pairs[0].value_b, "C");
    }

    #[test]
    fn test_pairing_odd_count_leaves_middle() {
        let slots = extract_slots("<SKILL 1><SKILL 2><SKILL 3>");
        let pairing = pair_by_length(&slots, &["aaa", "a", "aa"]);
        assert_eq!(pairing.pairs.len(), 1);
        assert_eq!(pairing.pairs[0].value_a, "aaa");
        assert_eq!(pairing.pairs[0].value_b, "a");
        assert_eq!(pairing.unpaired, Some(("<SKILL 3>".to_string(), "aa".to_string())));
    }

    #[test]
    fn test_pairing_ties_keep_slot_order() {
        let slots = extract_slots("<SKILL 1><SKILL 2><SKILL 3><SKILL 4>");
        let pairing = pair_by_length(&slots, &["ab", "cd", "ef", "gh"]);
        assert_eq!(pairing.pairs[0].marker_a, "<SKILL 1>");
        assert_eq!(pairing.pairs[0].marker_b, "<SKILL 4>");
        assert_eq!(pairing.pairs[1].marker_a, "<SKILL 2>");
        assert_eq!(pairing.pairs[1].marker_b, "<SKILL 3>");
    }

    #[test]
    fn test_check_template_reasons() {
        assert_eq!(check_template("  "), Err(PlaceholderError::EmptyTemplate));
        let no_overview = template().replace(OVERVIEW_MARKER, "");
        assert_eq!(check_template(&no_overview), Err(PlaceholderError::OverviewCount(0)));
        let two_overviews = format!("{}{}", OVERVIEW_MARKER, template());
        assert_eq!(check_template(&two_overviews), Err(PlaceholderError::OverviewCount(2)));
        let nine = template().replace("<SKILL 10>", "");
        assert_eq!(
            check_template(&nine),
            Err(PlaceholderError::SkillSlotCount { expected: 10, found: 9 })
        );
        let no_bullets: String = template().lines().take(6).collect::<Vec<_>>().join("\n");
        assert_eq!(check_template(&no_bullets), Err(PlaceholderError::MissingBullets));
    }

    #[test]
    fn test_validation_is_memoized() {
        let t = format!("{}\n<!-- memo -->", template());
        assert!(validate_template(&t));
        assert_eq!(VALIDATION_CACHE.lock().get(&t).copied(), Some(true));
        assert!(validate_template(&t));
    }

    #[test]
    fn test_extract_bullet_slots() {
        let slots = extract_bullet_slots(&template());
        assert_eq!(slots.len(), 4);
        assert_eq!(slots[1].bullet, 1);
        assert_eq!(slots[1].field, BulletField::Description);
        assert_eq!(slots[1].job, 1);
    }

    #[test]
    fn test_render_template_substitutes_everything() {
        let rendered = render_template(&template(), &bundle()).unwrap();
        assert!(rendered.starts_with("Backend engineer\nRust  PostgreSQL\n"));
        assert!(rendered.contains("Scaled ingest: Cut latency\n"));
        // bullet 2 has no record
        assert!(rendered.ends_with(": \n"));
        assert!(!rendered.contains('<'));
    }

    #[test]
    fn test_render_rejects_invalid_template() {
        assert_eq!(
            render_template("<OverView>", &bundle()),
            Err(PlaceholderError::SkillSlotCount { expected: 10, found: 0 })
        );
    }
}
