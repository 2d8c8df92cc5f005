//! Source selection and candidate pooling.

use crate::optimize::models::{BulletRecord, SourceMaterial};

/// Ranks sources by (usage_count, skill count, job entry count) descending and keeps `top_n`.
/// Ties keep their input order.
pub fn select_top_sources(sources: &[SourceMaterial], top_n: usize) -> Vec<&SourceMaterial> {
    let mut ranked: Vec<&SourceMaterial> = sources.iter().collect();
    ranked.sort_by(|a, b| rank_key(b).cmp(&rank_key(a)));
    ranked.truncate(top_n);
    ranked
}

fn rank_key(source: &SourceMaterial) -> (u32, usize, usize) {
    (source.usage_count, source.skills_list.len(), source.jobs_section.len())
}

/// Candidate material pooled from the selected sources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidatePool {
    pub objectives: Vec<String>,
    pub skills: Vec<String>,
    pub bullets: Vec<BulletRecord>,
}

impl CandidatePool {
    /// Objectives: every non-empty objective. Skills: all skill lists concatenated.
    /// Bullets: complete bullets from every job entry of every source.
    pub fn gather(selected: &[&SourceMaterial]) -> Self {
        let objectives = selected
            .iter()
            .map(|s| s.objective.trim())
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();

        let skills = selected
            .iter()
            .flat_map(|s| s.skills_list.iter())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let bullets = selected
            .iter()
            .flat_map(|s| s.jobs_section.iter())
            .flat_map(|job| job.bullets.iter())
            .filter(|b| b.is_complete())
            .cloned()
            .collect();

        Self {
            objectives,
            skills,
            bullets,
        }
    }

    /// Bullet block as shown to the model: one "• overview: description" line per bullet.
    pub fn bullet_text(&self) -> String {
        self.bullets
            .iter()
            .map(|b| format!("• {}: {}", b.bolded_overview, b.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::models::JobEntry;

    fn source(objective: &str, usage: u32, skills: &[&str], jobs: usize) -> SourceMaterial {
        SourceMaterial {
            objective: objective.to_string(),
            usage_count: usage,
            skills_list: skills.iter().map(|s| s.to_string()).collect(),
            jobs_section: (0..jobs).map(|_| JobEntry::default()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_ranking_and_stable_ties() {
        let sources = vec![
            source("a", 1, &["x"], 1),
            source("b", 3, &[], 0),
            source("c", 1, &["x"], 1),
            source("d", 1, &["x", "y"], 0),
        ];
        let picked: Vec<&str> = select_top_sources(&sources, 10)
            .iter()
            .map(|s| s.objective.as_str())
            .collect();
        assert_eq!(picked, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_top_n_truncates() {
        let sources: Vec<_> = (0..8).map(|i| source(&i.to_string(), i, &[], 0)).collect();
        let picked = select_top_sources(&sources, 5);
        assert_eq!(picked.len(), 5);
        assert_eq!(picked[0].objective, "7");
    }

    #[test]
    fn test_gather_pools_bullets_from_every_job() {
        let mut s = source("  Objective  ", 0, &["Rust", " ", "SQL"], 0);
        s.jobs_section = vec![
            JobEntry {
                bullets: vec![
                    BulletRecord {
                        bolded_overview: "Led".into(),
                        description: "migration".into(),
                    },
                    BulletRecord {
                        bolded_overview: "".into(),
                        description: "dropped".into(),
                    },
                ],
                ..Default::default()
            },
            JobEntry {
                bullets: vec![BulletRecord {
                    bolded_overview: "Older".into(),
                    description: "role".into(),
                }],
                ..Default::default()
            },
        ];
        let empty = source("", 0, &[], 0);
        let pool = CandidatePool::gather(&[&s, &empty]);
        assert_eq!(pool.objectives, vec!["Objective"]);
        assert_eq!(pool.skills, vec!["Rust", "SQL"]);
        assert_eq!(pool.bullets.len(), 2);
        assert_eq!(pool.bullet_text(), "• Led: migration\n• Older: role");
    }
}
