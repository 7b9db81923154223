//! Competency Extractor: pluggable, trait-based skill inference over one artifact.
//!
//! Default: `LlmCompetencyExtractor` (Claude, via the shared `LlmClient`).
//! Offline: `KeywordCompetencyExtractor` (pure-Rust, deterministic, no LLM call).
//!
//! `AppState` holds an `Arc<dyn CompetencyExtractor>`, chosen at startup by
//! `EXTRACTOR_BACKEND`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::assessment::normalizer::Artifact;
use crate::assessment::prompts::{EXTRACTION_PROMPT, EXTRACTION_SYSTEM};
use crate::llm_client::{LlmClient, LlmError};
use crate::models::skills::{contains_phrase, normalize_term, Observation, SkillTaxonomyEntry};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("AI service unavailable: {0}")]
    Transport(String),

    #[error("extraction timed out after {0}s")]
    Timeout(u64),
}

impl From<LlmError> for ExtractionError {
    fn from(e: LlmError) -> Self {
        ExtractionError::Transport(e.to_string())
    }
}

/// Observations taken from one artifact.
#[derive(Debug, Default)]
pub struct Extraction {
    pub observations: Vec<Observation>,
    /// The backend replied with nothing readable; `observations` is empty.
    pub degraded: bool,
}

impl Extraction {
    pub fn degraded() -> Self {
        Self {
            observations: Vec::new(),
            degraded: true,
        }
    }
}

impl From<Vec<Observation>> for Extraction {
    fn from(observations: Vec<Observation>) -> Self {
        Self {
            observations,
            degraded: false,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Infers observations from one artifact, restricted to the given skills.
#[async_trait]
pub trait CompetencyExtractor: Send + Sync {
    /// Short backend name for logs and responses.
    fn backend(&self) -> &'static str;

    async fn extract(
        &self,
        artifact: &Artifact,
        skills: &[&SkillTaxonomyEntry],
    ) -> Result<Extraction, ExtractionError>;
}

// ────────────────────────────────────────────────────────────────────────────
// LlmCompetencyExtractor
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmCompetencyExtractor(pub LlmClient);

/// Records are kept as raw JSON so one bad record does not sink the rest.
#[derive(Debug, Deserialize)]
struct ExtractionPayload {
    #[serde(default)]
    observations: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    skill_id: String,
    level: String,
    confidence: f64,
    #[serde(default)]
    evidence_text: String,
}

#[async_trait]
impl CompetencyExtractor for LlmCompetencyExtractor {
    fn backend(&self) -> &'static str {
        "llm"
    }

    async fn extract(
        &self,
        artifact: &Artifact,
        skills: &[&SkillTaxonomyEntry],
    ) -> Result<Extraction, ExtractionError> {
        if skills.is_empty() {
            return Ok(Extraction::default());
        }
        let prompt = EXTRACTION_PROMPT
            .replace("{taxonomy}", &render_taxonomy(skills))
            .replace("{artifact_id}", &artifact.id)
            .replace("{artifact_text}", &artifact.text);

        let reply = self.0.call_json(&prompt, EXTRACTION_SYSTEM).await;
        read_reply(reply, artifact, skills)
    }
}

/// An unreadable reply degrades to no observations; a failed call is an error.
fn read_reply(
    reply: Result<ExtractionPayload, LlmError>,
    artifact: &Artifact,
    skills: &[&SkillTaxonomyEntry],
) -> Result<Extraction, ExtractionError> {
    match reply {
        Ok(payload) => {
            let observations = collect_observations(payload, artifact, skills);
            debug!(
                "LLM extraction for {}: {} usable observations",
                artifact.id,
                observations.len()
            );
            Ok(observations.into())
        }
        Err(e) if e.is_unusable_reply() => {
            warn!(
                "Unreadable extraction reply for {}, using no observations: {e}",
                artifact.id
            );
            Ok(Extraction::degraded())
        }
        Err(e) => Err(e.into()),
    }
}

fn render_taxonomy(skills: &[&SkillTaxonomyEntry]) -> String {
    skills
        .iter()
        .map(|s| {
            format!(
                "- {} | {} | {} | {}",
                s.id,
                s.name,
                s.category.as_str(),
                s.proficiency_levels.join(" < ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keeps records that name a requested skill, one of its levels and a
/// confidence in [0, 1]. Everything else is dropped with a warning.
fn collect_observations(
    payload: ExtractionPayload,
    artifact: &Artifact,
    skills: &[&SkillTaxonomyEntry],
) -> Vec<Observation> {
    let mut out = Vec::new();
    for value in payload.observations {
        let raw: RawObservation = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                warn!("Dropping malformed observation from {}: {e}", artifact.id);
                continue;
            }
        };
        let Some(entry) = skills.iter().find(|s| s.id == raw.skill_id) else {
            warn!("Dropping observation for unknown skill '{}'", raw.skill_id);
            continue;
        };
        let Some(level_idx) = entry.level_index(&raw.level) else {
            warn!(
                "Dropping observation for '{}' with unknown level '{}'",
                raw.skill_id, raw.level
            );
            continue;
        };
        if !(0.0..=1.0).contains(&raw.confidence) {
            warn!(
                "Dropping observation for '{}' with confidence {}",
                raw.skill_id, raw.confidence
            );
            continue;
        }
        out.push(Observation {
            skill_id: entry.id.clone(),
            level: entry.proficiency_levels[level_idx].clone(),
            evidence_text: raw.evidence_text,
            confidence: raw.confidence,
            source_artifact_id: artifact.id.clone(),
            observed_at: None,
        });
    }
    out
}

// ────────────────────────────────────────────────────────────────────────────
// KeywordCompetencyExtractor
// ────────────────────────────────────────────────────────────────────────────

/// Confidence when a sentence names the skill and one of its levels.
const EXPLICIT_LEVEL_CONFIDENCE: f64 = 0.8;
/// Confidence when a sentence only names the skill; implies the lowest level.
const MENTION_CONFIDENCE: f64 = 0.65;
const MAX_EVIDENCE_CHARS: usize = 200;

/// Pure-Rust keyword extractor. Fast, deterministic, no LLM call.
///
/// Algorithm:
/// 1. Split the artifact into sentences
/// 2. A sentence mentions a skill when it contains its id, name or a synonym
///    as a whole-word phrase
/// 3. A level name in the same sentence implies that level; a bare mention
///    implies the lowest level
/// 4. One observation per skill, at the highest implied level
pub struct KeywordCompetencyExtractor;

#[async_trait]
impl CompetencyExtractor for KeywordCompetencyExtractor {
    fn backend(&self) -> &'static str {
        "keyword"
    }

    async fn extract(
        &self,
        artifact: &Artifact,
        skills: &[&SkillTaxonomyEntry],
    ) -> Result<Extraction, ExtractionError> {
        Ok(extract_by_keywords(artifact, skills).into())
    }
}

fn extract_by_keywords(artifact: &Artifact, skills: &[&SkillTaxonomyEntry]) -> Vec<Observation> {
    let sentences: Vec<(&str, String)> = artifact
        .text
        .split(|c: char| matches!(c, '.' | '!' | '?' | '\n'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| (s, normalize_term(s)))
        .collect();

    let mut out = Vec::new();
    for entry in skills {
        let terms = entry.normalized_terms();
        let levels: Vec<String> = entry
            .proficiency_levels
            .iter()
            .map(|l| normalize_term(l))
            .collect();

        // (level index, explicit?, sentence)
        let mut best: Option<(usize, bool, &str)> = None;
        for (original, norm) in &sentences {
            if !terms.iter().any(|t| contains_phrase(norm, t)) {
                continue;
            }
            let explicit = levels.iter().rposition(|l| contains_phrase(norm, l));
            let candidate = (explicit.unwrap_or(0), explicit.is_some(), *original);
            let better = match best {
                None => true,
                Some((idx, was_explicit, _)) => {
                    candidate.0 > idx || (candidate.0 == idx && candidate.1 && !was_explicit)
                }
            };
            if better {
                best = Some(candidate);
            }
        }

        if let Some((idx, explicit, sentence)) = best {
            out.push(Observation {
                skill_id: entry.id.clone(),
                level: entry.proficiency_levels[idx].clone(),
                evidence_text: sentence.chars().take(MAX_EVIDENCE_CHARS).collect(),
                confidence: if explicit {
                    EXPLICIT_LEVEL_CONFIDENCE
                } else {
                    MENTION_CONFIDENCE
                },
                source_artifact_id: artifact.id.clone(),
                observed_at: None,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::taxonomy::tests::skill;
    use serde_json::json;

    fn artifact(text: &str) -> Artifact {
        Artifact {
            id: "art_000000000001".to_string(),
            source_id: "notes".to_string(),
            text: text.to_string(),
        }
    }

    fn sql() -> SkillTaxonomyEntry {
        let mut s = skill("sql", &[]);
        s.name = "SQL".to_string();
        s.synonyms = vec!["query-optimization".to_string()];
        s
    }

    fn roadmapping() -> SkillTaxonomyEntry {
        let mut s = skill("roadmapping", &[]);
        s.name = "Product Roadmapping".to_string();
        s
    }

    #[test]
    fn test_llm_records_validated_individually() {
        let sql = sql();
        let road = roadmapping();
        let skills = vec![&sql, &road];
        let payload: ExtractionPayload = serde_json::from_value(json!({
            "observations": [
                {"skill_id": "sql", "level": "Intermediate", "confidence": 0.8, "evidence_text": "tuned joins"},
                {"skill_id": "cobol", "level": "expert", "confidence": 0.9},
                {"skill_id": "roadmapping", "level": "guru", "confidence": 0.9},
                {"skill_id": "roadmapping", "level": "advanced", "confidence": 1.4},
                {"skill_id": "roadmapping"},
                {"skill_id": "roadmapping", "level": "beginner", "confidence": 0.7}
            ]
        }))
        .unwrap();

        let obs = collect_observations(payload, &artifact("x"), &skills);
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].skill_id, "sql");
        assert_eq!(obs[0].level, "intermediate");
        assert_eq!(obs[0].source_artifact_id, "art_000000000001");
        assert_eq!(obs[1].skill_id, "roadmapping");
        assert_eq!(obs[1].level, "beginner");
    }

    #[test]
    fn test_unreadable_reply_degrades_to_no_observations() {
        let sql = sql();
        let err = serde_json::from_str::<Value>("not json").unwrap_err();
        let extraction = read_reply(Err(LlmError::Parse(err)), &artifact("x"), &[&sql]).unwrap();
        assert!(extraction.degraded);
        assert!(extraction.observations.is_empty());

        let empty = read_reply(Err(LlmError::EmptyContent), &artifact("x"), &[&sql]).unwrap();
        assert!(empty.degraded);
    }

    #[test]
    fn test_failed_call_is_an_extraction_error() {
        let sql = sql();
        let result = read_reply(
            Err(LlmError::Exhausted { attempts: 3 }),
            &artifact("x"),
            &[&sql],
        );
        assert!(matches!(result, Err(ExtractionError::Transport(_))));
    }

    #[test]
    fn test_render_taxonomy_lists_levels_in_order() {
        let sql = sql();
        let rendered = render_taxonomy(&[&sql]);
        assert_eq!(
            rendered,
            "- sql | SQL | technical | beginner < intermediate < advanced < expert"
        );
    }

    #[tokio::test]
    async fn test_keyword_extractor_picks_highest_explicit_level() {
        let sql = sql();
        let road = roadmapping();
        let text = "Wrote SQL for the churn dashboard.\n\
                    Led advanced query-optimization work on the billing warehouse!\n\
                    Shared the product roadmapping plan with sales.";
        let extraction = KeywordCompetencyExtractor
            .extract(&artifact(text), &[&sql, &road])
            .await
            .unwrap();
        assert!(!extraction.degraded);
        let obs = extraction.observations;

        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].skill_id, "sql");
        assert_eq!(obs[0].level, "advanced");
        assert_eq!(obs[0].confidence, EXPLICIT_LEVEL_CONFIDENCE);
        assert!(obs[0].evidence_text.contains("billing warehouse"));
        assert_eq!(obs[1].skill_id, "roadmapping");
        assert_eq!(obs[1].level, "beginner");
        assert_eq!(obs[1].confidence, MENTION_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_keyword_extractor_requires_whole_words() {
        let sql = sql();
        let extraction = KeywordCompetencyExtractor
            .extract(&artifact("Migrated mysqldump scripts to the new host"), &[&sql])
            .await
            .unwrap();
        assert!(extraction.observations.is_empty());
    }
}
