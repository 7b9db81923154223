//! Gap Scorer: turns observations and a target competency profile into a
//! ranked list of skill gaps.
//!
//! Pure and deterministic: gap ids are derived from (assessment, skill) and
//! timestamps come from the caller's `as_of`, so identical input always
//! serializes to identical output.
//!
//! Algorithm:
//! 1. current level = highest level among observations whose confidence,
//!    decayed by evidence age, reaches the threshold
//! 2. gap when current < target or the skill is unobserved
//! 3. urgency from category weight × business impact × deadline proximity
//! 4. priority from urgency and inverse effort; ties broken by skill id
//! 5. no observations and no fallback level → gap flagged `low_confidence`

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::assessment::scoring::{
    compute_deadline_factor, compute_priority_score, compute_recency_factor,
    compute_urgency_score, BusinessImpact, ScoringConfig,
};
use crate::models::assessment::InsufficientEvidence;
use crate::models::skills::{GapSize, GapStatus, Observation, Severity, SkillGap, SkillTaxonomyEntry};
use crate::registry::SkillTaxonomy;

/// One line of the target competency profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetRequirement {
    pub skill_id: String,
    pub level: String,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub business_impact: Option<BusinessImpact>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    #[error("target profile is empty")]
    Empty,

    #[error("unknown skill '{0}' in target profile")]
    UnknownSkill(String),

    #[error("skill '{skill}' has no level '{level}'")]
    UnknownLevel { skill: String, level: String },

    #[error("skill '{0}' appears more than once in target profile")]
    DuplicateSkill(String),
}

pub struct GapScoringInput<'a> {
    pub assessment_id: Uuid,
    pub user_id: Uuid,
    pub observations: &'a [Observation],
    pub profile: &'a [TargetRequirement],
    pub taxonomy: &'a SkillTaxonomy,
    pub config: &'a ScoringConfig,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GapScoringResult {
    pub gaps: Vec<SkillGap>,
    pub evidence_warnings: Vec<InsufficientEvidence>,
}

/// Checks every requirement names a known skill and one of its levels.
pub fn validate_profile(
    profile: &[TargetRequirement],
    taxonomy: &SkillTaxonomy,
) -> Result<(), ProfileError> {
    if profile.is_empty() {
        return Err(ProfileError::Empty);
    }
    let mut seen = HashSet::new();
    for req in profile {
        let entry = taxonomy
            .get(&req.skill_id)
            .ok_or_else(|| ProfileError::UnknownSkill(req.skill_id.clone()))?;
        if entry.level_index(&req.level).is_none() {
            return Err(ProfileError::UnknownLevel {
                skill: req.skill_id.clone(),
                level: req.level.clone(),
            });
        }
        if !seen.insert(req.skill_id.as_str()) {
            return Err(ProfileError::DuplicateSkill(req.skill_id.clone()));
        }
    }
    Ok(())
}

pub fn score_gaps(input: &GapScoringInput<'_>) -> Result<GapScoringResult, ProfileError> {
    validate_profile(input.profile, input.taxonomy)?;

    for obs in input.observations {
        if input.taxonomy.get(&obs.skill_id).is_none() {
            debug!("Ignoring observation for unknown skill '{}'", obs.skill_id);
        }
    }

    let mut gaps = Vec::new();
    let mut evidence_warnings = Vec::new();

    for req in input.profile {
        // validate_profile guarantees both lookups succeed
        let Some(entry) = input.taxonomy.get(&req.skill_id) else {
            continue;
        };
        let Some(target_idx) = entry.level_index(&req.level) else {
            continue;
        };

        let evidence = assess_current_level(entry, input);

        let (current_idx, low_confidence) = match evidence.best_level {
            Some(idx) => (Some(idx), false),
            None if evidence.observation_count == 0 => {
                let fallback = input
                    .config
                    .fallback_level
                    .as_deref()
                    .and_then(|l| entry.level_index(l));
                match fallback {
                    Some(idx) => (Some(idx), false),
                    None => {
                        evidence_warnings.push(InsufficientEvidence {
                            skill_id: entry.id.clone(),
                            target_level: entry.proficiency_levels[target_idx].clone(),
                        });
                        (None, true)
                    }
                }
            }
            None => (None, false),
        };

        let levels_to_climb = match current_idx {
            Some(current) if current >= target_idx => continue,
            Some(current) => target_idx - current,
            None => target_idx + 1,
        };

        gaps.push(build_gap(
            input,
            req,
            entry,
            current_idx,
            target_idx,
            levels_to_climb,
            low_confidence,
            evidence.sources,
        ));
    }

    gaps.sort_by(|a, b| a.rank_order(b));

    Ok(GapScoringResult {
        gaps,
        evidence_warnings,
    })
}

struct LevelEvidence {
    best_level: Option<usize>,
    observation_count: usize,
    sources: Vec<String>,
}

fn assess_current_level(entry: &SkillTaxonomyEntry, input: &GapScoringInput<'_>) -> LevelEvidence {
    let mut best_level: Option<usize> = None;
    let mut observation_count = 0;
    let mut sources: Vec<String> = Vec::new();

    for obs in input.observations.iter().filter(|o| o.skill_id == entry.id) {
        let Some(level_idx) = entry.level_index(&obs.level) else {
            warn!(
                "Observation for '{}' has unknown level '{}', ignored",
                entry.id, obs.level
            );
            continue;
        };
        if !(0.0..=1.0).contains(&obs.confidence) {
            warn!(
                "Observation for '{}' has out-of-range confidence {}, ignored",
                entry.id, obs.confidence
            );
            continue;
        }
        observation_count += 1;

        let recency = compute_recency_factor(
            obs.observed_at,
            input.as_of,
            input.config.evidence_half_life_months,
        );
        let effective = obs.confidence * recency;
        if effective < input.config.confidence_threshold {
            continue;
        }

        best_level = Some(best_level.map_or(level_idx, |b| b.max(level_idx)));
        if !sources.contains(&obs.source_artifact_id) {
            sources.push(obs.source_artifact_id.clone());
        }
    }

    LevelEvidence {
        best_level,
        observation_count,
        sources,
    }
}

#[allow(clippy::too_many_arguments)]
fn build_gap(
    input: &GapScoringInput<'_>,
    req: &TargetRequirement,
    entry: &SkillTaxonomyEntry,
    current_idx: Option<usize>,
    target_idx: usize,
    levels_to_climb: usize,
    low_confidence: bool,
    evidence_sources: Vec<String>,
) -> SkillGap {
    let config = input.config;
    let deadline_factor = compute_deadline_factor(req.deadline, input.as_of);
    let urgency_score = compute_urgency_score(
        entry.category,
        req.business_impact.unwrap_or_default(),
        deadline_factor,
        config,
    );
    let effort_hours = levels_to_climb as f64 * config.hours_per_level(entry.category);
    let priority_score = compute_priority_score(urgency_score, effort_hours, config);

    SkillGap {
        id: Uuid::new_v5(&input.assessment_id, entry.id.as_bytes()),
        assessment_id: input.assessment_id,
        user_id: input.user_id,
        skill_id: entry.id.clone(),
        category: entry.category,
        current_level: current_idx.map(|i| entry.proficiency_levels[i].clone()),
        target_level: entry.proficiency_levels[target_idx].clone(),
        priority: Severity::from_score(priority_score),
        priority_score,
        urgency: Severity::from_score(urgency_score),
        urgency_score,
        estimated_effort_hours: effort_hours,
        gap_size: GapSize::from_levels(levels_to_climb),
        status: GapStatus::Open,
        evidence_sources,
        low_confidence,
        archived: false,
        created_at: input.as_of,
        updated_at: input.as_of,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::skills::SkillCategory;
    use crate::registry::taxonomy::tests::skill;
    use chrono::TimeZone;

    fn taxonomy() -> SkillTaxonomy {
        let mut stakeholder = skill("stakeholder-management", &[]);
        stakeholder.category = SkillCategory::Soft;
        SkillTaxonomy::from_entries(vec![
            skill("sql", &[]),
            skill("api-design", &[]),
            skill("roadmapping", &[]),
            stakeholder,
        ])
        .unwrap()
    }

    fn obs(skill_id: &str, level: &str, confidence: f64, artifact: &str) -> Observation {
        Observation {
            skill_id: skill_id.to_string(),
            level: level.to_string(),
            evidence_text: format!("{skill_id} evidence"),
            confidence,
            source_artifact_id: artifact.to_string(),
            observed_at: None,
        }
    }

    fn req(skill_id: &str, level: &str) -> TargetRequirement {
        TargetRequirement {
            skill_id: skill_id.to_string(),
            level: level.to_string(),
            deadline: None,
            business_impact: None,
        }
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn run(
        observations: &[Observation],
        profile: &[TargetRequirement],
        config: &ScoringConfig,
    ) -> GapScoringResult {
        let taxonomy = taxonomy();
        let input = GapScoringInput {
            assessment_id: Uuid::nil(),
            user_id: Uuid::nil(),
            observations,
            profile,
            taxonomy: &taxonomy,
            config,
            as_of: as_of(),
        };
        score_gaps(&input).unwrap()
    }

    #[test]
    fn test_sql_intermediate_to_advanced() {
        let result = run(
            &[obs("sql", "intermediate", 0.8, "art_1")],
            &[req("sql", "advanced")],
            &ScoringConfig::default(),
        );
        assert_eq!(result.gaps.len(), 1);
        let gap = &result.gaps[0];
        assert_eq!(gap.skill_id, "sql");
        assert_eq!(gap.current_level.as_deref(), Some("intermediate"));
        assert_eq!(gap.target_level, "advanced");
        assert_eq!(gap.status, GapStatus::Open);
        assert!(!gap.low_confidence);
        assert_eq!(gap.evidence_sources, vec!["art_1".to_string()]);
    }

    #[test]
    fn test_no_gap_when_target_met() {
        let result = run(
            &[obs("sql", "expert", 0.9, "art_1")],
            &[req("sql", "advanced")],
            &ScoringConfig::default(),
        );
        assert!(result.gaps.is_empty());
        assert!(result.evidence_warnings.is_empty());
    }

    #[test]
    fn test_current_level_uses_highest_confident_observation() {
        let result = run(
            &[
                obs("sql", "beginner", 0.9, "art_1"),
                obs("sql", "intermediate", 0.7, "art_2"),
                obs("sql", "expert", 0.3, "art_3"),
            ],
            &[req("sql", "expert")],
            &ScoringConfig::default(),
        );
        let gap = &result.gaps[0];
        assert_eq!(gap.current_level.as_deref(), Some("intermediate"));
        assert_eq!(gap.evidence_sources, vec!["art_1", "art_2"]);
    }

    #[test]
    fn test_below_threshold_is_unobserved_but_not_low_confidence() {
        let result = run(
            &[obs("sql", "advanced", 0.4, "art_1")],
            &[req("sql", "advanced")],
            &ScoringConfig::default(),
        );
        let gap = &result.gaps[0];
        assert_eq!(gap.current_level, None);
        assert!(!gap.low_confidence);
        assert!(result.evidence_warnings.is_empty());
    }

    #[test]
    fn test_stale_evidence_decays_below_threshold() {
        let mut old = obs("sql", "advanced", 0.8, "art_1");
        old.observed_at = Some(Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap());
        let result = run(&[old], &[req("sql", "advanced")], &ScoringConfig::default());
        assert_eq!(result.gaps.len(), 1);
        assert_eq!(result.gaps[0].current_level, None);
    }

    #[test]
    fn test_unobserved_skill_is_low_confidence_gap() {
        let result = run(&[], &[req("roadmapping", "intermediate")], &ScoringConfig::default());
        assert_eq!(result.gaps.len(), 1);
        assert!(result.gaps[0].low_confidence);
        assert_eq!(result.gaps[0].current_level, None);
        assert_eq!(
            result.evidence_warnings,
            vec![InsufficientEvidence {
                skill_id: "roadmapping".to_string(),
                target_level: "intermediate".to_string(),
            }]
        );
    }

    #[test]
    fn test_fallback_level_suppresses_insufficient_evidence() {
        let config = ScoringConfig {
            fallback_level: Some("beginner".to_string()),
            ..ScoringConfig::default()
        };
        let result = run(&[], &[req("roadmapping", "advanced")], &config);
        let gap = &result.gaps[0];
        assert_eq!(gap.current_level.as_deref(), Some("beginner"));
        assert!(!gap.low_confidence);
        assert!(result.evidence_warnings.is_empty());

        let met = run(&[], &[req("roadmapping", "beginner")], &config);
        assert!(met.gaps.is_empty());
    }

    #[test]
    fn test_every_gap_is_below_target_or_low_confidence() {
        let taxonomy = taxonomy();
        let result = run(
            &[
                obs("sql", "intermediate", 0.8, "a"),
                obs("api-design", "beginner", 0.95, "b"),
                obs("stakeholder-management", "advanced", 0.5, "c"),
            ],
            &[
                req("sql", "advanced"),
                req("api-design", "expert"),
                req("stakeholder-management", "advanced"),
                req("roadmapping", "intermediate"),
            ],
            &ScoringConfig::default(),
        );
        for gap in &result.gaps {
            let entry = taxonomy.get(&gap.skill_id).unwrap();
            let target = entry.level_index(&gap.target_level).unwrap();
            match gap.current_level.as_deref().and_then(|l| entry.level_index(l)) {
                Some(current) => assert!(current < target || gap.low_confidence),
                None => {}
            }
        }
        assert_eq!(result.gaps.len(), 4);
    }

    #[test]
    fn test_lower_effort_ranks_first_at_equal_urgency() {
        let result = run(
            &[obs("sql", "advanced", 0.9, "a"), obs("api-design", "beginner", 0.9, "b")],
            &[req("sql", "expert"), req("api-design", "expert")],
            &ScoringConfig::default(),
        );
        assert_eq!(result.gaps[0].skill_id, "sql");
        assert!(result.gaps[0].estimated_effort_hours < result.gaps[1].estimated_effort_hours);
        assert!(result.gaps[0].priority_score > result.gaps[1].priority_score);
    }

    #[test]
    fn test_ties_broken_by_skill_id() {
        let result = run(
            &[obs("sql", "intermediate", 0.9, "a"), obs("api-design", "intermediate", 0.9, "b")],
            &[req("sql", "advanced"), req("api-design", "advanced")],
            &ScoringConfig::default(),
        );
        assert_eq!(result.gaps[0].priority_score, result.gaps[1].priority_score);
        assert_eq!(result.gaps[0].skill_id, "api-design");
        assert_eq!(result.gaps[1].skill_id, "sql");
    }

    #[test]
    fn test_deadline_and_impact_raise_urgency() {
        let mut urgent = req("sql", "advanced");
        urgent.deadline = NaiveDate::from_ymd_opt(2026, 3, 10);
        urgent.business_impact = Some(BusinessImpact::Critical);
        let result = run(
            &[obs("sql", "intermediate", 0.9, "a"), obs("api-design", "intermediate", 0.9, "b")],
            &[urgent, req("api-design", "advanced")],
            &ScoringConfig::default(),
        );
        assert_eq!(result.gaps[0].skill_id, "sql");
        assert_eq!(result.gaps[0].urgency, Severity::Critical);
        assert!(result.gaps[0].urgency_score > result.gaps[1].urgency_score);
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let observations = vec![
            obs("sql", "intermediate", 0.8, "a"),
            obs("api-design", "beginner", 0.7, "b"),
        ];
        let profile = vec![
            req("sql", "advanced"),
            req("api-design", "advanced"),
            req("roadmapping", "beginner"),
        ];
        let config = ScoringConfig::default();
        let first = serde_json::to_string(&run(&observations, &profile, &config)).unwrap();
        let second = serde_json::to_string(&run(&observations, &profile, &config)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_profile_validation() {
        let taxonomy = taxonomy();
        assert_eq!(validate_profile(&[], &taxonomy), Err(ProfileError::Empty));
        assert_eq!(
            validate_profile(&[req("cobol", "expert")], &taxonomy),
            Err(ProfileError::UnknownSkill("cobol".to_string()))
        );
        assert!(matches!(
            validate_profile(&[req("sql", "wizard")], &taxonomy),
            Err(ProfileError::UnknownLevel { .. })
        ));
        assert_eq!(
            validate_profile(&[req("sql", "expert"), req("sql", "advanced")], &taxonomy),
            Err(ProfileError::DuplicateSkill("sql".to_string()))
        );
    }

    #[test]
    fn test_unknown_level_observation_ignored() {
        let result = run(
            &[obs("sql", "wizard", 0.99, "a")],
            &[req("sql", "advanced")],
            &ScoringConfig::default(),
        );
        assert_eq!(result.gaps[0].current_level, None);
        assert!(result.gaps[0].evidence_sources.is_empty());
    }

    #[test]
    fn test_only_invalid_observations_count_as_no_evidence() {
        let result = run(
            &[obs("sql", "wizard", 0.9, "a"), obs("sql", "expert", 1.7, "b")],
            &[req("sql", "advanced")],
            &ScoringConfig::default(),
        );
        assert!(result.gaps[0].low_confidence);
        assert_eq!(result.evidence_warnings.len(), 1);
        assert_eq!(result.evidence_warnings[0].skill_id, "sql");
    }
}
