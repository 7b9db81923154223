//! Learning Path Assembler: greedy, deterministic module selection over
//! ranked gaps.
//!
//! Walk gaps in priority order. A gap already covered by a chosen module is
//! skipped. Otherwise pick, among unchosen modules for its skill that fit the
//! remaining budget, the one covering the most still-uncovered gap skills,
//! then the shortest, then the lowest id. Stop at the module cap or when the
//! budget is spent.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::learning::{LearningModule, LearningPath};
use crate::models::skills::SkillGap;
use crate::registry::ModuleCatalog;

pub const DEFAULT_MAX_MODULES: usize = 10;

pub struct PathRequest<'a> {
    pub user_id: Uuid,
    pub assessment_id: Option<Uuid>,
    pub gaps: &'a [SkillGap],
    pub catalog: &'a ModuleCatalog,
    /// `None` means unlimited.
    pub time_budget_minutes: Option<u32>,
    pub max_modules: usize,
    pub generated_at: DateTime<Utc>,
}

pub fn assemble_path(req: &PathRequest<'_>) -> LearningPath {
    let mut active: Vec<&SkillGap> = req.gaps.iter().filter(|g| g.is_active()).collect();
    active.sort_by(|a, b| a.rank_order(b));

    let gap_skills: BTreeSet<&str> = active.iter().map(|g| g.skill_id.as_str()).collect();
    let mut covered: HashSet<&str> = HashSet::new();
    let mut selected: Vec<&LearningModule> = Vec::new();
    let mut remaining = req.time_budget_minutes;

    for gap in &active {
        if selected.len() >= req.max_modules || remaining == Some(0) {
            break;
        }
        if covered.contains(gap.skill_id.as_str()) {
            continue;
        }

        let best = req
            .catalog
            .covering(&gap.skill_id)
            .filter(|m| !selected.iter().any(|s| s.id == m.id))
            .filter(|m| remaining.map_or(true, |left| m.duration_minutes <= left))
            .max_by(|a, b| {
                let gain_a = new_coverage(a, &gap_skills, &covered);
                let gain_b = new_coverage(b, &gap_skills, &covered);
                gain_a
                    .cmp(&gain_b)
                    .then_with(|| b.duration_minutes.cmp(&a.duration_minutes))
                    .then_with(|| b.id.cmp(&a.id))
            });

        if let Some(module) = best {
            debug!("Selected module {} for gap {}", module.id, gap.skill_id);
            for skill in &module.skill_ids {
                if gap_skills.contains(skill.as_str()) {
                    covered.insert(skill.as_str());
                }
            }
            if let Some(left) = remaining.as_mut() {
                *left -= module.duration_minutes;
            }
            selected.push(module);
        }
    }

    let mut uncovered_skill_ids = Vec::new();
    let mut deferred_skill_ids = Vec::new();
    let mut seen = HashSet::new();
    for gap in &active {
        let skill = gap.skill_id.as_str();
        if covered.contains(skill) || !seen.insert(skill) {
            continue;
        }
        if req.catalog.covering(skill).next().is_none() {
            uncovered_skill_ids.push(skill.to_string());
        } else {
            deferred_skill_ids.push(skill.to_string());
        }
    }
    if !uncovered_skill_ids.is_empty() {
        warn!(
            "No catalog module teaches: {}",
            uncovered_skill_ids.join(", ")
        );
    }

    LearningPath {
        user_id: req.user_id,
        assessment_id: req.assessment_id,
        ordered_module_ids: selected.iter().map(|m| m.id.clone()).collect(),
        total_duration_minutes: selected.iter().map(|m| m.duration_minutes).sum(),
        time_budget_minutes: req.time_budget_minutes,
        uncovered_skill_ids,
        deferred_skill_ids,
        generated_at: req.generated_at,
    }
}

/// Gap skills a module would newly cover.
fn new_coverage(module: &LearningModule, gap_skills: &BTreeSet<&str>, covered: &HashSet<&str>) -> usize {
    module
        .skill_ids
        .iter()
        .filter(|s| gap_skills.contains(s.as_str()) && !covered.contains(s.as_str()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::skills::{GapSize, GapStatus, Severity, SkillCategory};
    use crate::registry::taxonomy::tests::skill;
    use crate::registry::SkillTaxonomy;
    use chrono::TimeZone;

    fn epoch() -> DateTime<Utc> {
        Utc.timestamp_opt(0, 0).unwrap()
    }

    fn gap(skill_id: &str, score: f64) -> SkillGap {
        let at = epoch();
        SkillGap {
            id: Uuid::new_v5(&Uuid::nil(), skill_id.as_bytes()),
            assessment_id: Uuid::nil(),
            user_id: Uuid::nil(),
            skill_id: skill_id.to_string(),
            category: SkillCategory::Technical,
            current_level: None,
            target_level: "advanced".to_string(),
            priority: Severity::from_score(score),
            priority_score: score,
            urgency: Severity::High,
            urgency_score: 0.6,
            estimated_effort_hours: 12.0,
            gap_size: GapSize::Small,
            status: GapStatus::Open,
            evidence_sources: vec![],
            low_confidence: false,
            archived: false,
            created_at: at,
            updated_at: at,
        }
    }

    fn module(id: &str, skills: &[&str], minutes: u32) -> LearningModule {
        LearningModule {
            id: id.to_string(),
            title: id.to_string(),
            skill_ids: skills.iter().map(|s| s.to_string()).collect(),
            difficulty: "intermediate".to_string(),
            duration_minutes: minutes,
            content_ref: format!("content/{id}"),
        }
    }

    fn catalog(modules: Vec<LearningModule>) -> ModuleCatalog {
        let taxonomy = SkillTaxonomy::from_entries(vec![
            skill("sql", &[]),
            skill("api-design", &[]),
            skill("roadmapping", &[]),
            skill("negotiation", &[]),
        ])
        .unwrap();
        ModuleCatalog::from_modules(modules, &taxonomy).unwrap()
    }

    fn assemble(gaps: &[SkillGap], catalog: &ModuleCatalog, budget: Option<u32>) -> LearningPath {
        assemble_path(&PathRequest {
            user_id: Uuid::nil(),
            assessment_id: None,
            gaps,
            catalog,
            time_budget_minutes: budget,
            max_modules: DEFAULT_MAX_MODULES,
            generated_at: epoch(),
        })
    }

    #[test]
    fn test_broad_module_preferred_within_budget() {
        let catalog = catalog(vec![
            module("A", &["sql", "api-design"], 15),
            module("B", &["sql"], 10),
        ]);
        let gaps = vec![gap("sql", 0.6), gap("api-design", 0.6)];
        let path = assemble(&gaps, &catalog, Some(20));
        assert_eq!(path.ordered_module_ids, vec!["A"]);
        assert_eq!(path.total_duration_minutes, 15);
        assert!(path.uncovered_skill_ids.is_empty());
        assert!(path.deferred_skill_ids.is_empty());
    }

    #[test]
    fn test_tight_budget_defers_what_does_not_fit() {
        let catalog = catalog(vec![
            module("A", &["sql", "api-design"], 15),
            module("B", &["sql"], 10),
        ]);
        let gaps = vec![gap("sql", 0.7), gap("api-design", 0.6)];
        let path = assemble(&gaps, &catalog, Some(12));
        assert_eq!(path.ordered_module_ids, vec!["B"]);
        assert_eq!(path.deferred_skill_ids, vec!["api-design"]);
        assert!(path.total_duration_minutes <= 12);
    }

    #[test]
    fn test_uncovered_skills_reported() {
        let catalog = catalog(vec![module("B", &["sql"], 10)]);
        let gaps = vec![gap("negotiation", 0.9), gap("sql", 0.5)];
        let path = assemble(&gaps, &catalog, None);
        assert_eq!(path.ordered_module_ids, vec!["B"]);
        assert_eq!(path.uncovered_skill_ids, vec!["negotiation"]);
    }

    #[test]
    fn test_tie_breaks_shortest_then_lowest_id() {
        let catalog = catalog(vec![
            module("c-long", &["sql"], 14),
            module("b-short", &["sql"], 8),
            module("a-short", &["sql"], 8),
        ]);
        let path = assemble(&[gap("sql", 0.5)], &catalog, None);
        assert_eq!(path.ordered_module_ids, vec!["a-short"]);
    }

    #[test]
    fn test_module_cap_and_no_duplicates() {
        let catalog = catalog(vec![
            module("m1", &["sql", "roadmapping"], 10),
            module("m2", &["api-design"], 10),
            module("m3", &["negotiation", "roadmapping"], 10),
        ]);
        let gaps = vec![
            gap("sql", 0.9),
            gap("roadmapping", 0.8),
            gap("api-design", 0.7),
            gap("negotiation", 0.6),
        ];
        let capped = assemble_path(&PathRequest {
            user_id: Uuid::nil(),
            assessment_id: None,
            gaps: &gaps,
            catalog: &catalog,
            time_budget_minutes: None,
            max_modules: 2,
            generated_at: epoch(),
        });
        assert_eq!(capped.ordered_module_ids, vec!["m1", "m2"]);
        assert_eq!(capped.deferred_skill_ids, vec!["negotiation"]);

        let full = assemble(&gaps, &catalog, None);
        let unique: HashSet<_> = full.ordered_module_ids.iter().collect();
        assert_eq!(unique.len(), full.ordered_module_ids.len());
        assert_eq!(full.ordered_module_ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_budget_never_exceeded() {
        let catalog = catalog(vec![
            module("m1", &["sql"], 15),
            module("m2", &["api-design"], 9),
            module("m3", &["roadmapping"], 7),
            module("m4", &["negotiation"], 12),
        ]);
        let gaps = vec![
            gap("sql", 0.9),
            gap("api-design", 0.8),
            gap("roadmapping", 0.7),
            gap("negotiation", 0.6),
        ];
        for budget in 0..50 {
            let path = assemble(&gaps, &catalog, Some(budget));
            assert!(path.total_duration_minutes <= budget, "budget {budget}");
        }
    }

    #[test]
    fn test_resolved_and_archived_gaps_ignored() {
        let catalog = catalog(vec![module("B", &["sql"], 10), module("C", &["api-design"], 10)]);
        let mut resolved = gap("sql", 0.9);
        resolved.status = GapStatus::Resolved;
        let mut archived = gap("api-design", 0.8);
        archived.archived = true;
        let path = assemble(&[resolved, archived], &catalog, None);
        assert!(path.ordered_module_ids.is_empty());
        assert!(path.deferred_skill_ids.is_empty());
    }
}
