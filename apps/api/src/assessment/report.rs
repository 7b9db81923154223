//! Skills report: a read-only summary of one assessment and the user's
//! current learning path.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::models::assessment::{Assessment, AssessmentStatus, InsufficientEvidence};
use crate::models::learning::LearningPath;
use crate::models::skills::SkillGap;
use crate::registry::SkillTaxonomy;

const TOP_GAPS: usize = 5;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkillsReport {
    pub assessment_id: Uuid,
    pub user_id: Uuid,
    pub status: AssessmentStatus,
    pub total_gaps: usize,
    pub by_priority: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub by_size: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub total_effort_hours: f64,
    pub low_confidence_gaps: usize,
    pub evidence_warnings: Vec<InsufficientEvidence>,
    pub top_gaps: Vec<TopGap>,
    pub path: Option<PathSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopGap {
    pub skill_id: String,
    pub skill_name: String,
    pub current_level: Option<String>,
    pub target_level: String,
    pub priority: String,
    pub priority_score: f64,
    pub estimated_effort_hours: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PathSummary {
    pub module_count: usize,
    pub total_duration_minutes: u32,
    pub time_budget_minutes: Option<u32>,
    pub uncovered_skill_ids: Vec<String>,
    pub deferred_skill_ids: Vec<String>,
}

pub fn build_report(
    assessment: &Assessment,
    path: Option<&LearningPath>,
    taxonomy: &SkillTaxonomy,
) -> SkillsReport {
    let gaps = &assessment.gaps;

    let mut ranked: Vec<&SkillGap> = gaps.iter().collect();
    ranked.sort_by(|a, b| a.rank_order(b));

    let top_gaps = ranked
        .iter()
        .take(TOP_GAPS)
        .map(|g| TopGap {
            skill_id: g.skill_id.clone(),
            // Skills dropped from the taxonomy since the run keep their id.
            skill_name: taxonomy
                .get(&g.skill_id)
                .map_or_else(|| g.skill_id.clone(), |s| s.name.clone()),
            current_level: g.current_level.clone(),
            target_level: g.target_level.clone(),
            priority: g.priority.as_str().to_string(),
            priority_score: g.priority_score,
            estimated_effort_hours: g.estimated_effort_hours,
        })
        .collect();

    SkillsReport {
        assessment_id: assessment.id,
        user_id: assessment.user_id,
        status: assessment.status,
        total_gaps: gaps.len(),
        by_priority: count_by(gaps, |g| g.priority.as_str()),
        by_category: count_by(gaps, |g| g.category.as_str()),
        by_size: count_by(gaps, |g| g.gap_size.as_str()),
        by_status: count_by(gaps, |g| g.status.as_str()),
        total_effort_hours: gaps.iter().map(|g| g.estimated_effort_hours).sum(),
        low_confidence_gaps: gaps.iter().filter(|g| g.low_confidence).count(),
        evidence_warnings: assessment.evidence_warnings.clone(),
        top_gaps,
        path: path.map(|p| PathSummary {
            module_count: p.ordered_module_ids.len(),
            total_duration_minutes: p.total_duration_minutes,
            time_budget_minutes: p.time_budget_minutes,
            uncovered_skill_ids: p.uncovered_skill_ids.clone(),
            deferred_skill_ids: p.deferred_skill_ids.clone(),
        }),
    }
}

fn count_by(gaps: &[SkillGap], key: impl Fn(&SkillGap) -> &'static str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for gap in gaps {
        *counts.entry(key(gap).to_string()).or_insert(0) += 1;
    }
    counts
}
