//! Progress Correlator: matches a logged work task against a user's open
//! gaps and advances their status.
//!
//! Overlap uses the gap skill's id, name and synonyms, normalized. A task
//! overlaps a gap on one exact tag match or on two distinct keyword matches
//! across tags and description. Overlapping gaps move to `resolved` when a
//! path module for the skill is completed, else `open → in_progress`.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::learning::{LearningPath, WorkTask};
use crate::models::skills::{contains_phrase, normalize_term, GapStatus, SkillGap};
use crate::registry::{ModuleCatalog, SkillTaxonomy};

/// Keyword matches needed when no tag matches exactly.
const MIN_KEYWORD_MATCHES: usize = 2;

pub struct CorrelationContext<'a> {
    pub task: &'a WorkTask,
    pub path: Option<&'a LearningPath>,
    pub completed_module_ids: &'a HashSet<String>,
    pub catalog: &'a ModuleCatalog,
    pub taxonomy: &'a SkillTaxonomy,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GapTransition {
    pub gap_id: Uuid,
    pub skill_id: String,
    pub from: GapStatus,
    pub to: GapStatus,
    pub matched_terms: Vec<String>,
    /// The completed path module that justified a resolution.
    pub module_id: Option<String>,
}

#[derive(Debug, Default, PartialEq)]
struct Overlap {
    tag_matches: Vec<String>,
    keyword_matches: Vec<String>,
}

impl Overlap {
    fn passes(&self) -> bool {
        !self.tag_matches.is_empty() || self.keyword_matches.len() >= MIN_KEYWORD_MATCHES
    }
}

/// Applies the task to `gaps` in place and returns the transitions made.
pub fn correlate_task(ctx: &CorrelationContext<'_>, gaps: &mut [SkillGap]) -> Vec<GapTransition> {
    let tags: Vec<String> = ctx
        .task
        .tags
        .iter()
        .map(|t| normalize_term(t))
        .filter(|t| !t.is_empty())
        .collect();
    let description = normalize_term(&ctx.task.description);

    let mut transitions = Vec::new();
    for gap in gaps.iter_mut() {
        if !gap.is_active() {
            continue;
        }

        let terms = match ctx.taxonomy.get(&gap.skill_id) {
            Some(entry) => entry.normalized_terms(),
            None => vec![normalize_term(&gap.skill_id)],
        };
        let overlap = find_overlap(&terms, &tags, &description);
        if !overlap.passes() {
            continue;
        }

        let completed_module = completed_module_for(ctx, &gap.skill_id);
        let next = if completed_module.is_some() {
            GapStatus::Resolved
        } else if gap.status == GapStatus::Open {
            GapStatus::InProgress
        } else {
            debug!(
                "Task {} overlaps {} but no completed module yet",
                ctx.task.task_id, gap.skill_id
            );
            continue;
        };

        let from = gap.status;
        match gap.transition(next, ctx.task.completed_at) {
            Ok(()) => {
                info!(
                    "Task {} moved gap {} ({}) {from} -> {next}",
                    ctx.task.task_id, gap.id, gap.skill_id
                );
                let mut matched_terms = overlap.tag_matches;
                for kw in overlap.keyword_matches {
                    if !matched_terms.contains(&kw) {
                        matched_terms.push(kw);
                    }
                }
                transitions.push(GapTransition {
                    gap_id: gap.id,
                    skill_id: gap.skill_id.clone(),
                    from,
                    to: next,
                    matched_terms,
                    module_id: completed_module,
                });
            }
            Err(e) => warn!("Skipped transition for task {}: {e}", ctx.task.task_id),
        }
    }
    transitions
}

fn find_overlap(terms: &[String], tags: &[String], description: &str) -> Overlap {
    let mut overlap = Overlap::default();
    for term in terms {
        if tags.iter().any(|t| t == term) {
            overlap.tag_matches.push(term.clone());
        }
        let in_tags = tags.iter().any(|t| contains_phrase(t, term));
        if in_tags || contains_phrase(description, term) {
            overlap.keyword_matches.push(term.clone());
        }
    }
    overlap
}

/// First module of the path (in path order) covering the skill that the user has completed.
fn completed_module_for(ctx: &CorrelationContext<'_>, skill_id: &str) -> Option<String> {
    let path = ctx.path?;
    path.ordered_module_ids
        .iter()
        .filter(|id| ctx.completed_module_ids.contains(*id))
        .find(|id| {
            ctx.catalog
                .get(id)
                .map(|m| m.covers(skill_id))
                .unwrap_or(false)
        })
        .cloned()
}
