use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shortest and longest allowed micro-learning module, in minutes.
pub const MIN_MODULE_MINUTES: u32 = 7;
pub const MAX_MODULE_MINUTES: u32 = 15;

/// Immutable catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearningModule {
    pub id: String,
    pub title: String,
    pub skill_ids: BTreeSet<String>,
    pub difficulty: String,
    pub duration_minutes: u32,
    pub content_ref: String,
}

impl LearningModule {
    pub fn covers(&self, skill_id: &str) -> bool {
        self.skill_ids.contains(skill_id)
    }
}

/// Recommended completion order of modules for one user.
/// Always regenerated as a whole.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearningPath {
    pub user_id: Uuid,
    pub assessment_id: Option<Uuid>,
    pub ordered_module_ids: Vec<String>,
    pub total_duration_minutes: u32,
    pub time_budget_minutes: Option<u32>,
    /// Skills with a gap that no catalog module teaches.
    pub uncovered_skill_ids: Vec<String>,
    /// Skills a module could teach but which did not fit the budget or module cap.
    pub deferred_skill_ids: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleCompletion {
    pub user_id: Uuid,
    pub module_id: String,
    pub completed_at: DateTime<Utc>,
}

/// A logged piece of finished work, correlated against open gaps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkTask {
    pub task_id: String,
    pub user_id: Uuid,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub completed_at: DateTime<Utc>,
}
