//! Store: persistence seam for assessments, gaps, paths, completions and tasks.
//!
//! Records are written as whole-record upserts keyed by id, except gap
//! status, which only moves through `transition_gap`. `PgStore` backs the
//! service; `MemoryStore` backs the test suite.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::assessment::Assessment;
use crate::models::learning::{LearningPath, ModuleCompletion, WorkTask};
use crate::models::skills::{GapStatus, SkillGap};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Upserts the assessment and every gap it carries.
    async fn save_assessment(&self, assessment: &Assessment) -> Result<()>;

    /// The assessment with all of its gaps, archived ones included.
    async fn get_assessment(&self, id: Uuid) -> Result<Option<Assessment>>;

    /// Newest first.
    async fn list_assessments(&self, user_id: Uuid) -> Result<Vec<Assessment>>;

    /// In one transaction: archives the user's active gaps from other
    /// assessments, upserts the completed assessment with its gaps and
    /// replaces the user's path. Returns the number of gaps archived.
    async fn complete_assessment(
        &self,
        assessment: &Assessment,
        path: &LearningPath,
    ) -> Result<usize>;

    /// Moves a gap from `from` to `to` only if it is still active and in
    /// `from`. `false` means another writer got there first.
    async fn transition_gap(
        &self,
        gap_id: Uuid,
        from: GapStatus,
        to: GapStatus,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Non-archived gaps of the user, ranked by priority score then skill id.
    async fn current_gaps(&self, user_id: Uuid) -> Result<Vec<SkillGap>>;

    async fn save_path(&self, path: &LearningPath) -> Result<()>;

    async fn get_path(&self, user_id: Uuid) -> Result<Option<LearningPath>>;

    async fn save_completion(&self, completion: &ModuleCompletion) -> Result<()>;

    async fn completed_modules(&self, user_id: Uuid) -> Result<HashSet<String>>;

    async fn save_task(&self, task: &WorkTask) -> Result<()>;
}
