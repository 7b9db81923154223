use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::assessment::Assessment;
use crate::models::learning::{LearningPath, ModuleCompletion, WorkTask};
use crate::models::skills::{GapStatus, SkillGap};
use crate::store::Store;

/// In-process store with the same upsert semantics as `PgStore`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
    /// When set, `complete_assessment` fails without writing anything.
    pub fail_completion: AtomicBool,
}

#[derive(Default)]
struct Tables {
    /// Assessments are kept without gaps; gaps live in `gaps`.
    assessments: HashMap<Uuid, Assessment>,
    gaps: HashMap<Uuid, SkillGap>,
    paths: HashMap<Uuid, LearningPath>,
    completions: HashMap<(Uuid, String), ModuleCompletion>,
    tasks: HashMap<(Uuid, String), WorkTask>,
}

impl Tables {
    fn with_gaps(&self, assessment: &Assessment) -> Assessment {
        let mut gaps: Vec<SkillGap> = self
            .gaps
            .values()
            .filter(|g| g.assessment_id == assessment.id)
            .cloned()
            .collect();
        gaps.sort_by(|a, b| a.rank_order(b));
        Assessment {
            gaps,
            ..assessment.clone()
        }
    }

    /// Status of an already stored gap is kept, as in `PgStore`.
    fn put_assessment(&mut self, assessment: &Assessment) {
        for gap in &assessment.gaps {
            let mut gap = gap.clone();
            if let Some(existing) = self.gaps.get(&gap.id) {
                gap.status = existing.status;
            }
            self.gaps.insert(gap.id, gap);
        }
        let stored = Assessment {
            gaps: Vec::new(),
            ..assessment.clone()
        };
        self.assessments.insert(assessment.id, stored);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_assessment(&self, assessment: &Assessment) -> Result<()> {
        self.inner.lock().await.put_assessment(assessment);
        Ok(())
    }

    async fn get_assessment(&self, id: Uuid) -> Result<Option<Assessment>> {
        let tables = self.inner.lock().await;
        Ok(tables.assessments.get(&id).map(|a| tables.with_gaps(a)))
    }

    async fn list_assessments(&self, user_id: Uuid) -> Result<Vec<Assessment>> {
        let tables = self.inner.lock().await;
        let mut out: Vec<Assessment> = tables
            .assessments
            .values()
            .filter(|a| a.user_id == user_id)
            .map(|a| tables.with_gaps(a))
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn complete_assessment(
        &self,
        assessment: &Assessment,
        path: &LearningPath,
    ) -> Result<usize> {
        if self.fail_completion.load(Ordering::SeqCst) {
            bail!("store unavailable");
        }
        let at = assessment.completed_at.unwrap_or_else(Utc::now);
        let mut tables = self.inner.lock().await;
        let mut archived = 0;
        for gap in tables.gaps.values_mut().filter(|g| {
            g.user_id == assessment.user_id && g.assessment_id != assessment.id && !g.archived
        }) {
            gap.archived = true;
            gap.updated_at = at;
            archived += 1;
        }
        tables.put_assessment(assessment);
        tables.paths.insert(path.user_id, path.clone());
        Ok(archived)
    }

    async fn transition_gap(
        &self,
        gap_id: Uuid,
        from: GapStatus,
        to: GapStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.inner.lock().await;
        match tables.gaps.get_mut(&gap_id) {
            Some(gap) if gap.status == from => Ok(gap.transition(to, at).is_ok()),
            _ => Ok(false),
        }
    }

    async fn current_gaps(&self, user_id: Uuid) -> Result<Vec<SkillGap>> {
        let tables = self.inner.lock().await;
        let mut gaps: Vec<SkillGap> = tables
            .gaps
            .values()
            .filter(|g| g.user_id == user_id && !g.archived)
            .cloned()
            .collect();
        gaps.sort_by(|a, b| a.rank_order(b));
        Ok(gaps)
    }

    async fn save_path(&self, path: &LearningPath) -> Result<()> {
        self.inner
            .lock()
            .await
            .paths
            .insert(path.user_id, path.clone());
        Ok(())
    }

    async fn get_path(&self, user_id: Uuid) -> Result<Option<LearningPath>> {
        Ok(self.inner.lock().await.paths.get(&user_id).cloned())
    }

    async fn save_completion(&self, completion: &ModuleCompletion) -> Result<()> {
        self.inner.lock().await.completions.insert(
            (completion.user_id, completion.module_id.clone()),
            completion.clone(),
        );
        Ok(())
    }

    async fn completed_modules(&self, user_id: Uuid) -> Result<HashSet<String>> {
        let tables = self.inner.lock().await;
        Ok(tables
            .completions
            .keys()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, module_id)| module_id.clone())
            .collect())
    }

    async fn save_task(&self, task: &WorkTask) -> Result<()> {
        self.inner
            .lock()
            .await
            .tasks
            .insert((task.user_id, task.task_id.clone()), task.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::skills::tests::gap;

    fn assessment_with(user_id: Uuid, status: GapStatus) -> Assessment {
        let mut assessment = Assessment::new(user_id, None);
        let mut g = gap(status);
        g.user_id = user_id;
        g.assessment_id = assessment.id;
        assessment.gaps = vec![g];
        assessment
    }

    fn path(user_id: Uuid) -> LearningPath {
        LearningPath {
            user_id,
            assessment_id: None,
            ordered_module_ids: vec![],
            total_duration_minutes: 0,
            time_budget_minutes: None,
            uncovered_skill_ids: vec![],
            deferred_skill_ids: vec![],
            generated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_stale_transition_loses_to_resolution() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let assessment = assessment_with(user, GapStatus::Open);
        let id = assessment.gaps[0].id;
        store.save_assessment(&assessment).await.unwrap();

        // Both writers read the gap while it was open.
        let now = Utc::now();
        assert!(store
            .transition_gap(id, GapStatus::Open, GapStatus::Resolved, now)
            .await
            .unwrap());
        assert!(!store
            .transition_gap(id, GapStatus::Open, GapStatus::InProgress, now)
            .await
            .unwrap());

        let current = store.current_gaps(user).await.unwrap();
        assert_eq!(current[0].status, GapStatus::Resolved);
    }

    #[tokio::test]
    async fn test_archived_gap_does_not_transition() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let first = assessment_with(user, GapStatus::Open);
        let id = first.gaps[0].id;
        store.save_assessment(&first).await.unwrap();
        store
            .complete_assessment(&assessment_with(user, GapStatus::Open), &path(user))
            .await
            .unwrap();

        assert!(!store
            .transition_gap(id, GapStatus::Open, GapStatus::InProgress, Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_completion_archives_without_touching_status() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let first = assessment_with(user, GapStatus::Resolved);
        store.save_assessment(&first).await.unwrap();

        let second = assessment_with(user, GapStatus::Open);
        let archived = store
            .complete_assessment(&second, &path(user))
            .await
            .unwrap();
        assert_eq!(archived, 1);

        let old = store.get_assessment(first.id).await.unwrap().unwrap();
        assert!(old.gaps[0].archived);
        assert_eq!(old.gaps[0].status, GapStatus::Resolved);
        let current = store.current_gaps(user).await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].assessment_id, second.id);
        assert!(store.get_path(user).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_completion_writes_nothing() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let first = assessment_with(user, GapStatus::Open);
        store.save_assessment(&first).await.unwrap();
        store.fail_completion.store(true, Ordering::SeqCst);

        let second = assessment_with(user, GapStatus::Open);
        assert!(store.complete_assessment(&second, &path(user)).await.is_err());

        let current = store.current_gaps(user).await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].assessment_id, first.id);
        assert!(store.get_assessment(second.id).await.unwrap().is_none());
        assert!(store.get_path(user).await.unwrap().is_none());
    }
}
