use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::models::assessment::{Assessment, AssessmentRow, LearningPathRow, SkillGapRow};
use crate::models::learning::{LearningPath, ModuleCompletion, WorkTask};
use crate::models::skills::{GapStatus, SkillGap};
use crate::store::Store;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn gaps_for_assessment(&self, assessment_id: Uuid) -> Result<Vec<SkillGap>> {
        let rows = sqlx::query_as::<_, SkillGapRow>(
            r#"
            SELECT * FROM skill_gaps
            WHERE assessment_id = $1
            ORDER BY priority_score DESC, skill_id ASC
            "#,
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SkillGap::try_from).collect()
    }
}

async fn upsert_gap(tx: &mut Transaction<'_, Postgres>, gap: &SkillGap) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO skill_gaps
            (id, assessment_id, user_id, skill_id, category, current_level, target_level,
             priority, priority_score, urgency, urgency_score, estimated_effort_hours,
             gap_size, status, evidence_sources, low_confidence, archived, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
        ON CONFLICT (id) DO UPDATE SET
            current_level = EXCLUDED.current_level,
            target_level = EXCLUDED.target_level,
            priority = EXCLUDED.priority,
            priority_score = EXCLUDED.priority_score,
            urgency = EXCLUDED.urgency,
            urgency_score = EXCLUDED.urgency_score,
            estimated_effort_hours = EXCLUDED.estimated_effort_hours,
            gap_size = EXCLUDED.gap_size,
            evidence_sources = EXCLUDED.evidence_sources,
            low_confidence = EXCLUDED.low_confidence,
            archived = EXCLUDED.archived,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(gap.id)
    .bind(gap.assessment_id)
    .bind(gap.user_id)
    .bind(&gap.skill_id)
    .bind(gap.category.as_str())
    .bind(&gap.current_level)
    .bind(&gap.target_level)
    .bind(gap.priority.as_str())
    .bind(gap.priority_score)
    .bind(gap.urgency.as_str())
    .bind(gap.urgency_score)
    .bind(gap.estimated_effort_hours)
    .bind(gap.gap_size.as_str())
    .bind(gap.status.as_str())
    .bind(&gap.evidence_sources)
    .bind(gap.low_confidence)
    .bind(gap.archived)
    .bind(gap.created_at)
    .bind(gap.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_assessment(
    tx: &mut Transaction<'_, Postgres>,
    assessment: &Assessment,
) -> Result<()> {
    let warnings = serde_json::to_value(&assessment.evidence_warnings)?;
    sqlx::query(
        r#"
        INSERT INTO assessments
            (id, user_id, title, status, low_confidence, error_message,
             artifact_ids, evidence_warnings, created_at, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE SET
            title = EXCLUDED.title,
            status = EXCLUDED.status,
            low_confidence = EXCLUDED.low_confidence,
            error_message = EXCLUDED.error_message,
            artifact_ids = EXCLUDED.artifact_ids,
            evidence_warnings = EXCLUDED.evidence_warnings,
            completed_at = EXCLUDED.completed_at
        "#,
    )
    .bind(assessment.id)
    .bind(assessment.user_id)
    .bind(&assessment.title)
    .bind(assessment.status.as_str())
    .bind(assessment.low_confidence)
    .bind(&assessment.error_message)
    .bind(&assessment.artifact_ids)
    .bind(warnings)
    .bind(assessment.created_at)
    .bind(assessment.completed_at)
    .execute(&mut **tx)
    .await?;

    for gap in &assessment.gaps {
        upsert_gap(tx, gap).await?;
    }
    Ok(())
}

async fn upsert_path(tx: &mut Transaction<'_, Postgres>, path: &LearningPath) -> Result<()> {
    let total =
        i32::try_from(path.total_duration_minutes).context("path duration out of range")?;
    let budget = path
        .time_budget_minutes
        .map(i32::try_from)
        .transpose()
        .context("time budget out of range")?;

    sqlx::query(
        r#"
        INSERT INTO learning_paths
            (user_id, assessment_id, ordered_module_ids, total_duration_minutes,
             time_budget_minutes, uncovered_skill_ids, deferred_skill_ids, generated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (user_id) DO UPDATE SET
            assessment_id = EXCLUDED.assessment_id,
            ordered_module_ids = EXCLUDED.ordered_module_ids,
            total_duration_minutes = EXCLUDED.total_duration_minutes,
            time_budget_minutes = EXCLUDED.time_budget_minutes,
            uncovered_skill_ids = EXCLUDED.uncovered_skill_ids,
            deferred_skill_ids = EXCLUDED.deferred_skill_ids,
            generated_at = EXCLUDED.generated_at
        "#,
    )
    .bind(path.user_id)
    .bind(path.assessment_id)
    .bind(&path.ordered_module_ids)
    .bind(total)
    .bind(budget)
    .bind(&path.uncovered_skill_ids)
    .bind(&path.deferred_skill_ids)
    .bind(path.generated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn save_assessment(&self, assessment: &Assessment) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_assessment(&mut tx, assessment).await?;
        tx.commit().await?;
        debug!(
            "Saved assessment {} ({}) with {} gaps",
            assessment.id,
            assessment.status.as_str(),
            assessment.gaps.len()
        );
        Ok(())
    }

    async fn get_assessment(&self, id: Uuid) -> Result<Option<Assessment>> {
        let row: Option<AssessmentRow> =
            sqlx::query_as("SELECT * FROM assessments WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some(row) => {
                let gaps = self.gaps_for_assessment(row.id).await?;
                Ok(Some(row.into_assessment(gaps)?))
            }
            None => Ok(None),
        }
    }

    async fn list_assessments(&self, user_id: Uuid) -> Result<Vec<Assessment>> {
        let rows: Vec<AssessmentRow> = sqlx::query_as(
            "SELECT * FROM assessments WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let gaps = self.gaps_for_assessment(row.id).await?;
            out.push(row.into_assessment(gaps)?);
        }
        Ok(out)
    }

    async fn complete_assessment(
        &self,
        assessment: &Assessment,
        path: &LearningPath,
    ) -> Result<usize> {
        let at = assessment.completed_at.unwrap_or_else(Utc::now);
        let mut tx = self.pool.begin().await?;

        // Serializes completions of the same user.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::uuid::text, 0))")
            .bind(assessment.user_id)
            .execute(&mut *tx)
            .await?;

        let archived = sqlx::query(
            r#"
            UPDATE skill_gaps SET archived = TRUE, updated_at = $3
            WHERE user_id = $1 AND assessment_id <> $2 AND NOT archived
            "#,
        )
        .bind(assessment.user_id)
        .bind(assessment.id)
        .bind(at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        upsert_assessment(&mut tx, assessment).await?;
        upsert_path(&mut tx, path).await?;
        tx.commit().await?;

        debug!(
            "Completed assessment {}: {} gaps stored, {archived} archived",
            assessment.id,
            assessment.gaps.len()
        );
        Ok(archived as usize)
    }

    async fn transition_gap(
        &self,
        gap_id: Uuid,
        from: GapStatus,
        to: GapStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let moved = sqlx::query(
            r#"
            UPDATE skill_gaps SET status = $3, updated_at = $4
            WHERE id = $1 AND status = $2 AND NOT archived
            "#,
        )
        .bind(gap_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(moved == 1)
    }

    async fn current_gaps(&self, user_id: Uuid) -> Result<Vec<SkillGap>> {
        let rows = sqlx::query_as::<_, SkillGapRow>(
            r#"
            SELECT * FROM skill_gaps
            WHERE user_id = $1 AND NOT archived
            ORDER BY priority_score DESC, skill_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SkillGap::try_from).collect()
    }

    async fn save_path(&self, path: &LearningPath) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_path(&mut tx, path).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_path(&self, user_id: Uuid) -> Result<Option<LearningPath>> {
        let row: Option<LearningPathRow> =
            sqlx::query_as("SELECT * FROM learning_paths WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(LearningPath::from))
    }

    async fn save_completion(&self, completion: &ModuleCompletion) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO module_completions (user_id, module_id, completed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, module_id) DO UPDATE SET completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(completion.user_id)
        .bind(&completion.module_id)
        .bind(completion.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn completed_modules(&self, user_id: Uuid) -> Result<HashSet<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT module_id FROM module_completions WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().collect())
    }

    async fn save_task(&self, task: &WorkTask) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO work_tasks (user_id, task_id, description, tags, completed_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, task_id) DO UPDATE SET
                description = EXCLUDED.description,
                tags = EXCLUDED.tags,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(task.user_id)
        .bind(&task.task_id)
        .bind(&task.description)
        .bind(&task.tags)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
