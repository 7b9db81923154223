use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::learning::path_assembler::{assemble_path, PathRequest};
use crate::learning::progress::{correlate_task, CorrelationContext, GapTransition};
use crate::models::learning::{LearningPath, ModuleCompletion, WorkTask};
use crate::state::AppState;
use crate::store::Store;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct RegeneratePathRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub time_budget_minutes: Option<u32>,
}

#[derive(Deserialize)]
pub struct CompleteModuleRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct LogTaskRequest {
    #[serde(default)]
    pub task_id: Option<String>,
    pub user_id: Uuid,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct LogTaskResponse {
    pub task: WorkTask,
    pub transitions: Vec<GapTransition>,
}

/// GET /api/v1/learning/path
pub async fn handle_get_path(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<LearningPath>, AppError> {
    let path = state
        .store
        .get_path(params.user_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("No learning path for user {}", params.user_id))
        })?;
    Ok(Json(path))
}

/// POST /api/v1/learning/path/regenerate
///
/// Rebuilds the path from the user's active gaps, e.g. after progress or a
/// catalog reload.
pub async fn handle_regenerate_path(
    State(state): State<AppState>,
    Json(req): Json<RegeneratePathRequest>,
) -> Result<Json<LearningPath>, AppError> {
    let gaps = state.store.current_gaps(req.user_id).await?;
    if gaps.is_empty() {
        return Err(AppError::NotFound(format!(
            "No gaps on record for user {}",
            req.user_id
        )));
    }
    let kb = state.registry.snapshot().await;
    let path = assemble_path(&PathRequest {
        user_id: req.user_id,
        assessment_id: gaps.first().map(|g| g.assessment_id),
        gaps: &gaps,
        catalog: &kb.catalog,
        time_budget_minutes: req.time_budget_minutes,
        max_modules: state.config.max_path_modules,
        generated_at: Utc::now(),
    });
    state.store.save_path(&path).await?;
    info!(
        "Regenerated path for user {}: {} modules",
        req.user_id,
        path.ordered_module_ids.len()
    );
    Ok(Json(path))
}

/// POST /api/v1/learning/modules/:id/complete
pub async fn handle_complete_module(
    State(state): State<AppState>,
    Path(module_id): Path<String>,
    Json(req): Json<CompleteModuleRequest>,
) -> Result<(StatusCode, Json<ModuleCompletion>), AppError> {
    let kb = state.registry.snapshot().await;
    if kb.catalog.get(&module_id).is_none() {
        return Err(AppError::NotFound(format!("Module {module_id} not found")));
    }
    let completion = ModuleCompletion {
        user_id: req.user_id,
        module_id,
        completed_at: req.completed_at.unwrap_or_else(Utc::now),
    };
    state.store.save_completion(&completion).await?;
    Ok((StatusCode::CREATED, Json(completion)))
}

/// POST /api/v1/tasks
pub async fn handle_log_task(
    State(state): State<AppState>,
    Json(req): Json<LogTaskRequest>,
) -> Result<(StatusCode, Json<LogTaskResponse>), AppError> {
    if req.description.trim().is_empty() && req.tags.is_empty() {
        return Err(AppError::Validation(
            "task needs a description or tags".to_string(),
        ));
    }
    let task = WorkTask {
        task_id: req
            .task_id
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        user_id: req.user_id,
        description: req.description,
        tags: req.tags,
        completed_at: req.completed_at.unwrap_or_else(Utc::now),
    };
    state.store.save_task(&task).await?;

    let kb = state.registry.snapshot().await;
    let mut gaps = state.store.current_gaps(task.user_id).await?;
    let path = state.store.get_path(task.user_id).await?;
    let completed = state.store.completed_modules(task.user_id).await?;

    let transitions = correlate_task(
        &CorrelationContext {
            task: &task,
            path: path.as_ref(),
            completed_module_ids: &completed,
            catalog: &kb.catalog,
            taxonomy: &kb.taxonomy,
        },
        &mut gaps,
    );

    let transitions =
        persist_transitions(state.store.as_ref(), transitions, task.completed_at).await?;

    Ok((StatusCode::CREATED, Json(LogTaskResponse { task, transitions })))
}

/// Writes each transition as a compare-and-set on the status it was computed
/// from and returns the ones that took effect.
async fn persist_transitions(
    store: &dyn Store,
    transitions: Vec<GapTransition>,
    at: DateTime<Utc>,
) -> Result<Vec<GapTransition>, AppError> {
    let mut applied = Vec::with_capacity(transitions.len());
    for t in transitions {
        if store.transition_gap(t.gap_id, t.from, t.to, at).await? {
            applied.push(t);
        } else {
            warn!(
                "Gap {} ({}) changed concurrently, dropped {} -> {}",
                t.gap_id, t.skill_id, t.from, t.to
            );
        }
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::pipeline::tests::knowledge_base;
    use crate::models::assessment::Assessment;
    use crate::models::skills::tests::gap;
    use crate::models::skills::GapStatus;
    use crate::store::memory::MemoryStore;
    use std::collections::HashSet;

    fn task(description: &str, tags: &[&str]) -> WorkTask {
        WorkTask {
            task_id: Uuid::new_v4().to_string(),
            user_id: Uuid::nil(),
            description: description.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_overlapping_task_logs_cannot_reopen_resolved_gap() {
        let kb = knowledge_base();
        let store = MemoryStore::new();
        let mut assessment = Assessment::new(Uuid::nil(), None);
        let mut sql = gap(GapStatus::Open);
        sql.user_id = Uuid::nil();
        sql.assessment_id = assessment.id;
        assessment.gaps = vec![sql];
        store.save_assessment(&assessment).await.unwrap();

        let path = LearningPath {
            user_id: Uuid::nil(),
            assessment_id: Some(assessment.id),
            ordered_module_ids: vec!["sql-tuning".to_string()],
            total_duration_minutes: 10,
            time_budget_minutes: None,
            uncovered_skill_ids: vec![],
            deferred_skill_ids: vec![],
            generated_at: Utc::now(),
        };
        let finished: HashSet<String> = ["sql-tuning".to_string()].into_iter().collect();
        let nothing_finished = HashSet::new();

        // Both requests read the gap while it is still open.
        let mut seen_by_a = store.current_gaps(Uuid::nil()).await.unwrap();
        let mut seen_by_b = seen_by_a.clone();

        let task_a = task("Tuned slow SQL", &["sql"]);
        let a = correlate_task(
            &CorrelationContext {
                task: &task_a,
                path: Some(&path),
                completed_module_ids: &finished,
                catalog: &kb.catalog,
                taxonomy: &kb.taxonomy,
            },
            &mut seen_by_a,
        );
        let task_b = task("Reviewed SQL", &["sql"]);
        let b = correlate_task(
            &CorrelationContext {
                task: &task_b,
                path: Some(&path),
                completed_module_ids: &nothing_finished,
                catalog: &kb.catalog,
                taxonomy: &kb.taxonomy,
            },
            &mut seen_by_b,
        );
        assert_eq!(a[0].to, GapStatus::Resolved);
        assert_eq!(b[0].to, GapStatus::InProgress);

        let applied_a = persist_transitions(&store, a, task_a.completed_at).await.unwrap();
        let applied_b = persist_transitions(&store, b, task_b.completed_at).await.unwrap();
        assert_eq!(applied_a.len(), 1);
        assert!(applied_b.is_empty());

        let stored = store.current_gaps(Uuid::nil()).await.unwrap();
        assert_eq!(stored[0].status, GapStatus::Resolved);
    }
}
