use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::assessment::gap_scorer::TargetRequirement;
use crate::assessment::normalizer::RawArtifact;
use crate::assessment::pipeline::{AssessmentRequest, Pipeline, PipelineSettings};
use crate::assessment::report::{build_report, SkillsReport};
use crate::errors::AppError;
use crate::idempotency::{lock_key, IDEMPOTENCY_HEADER};
use crate::models::assessment::{Assessment, AssessmentOutcome};
use crate::models::skills::SkillGap;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct TextArtifactInput {
    #[serde(default)]
    pub source_id: Option<String>,
    pub text: String,
}

#[derive(Deserialize)]
pub struct CreateAssessmentRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    pub artifacts: Vec<TextArtifactInput>,
    pub target_profile: Vec<TargetRequirement>,
    #[serde(default)]
    pub time_budget_minutes: Option<u32>,
}

/// POST /api/v1/assessments
pub async fn handle_create_assessment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateAssessmentRequest>,
) -> Result<(StatusCode, Json<AssessmentOutcome>), AppError> {
    let artifacts = req
        .artifacts
        .into_iter()
        .enumerate()
        .map(|(i, a)| RawArtifact::Text {
            source_id: a.source_id.unwrap_or_else(|| format!("artifact-{}", i + 1)),
            text: a.text,
        })
        .collect();

    let outcome = run_locked(
        &state,
        idempotency_key(&headers),
        AssessmentRequest {
            user_id: req.user_id,
            title: req.title,
            artifacts,
            target_profile: req.target_profile,
            time_budget_minutes: req.time_budget_minutes,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /api/v1/assessments/upload
///
/// Multipart fields: `user_id`, `target_profile` (JSON array), optional
/// `title`, `time_budget_minutes` and `text`; every field carrying a
/// filename is an uploaded artifact.
pub async fn handle_upload_assessment(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<AssessmentOutcome>), AppError> {
    let mut user_id: Option<Uuid> = None;
    let mut title: Option<String> = None;
    let mut target_profile: Option<Vec<TargetRequirement>> = None;
    let mut time_budget_minutes: Option<u32> = None;
    let mut artifacts: Vec<RawArtifact> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(filename) = field.file_name().map(str::to_string) {
            let bytes: Bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("failed to read '{filename}': {e}")))?;
            artifacts.push(RawArtifact::File { filename, bytes });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::Validation(format!("failed to read field '{name}': {e}")))?;
        match name.as_str() {
            "user_id" => {
                user_id = Some(value.trim().parse::<Uuid>().map_err(|_| {
                    AppError::Validation(format!("user_id '{value}' is not a UUID"))
                })?)
            }
            "title" => title = Some(value),
            "target_profile" => {
                target_profile = Some(serde_json::from_str(&value).map_err(|e| {
                    AppError::Validation(format!("target_profile is not valid JSON: {e}"))
                })?)
            }
            "time_budget_minutes" => {
                time_budget_minutes = Some(value.trim().parse::<u32>().map_err(|_| {
                    AppError::Validation(format!("time_budget_minutes '{value}' is not a number"))
                })?)
            }
            "text" => artifacts.push(RawArtifact::Text {
                source_id: format!("text-{}", artifacts.len() + 1),
                text: value,
            }),
            other => warn!("Ignoring unknown multipart field '{other}'"),
        }
    }

    let user_id = user_id.ok_or_else(|| AppError::Validation("user_id is required".into()))?;
    let target_profile =
        target_profile.ok_or_else(|| AppError::Validation("target_profile is required".into()))?;

    let outcome = run_locked(
        &state,
        idempotency_key(&headers),
        AssessmentRequest {
            user_id,
            title,
            artifacts,
            target_profile,
            time_budget_minutes,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/v1/assessments
pub async fn handle_list_assessments(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<Assessment>>, AppError> {
    Ok(Json(state.store.list_assessments(params.user_id).await?))
}

/// GET /api/v1/assessments/:id
pub async fn handle_get_assessment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Assessment>, AppError> {
    let assessment = state
        .store
        .get_assessment(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Assessment {id} not found")))?;
    Ok(Json(assessment))
}

/// GET /api/v1/assessments/:id/report
pub async fn handle_assessment_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SkillsReport>, AppError> {
    let assessment = state
        .store
        .get_assessment(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Assessment {id} not found")))?;
    let path = state.store.get_path(assessment.user_id).await?;
    let kb = state.registry.snapshot().await;
    Ok(Json(build_report(&assessment, path.as_ref(), &kb.taxonomy)))
}

/// GET /api/v1/gaps
pub async fn handle_current_gaps(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<SkillGap>>, AppError> {
    Ok(Json(state.store.current_gaps(params.user_id).await?))
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Runs the pipeline while holding the (user, idempotency key) lock.
async fn run_locked(
    state: &AppState,
    idempotency_key: Option<String>,
    req: AssessmentRequest,
) -> Result<AssessmentOutcome, AppError> {
    let key = lock_key(req.user_id, idempotency_key.as_deref());
    let token = Uuid::new_v4().to_string();
    if !state
        .locks
        .try_acquire(&key, &token, state.config.idempotency_ttl_secs)
        .await?
    {
        return Err(AppError::Conflict(format!(
            "An assessment for user {} is already running",
            req.user_id
        )));
    }

    let settings = PipelineSettings::from_config(&state.config);
    let pipeline = Pipeline {
        registry: &state.registry,
        extractor: state.extractor.as_ref(),
        store: state.store.as_ref(),
        archive: state.archive.as_ref(),
        settings: &settings,
    };
    let result = pipeline.run(req).await;

    // The TTL frees the key eventually if this fails.
    match state.locks.release(&key, &token).await {
        Ok(true) => {}
        Ok(false) => warn!("Lock {key} expired before the run finished"),
        Err(e) => warn!("Failed to release lock {key}: {e}"),
    }
    result
}
