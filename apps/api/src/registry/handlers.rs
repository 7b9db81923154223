use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::learning::LearningModule;
use crate::models::skills::SkillTaxonomyEntry;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub skills: usize,
    pub modules: usize,
}

/// GET /api/v1/taxonomy
pub async fn handle_list_taxonomy(State(state): State<AppState>) -> Json<Vec<SkillTaxonomyEntry>> {
    let kb = state.registry.snapshot().await;
    Json(kb.taxonomy.entries().cloned().collect())
}

/// GET /api/v1/taxonomy/search?q=
pub async fn handle_search_taxonomy(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<SkillTaxonomyEntry>>, AppError> {
    if params.q.trim().is_empty() {
        return Err(AppError::Validation("query 'q' must not be empty".to_string()));
    }
    let kb = state.registry.snapshot().await;
    Ok(Json(kb.taxonomy.search(&params.q).into_iter().cloned().collect()))
}

/// POST /api/v1/taxonomy/reload
///
/// Re-reads taxonomy and catalog. On failure the running snapshot stays.
pub async fn handle_reload_registry(
    State(state): State<AppState>,
) -> Result<Json<ReloadResponse>, AppError> {
    let kb = state.registry.reload().await?;
    Ok(Json(ReloadResponse {
        skills: kb.taxonomy.len(),
        modules: kb.catalog.len(),
    }))
}

/// GET /api/v1/catalog
pub async fn handle_list_catalog(State(state): State<AppState>) -> Json<Vec<LearningModule>> {
    let kb = state.registry.snapshot().await;
    Json(kb.catalog.modules().cloned().collect())
}
