pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::assessment::handlers as assessment;
use crate::assessment::normalizer::MAX_ARTIFACT_BYTES;
use crate::learning::handlers as learning;
use crate::registry::handlers as registry;
use crate::state::AppState;

/// Request body cap on assessment creation: five full-size artifacts plus
/// form fields. Oversized single files are still rejected per artifact.
pub const ASSESSMENT_BODY_LIMIT: usize = 5 * MAX_ARTIFACT_BYTES + 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Registry
        .route("/api/v1/taxonomy", get(registry::handle_list_taxonomy))
        .route(
            "/api/v1/taxonomy/search",
            get(registry::handle_search_taxonomy),
        )
        .route(
            "/api/v1/taxonomy/reload",
            post(registry::handle_reload_registry),
        )
        .route("/api/v1/catalog", get(registry::handle_list_catalog))
        // Assessments
        .route(
            "/api/v1/assessments",
            post(assessment::handle_create_assessment)
                .layer(DefaultBodyLimit::max(ASSESSMENT_BODY_LIMIT))
                .get(assessment::handle_list_assessments),
        )
        .route(
            "/api/v1/assessments/upload",
            post(assessment::handle_upload_assessment)
                .layer(DefaultBodyLimit::max(ASSESSMENT_BODY_LIMIT)),
        )
        .route(
            "/api/v1/assessments/:id",
            get(assessment::handle_get_assessment),
        )
        .route(
            "/api/v1/assessments/:id/report",
            get(assessment::handle_assessment_report),
        )
        .route("/api/v1/gaps", get(assessment::handle_current_gaps))
        // Learning
        .route("/api/v1/learning/path", get(learning::handle_get_path))
        .route(
            "/api/v1/learning/path/regenerate",
            post(learning::handle_regenerate_path),
        )
        .route(
            "/api/v1/learning/modules/:id/complete",
            post(learning::handle_complete_module),
        )
        .route("/api/v1/tasks", post(learning::handle_log_task))
        .with_state(state)
}
