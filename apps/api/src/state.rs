use std::sync::Arc;

use crate::archive::ArtifactArchive;
use crate::assessment::extractor::CompetencyExtractor;
use crate::config::Config;
use crate::idempotency::RunLocks;
use crate::registry::Registry;
use crate::store::Store;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub registry: Arc<Registry>,
    /// Pluggable extractor. Default: LLM. Swap via EXTRACTOR_BACKEND.
    pub extractor: Arc<dyn CompetencyExtractor>,
    pub store: Arc<dyn Store>,
    /// Raw artifact archive (S3).
    pub archive: Arc<dyn ArtifactArchive>,
    /// Idempotency locks for pipeline runs (Redis).
    pub locks: Arc<dyn RunLocks>,
}
