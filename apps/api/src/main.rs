mod archive;
mod assessment;
mod config;
mod db;
mod errors;
mod idempotency;
mod learning;
mod llm_client;
mod models;
mod registry;
mod routes;
mod state;
mod store;

use anyhow::{Context, Result};
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::archive::S3Archive;
use crate::assessment::extractor::{
    CompetencyExtractor, KeywordCompetencyExtractor, LlmCompetencyExtractor,
};
use crate::config::{Config, ExtractorBackend};
use crate::db::create_pool;
use crate::idempotency::RedisRunLocks;
use crate::llm_client::LlmClient;
use crate::registry::Registry;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SkillPath API v{}", env!("CARGO_PKG_VERSION"));

    // Taxonomy + catalog. A cyclic or dangling taxonomy refuses to start.
    let registry = Registry::load(&config.taxonomy_path, &config.catalog_path)
        .await
        .context("failed to load skills registry")?;

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    let extractor: Arc<dyn CompetencyExtractor> = match config.extractor_backend {
        ExtractorBackend::Llm => {
            let llm = LlmClient::new(config.anthropic_api_key.clone());
            info!("LLM extractor initialized (model: {})", llm_client::MODEL);
            Arc::new(LlmCompetencyExtractor(llm))
        }
        ExtractorBackend::Keyword => {
            info!("Keyword extractor initialized");
            Arc::new(KeywordCompetencyExtractor)
        }
    };

    let state = AppState {
        config: config.clone(),
        registry: Arc::new(registry),
        extractor,
        store: Arc::new(PgStore::new(db)),
        archive: Arc::new(S3Archive::new(s3, config.s3_bucket.clone())),
        locks: Arc::new(RedisRunLocks::new(redis)),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "skillpath-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
