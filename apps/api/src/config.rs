use std::str::FromStr;

use anyhow::{bail, Context, Result};

use crate::assessment::scoring::ScoringConfig;
use crate::learning::path_assembler::DEFAULT_MAX_MODULES;

/// Which `CompetencyExtractor` backs the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorBackend {
    Llm,
    Keyword,
}

impl FromStr for ExtractorBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "llm" => Ok(ExtractorBackend::Llm),
            "keyword" => Ok(ExtractorBackend::Keyword),
            other => bail!("unknown extractor backend '{other}' (expected 'llm' or 'keyword')"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub taxonomy_path: String,
    pub catalog_path: String,
    pub extractor_backend: ExtractorBackend,
    pub confidence_threshold: f64,
    pub fallback_level: Option<String>,
    pub evidence_half_life_months: f64,
    pub max_path_modules: usize,
    pub idempotency_ttl_secs: u64,
    pub extraction_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let confidence_threshold: f64 = env_or("CONFIDENCE_THRESHOLD", 0.6)?;
        if !(0.0..=1.0).contains(&confidence_threshold) {
            bail!("CONFIDENCE_THRESHOLD must be between 0 and 1, got {confidence_threshold}");
        }

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            taxonomy_path: std::env::var("TAXONOMY_PATH")
                .unwrap_or_else(|_| "data/skills_taxonomy.json".to_string()),
            catalog_path: std::env::var("CATALOG_PATH")
                .unwrap_or_else(|_| "data/learning_catalog.json".to_string()),
            extractor_backend: env_or("EXTRACTOR_BACKEND", ExtractorBackend::Llm)?,
            confidence_threshold,
            fallback_level: std::env::var("FALLBACK_LEVEL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            evidence_half_life_months: env_or("EVIDENCE_HALF_LIFE_MONTHS", 18.0)?,
            max_path_modules: env_or("MAX_PATH_MODULES", DEFAULT_MAX_MODULES)?,
            idempotency_ttl_secs: env_or("IDEMPOTENCY_TTL_SECS", 600)?,
            extraction_timeout_secs: env_or("EXTRACTION_TIMEOUT_SECS", 180)?,
        })
    }

    /// Scoring tunables with the configured overrides applied.
    pub fn scoring(&self) -> ScoringConfig {
        ScoringConfig {
            confidence_threshold: self.confidence_threshold,
            fallback_level: self.fallback_level.clone(),
            evidence_half_life_months: self.evidence_half_life_months,
            ..ScoringConfig::default()
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} is invalid: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Offline configuration for router and pipeline tests.
    pub fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/skillpath_test".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            s3_bucket: "skillpath-test".to_string(),
            s3_endpoint: "http://127.0.0.1:9000".to_string(),
            aws_access_key_id: "test".to_string(),
            aws_secret_access_key: "test".to_string(),
            anthropic_api_key: "test".to_string(),
            port: 0,
            rust_log: "debug".to_string(),
            taxonomy_path: "data/skills_taxonomy.json".to_string(),
            catalog_path: "data/learning_catalog.json".to_string(),
            extractor_backend: ExtractorBackend::Keyword,
            confidence_threshold: 0.6,
            fallback_level: None,
            evidence_half_life_months: 18.0,
            max_path_modules: DEFAULT_MAX_MODULES,
            idempotency_ttl_secs: 600,
            extraction_timeout_secs: 5,
        }
    }
}
