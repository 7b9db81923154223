//! Assessment Pipeline: normalize, extract, score and assemble for one
//! assessment, persisting as it goes.
//!
//! Failure policy: an extraction failure on artifact k marks the assessment
//! `failed` and stores gaps scored from artifacts before k as archived
//! records. The user's current gaps and learning path are not touched. A
//! reply the extractor could not read counts as no evidence for that
//! artifact and flags the assessment `low_confidence`.
//!
//! The results of a completed run (new gaps, archived old gaps, path) are
//! written in one store call, so a failed write leaves the previous state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::archive::{artifact_key, ArtifactArchive};
use crate::assessment::extractor::{CompetencyExtractor, Extraction, ExtractionError};
use crate::assessment::gap_scorer::{
    score_gaps, validate_profile, GapScoringInput, GapScoringResult, TargetRequirement,
};
use crate::assessment::normalizer::{normalize_all, Artifact, RawArtifact};
use crate::assessment::scoring::ScoringConfig;
use crate::config::Config;
use crate::errors::AppError;
use crate::learning::path_assembler::{assemble_path, PathRequest};
use crate::models::assessment::{Assessment, AssessmentOutcome, AssessmentStatus};
use crate::models::skills::{Observation, SkillTaxonomyEntry};
use crate::registry::{KnowledgeBase, Registry};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub scoring: ScoringConfig,
    pub max_path_modules: usize,
    /// Upper bound on extracting one artifact, retries included.
    pub extraction_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scoring: config.scoring(),
            max_path_modules: config.max_path_modules,
            extraction_timeout: Duration::from_secs(config.extraction_timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssessmentRequest {
    pub user_id: Uuid,
    pub title: Option<String>,
    pub artifacts: Vec<RawArtifact>,
    pub target_profile: Vec<TargetRequirement>,
    pub time_budget_minutes: Option<u32>,
}

pub struct Pipeline<'a> {
    pub registry: &'a Registry,
    pub extractor: &'a dyn CompetencyExtractor,
    pub store: &'a dyn Store,
    pub archive: &'a dyn ArtifactArchive,
    pub settings: &'a PipelineSettings,
}

impl Pipeline<'_> {
    pub async fn run(&self, req: AssessmentRequest) -> Result<AssessmentOutcome, AppError> {
        // One snapshot for the whole run; a concurrent reload does not affect it.
        let kb = self.registry.snapshot().await;
        validate_profile(&req.target_profile, &kb.taxonomy)?;

        let batch = normalize_all(&req.artifacts);
        if batch.artifacts.is_empty() {
            let reasons: Vec<String> = batch
                .rejected
                .iter()
                .map(|r| format!("{}: {}", r.source_id, r.reason))
                .collect();
            return Err(AppError::Validation(format!(
                "no usable artifacts ({})",
                if reasons.is_empty() {
                    "none submitted".to_string()
                } else {
                    reasons.join("; ")
                }
            )));
        }

        let mut assessment = Assessment::new(req.user_id, req.title.clone());
        assessment.artifact_ids = batch.artifacts.iter().map(|a| a.id.clone()).collect();

        for (artifact, &index) in batch.artifacts.iter().zip(&batch.accepted_from) {
            let raw = &req.artifacts[index];
            let key = artifact_key(req.user_id, assessment.id, &artifact.id);
            self.archive
                .put(&key, raw.body(), raw.content_type())
                .await
                .map_err(|e| AppError::S3(e.to_string()))?;
        }

        self.store.save_assessment(&assessment).await?;
        info!(
            "Assessment {} created for user {} with {} artifacts ({} rejected)",
            assessment.id,
            req.user_id,
            batch.artifacts.len(),
            batch.rejected.len()
        );

        assessment.status = AssessmentStatus::Analyzing;
        self.store.save_assessment(&assessment).await?;

        let skills = kb
            .taxonomy
            .subset(req.target_profile.iter().map(|r| r.skill_id.as_str()));
        let as_of = Utc::now();
        let mut observations: Vec<Observation> = Vec::new();
        let mut degraded: Vec<&str> = Vec::new();

        for (k, artifact) in batch.artifacts.iter().enumerate() {
            match self.extract_one(artifact, &skills).await {
                Ok(found) => {
                    info!(
                        "Extracted {} observations from {} via {}",
                        found.observations.len(),
                        artifact.id,
                        self.extractor.backend()
                    );
                    if found.degraded {
                        degraded.push(&artifact.id);
                    }
                    observations.extend(found.observations);
                }
                Err(e) => {
                    error!(
                        "Extraction failed for assessment {} on artifact {}: {e}",
                        assessment.id, artifact.id
                    );
                    let partial = if k > 0 {
                        Some(self.score(&kb, &assessment, &req, &observations, as_of)?)
                    } else {
                        None
                    };
                    assessment.status = AssessmentStatus::Failed;
                    assessment.error_message = Some(format!(
                        "extraction failed on artifact {} ({}): {e}",
                        artifact.id, artifact.source_id
                    ));
                    if let Some(result) = partial {
                        assessment.gaps = result
                            .gaps
                            .into_iter()
                            .map(|mut g| {
                                g.archived = true;
                                g
                            })
                            .collect();
                        assessment.evidence_warnings = result.evidence_warnings;
                    }
                    assessment.low_confidence = observations.is_empty() || !degraded.is_empty();
                    assessment.completed_at = Some(Utc::now());
                    self.store.save_assessment(&assessment).await?;
                    return Ok(AssessmentOutcome {
                        assessment,
                        learning_path: None,
                        rejected_artifacts: batch.rejected,
                    });
                }
            }
        }

        let result = self.score(&kb, &assessment, &req, &observations, as_of)?;
        if observations.is_empty() {
            warn!(
                "Assessment {}: no usable observations in any artifact",
                assessment.id
            );
        }
        if !degraded.is_empty() {
            warn!(
                "Assessment {}: unreadable extraction replies for {}",
                assessment.id,
                degraded.join(", ")
            );
        }

        assessment.gaps = result.gaps;
        assessment.evidence_warnings = result.evidence_warnings;
        assessment.low_confidence = observations.is_empty() || !degraded.is_empty();
        assessment.status = AssessmentStatus::Completed;
        assessment.completed_at = Some(Utc::now());

        let path = assemble_path(&PathRequest {
            user_id: req.user_id,
            assessment_id: Some(assessment.id),
            gaps: &assessment.gaps,
            catalog: &kb.catalog,
            time_budget_minutes: req.time_budget_minutes,
            max_modules: self.settings.max_path_modules,
            generated_at: Utc::now(),
        });

        let archived = match self.store.complete_assessment(&assessment, &path).await {
            Ok(n) => n,
            Err(e) => {
                error!("Failed to store results of assessment {}: {e:#}", assessment.id);
                let failed = Assessment {
                    status: AssessmentStatus::Failed,
                    error_message: Some("results could not be stored".to_string()),
                    gaps: Vec::new(),
                    ..assessment.clone()
                };
                if let Err(mark) = self.store.save_assessment(&failed).await {
                    warn!("Could not mark assessment {} failed: {mark:#}", assessment.id);
                }
                return Err(e.into());
            }
        };

        info!(
            "Assessment {} completed: {} gaps ({archived} earlier gaps archived), \
             path of {} modules ({} min)",
            assessment.id,
            assessment.gaps.len(),
            path.ordered_module_ids.len(),
            path.total_duration_minutes
        );

        Ok(AssessmentOutcome {
            assessment,
            learning_path: Some(path),
            rejected_artifacts: batch.rejected,
        })
    }

    async fn extract_one(
        &self,
        artifact: &Artifact,
        skills: &[&SkillTaxonomyEntry],
    ) -> Result<Extraction, ExtractionError> {
        let timeout = self.settings.extraction_timeout;
        match tokio::time::timeout(timeout, self.extractor.extract(artifact, skills)).await {
            Ok(result) => result,
            Err(_) => Err(ExtractionError::Timeout(timeout.as_secs())),
        }
    }

    fn score(
        &self,
        kb: &KnowledgeBase,
        assessment: &Assessment,
        req: &AssessmentRequest,
        observations: &[Observation],
        as_of: DateTime<Utc>,
    ) -> Result<GapScoringResult, AppError> {
        let result = score_gaps(&GapScoringInput {
            assessment_id: assessment.id,
            user_id: req.user_id,
            observations,
            profile: &req.target_profile,
            taxonomy: &kb.taxonomy,
            config: &self.settings.scoring,
            as_of,
        })?;
        Ok(result)
    }
}
