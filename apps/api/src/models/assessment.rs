use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::learning::LearningPath;
use crate::models::skills::{GapSize, GapStatus, ParseEnumError, Severity, SkillCategory, SkillGap};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Pending,
    Analyzing,
    Completed,
    Failed,
}

impl AssessmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentStatus::Pending => "pending",
            AssessmentStatus::Analyzing => "analyzing",
            AssessmentStatus::Completed => "completed",
            AssessmentStatus::Failed => "failed",
        }
    }
}

impl FromStr for AssessmentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AssessmentStatus::Pending),
            "analyzing" => Ok(AssessmentStatus::Analyzing),
            "completed" => Ok(AssessmentStatus::Completed),
            "failed" => Ok(AssessmentStatus::Failed),
            other => Err(ParseEnumError {
                kind: "assessment status",
                value: other.to_string(),
            }),
        }
    }
}

/// Recorded when a required skill had no observations at all and no
/// fallback level was configured. Non-fatal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsufficientEvidence {
    pub skill_id: String,
    pub target_level: String,
}

/// One run of the assessment pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assessment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub status: AssessmentStatus,
    pub low_confidence: bool,
    pub error_message: Option<String>,
    pub artifact_ids: Vec<String>,
    pub evidence_warnings: Vec<InsufficientEvidence>,
    pub gaps: Vec<SkillGap>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Assessment {
    pub fn new(user_id: Uuid, title: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title,
            status: AssessmentStatus::Pending,
            low_confidence: false,
            error_message: None,
            artifact_ids: Vec::new(),
            evidence_warnings: Vec::new(),
            gaps: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Response shape of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentOutcome {
    pub assessment: Assessment,
    pub learning_path: Option<LearningPath>,
    pub rejected_artifacts: Vec<RejectedArtifact>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectedArtifact {
    pub source_id: String,
    pub reason: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Database rows
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, FromRow)]
pub struct AssessmentRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub status: String,
    pub low_confidence: bool,
    pub error_message: Option<String>,
    pub artifact_ids: Vec<String>,
    pub evidence_warnings: Value,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AssessmentRow {
    pub fn into_assessment(self, gaps: Vec<SkillGap>) -> anyhow::Result<Assessment> {
        Ok(Assessment {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            status: self.status.parse()?,
            low_confidence: self.low_confidence,
            error_message: self.error_message,
            artifact_ids: self.artifact_ids,
            evidence_warnings: serde_json::from_value(self.evidence_warnings)?,
            gaps,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SkillGapRow {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub user_id: Uuid,
    pub skill_id: String,
    pub category: String,
    pub current_level: Option<String>,
    pub target_level: String,
    pub priority: String,
    pub priority_score: f64,
    pub urgency: String,
    pub urgency_score: f64,
    pub estimated_effort_hours: f64,
    pub gap_size: String,
    pub status: String,
    pub evidence_sources: Vec<String>,
    pub low_confidence: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SkillGapRow> for SkillGap {
    type Error = anyhow::Error;

    fn try_from(row: SkillGapRow) -> Result<Self, Self::Error> {
        let category = match row.category.as_str() {
            "technical" => SkillCategory::Technical,
            "soft" => SkillCategory::Soft,
            other => anyhow::bail!("unknown skill category '{other}' on gap {}", row.id),
        };
        Ok(SkillGap {
            id: row.id,
            assessment_id: row.assessment_id,
            user_id: row.user_id,
            skill_id: row.skill_id,
            category,
            current_level: row.current_level,
            target_level: row.target_level,
            priority: row.priority.parse::<Severity>()?,
            priority_score: row.priority_score,
            urgency: row.urgency.parse::<Severity>()?,
            urgency_score: row.urgency_score,
            estimated_effort_hours: row.estimated_effort_hours,
            gap_size: row.gap_size.parse::<GapSize>()?,
            status: row.status.parse::<GapStatus>()?,
            evidence_sources: row.evidence_sources,
            low_confidence: row.low_confidence,
            archived: row.archived,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct LearningPathRow {
    pub user_id: Uuid,
    pub assessment_id: Option<Uuid>,
    pub ordered_module_ids: Vec<String>,
    pub total_duration_minutes: i32,
    pub time_budget_minutes: Option<i32>,
    pub uncovered_skill_ids: Vec<String>,
    pub deferred_skill_ids: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl From<LearningPathRow> for LearningPath {
    fn from(row: LearningPathRow) -> Self {
        LearningPath {
            user_id: row.user_id,
            assessment_id: row.assessment_id,
            ordered_module_ids: row.ordered_module_ids,
            total_duration_minutes: row.total_duration_minutes.max(0) as u32,
            time_budget_minutes: row.time_budget_minutes.map(|m| m.max(0) as u32),
            uncovered_skill_ids: row.uncovered_skill_ids,
            deferred_skill_ids: row.deferred_skill_ids,
            generated_at: row.generated_at,
        }
    }
}
