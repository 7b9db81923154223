use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    Technical,
    Soft,
}

impl SkillCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillCategory::Technical => "technical",
            SkillCategory::Soft => "soft",
        }
    }
}

/// A node of the skills taxonomy. Levels are ordered from lowest to highest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillTaxonomyEntry {
    pub id: String,
    pub name: String,
    pub category: SkillCategory,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub proficiency_levels: Vec<String>,
    #[serde(default)]
    pub prerequisite_ids: Vec<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SkillTaxonomyEntry {
    /// Position of `level` in this skill's ordered levels (case-insensitive).
    pub fn level_index(&self, level: &str) -> Option<usize> {
        self.proficiency_levels
            .iter()
            .position(|l| l.eq_ignore_ascii_case(level.trim()))
    }

    /// All terms a piece of work can mention to refer to this skill.
    pub fn match_terms(&self) -> Vec<&str> {
        let mut terms = vec![self.id.as_str(), self.name.as_str()];
        terms.extend(self.synonyms.iter().map(String::as_str));
        terms
    }

    /// `match_terms` normalized and deduplicated, in first-seen order.
    pub fn normalized_terms(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for term in self.match_terms() {
            let norm = normalize_term(term);
            if !norm.is_empty() && !out.contains(&norm) {
                out.push(norm);
            }
        }
        out
    }
}

/// Lowercases and turns every run of non-alphanumerics into one space,
/// so `Query-Optimization` and `query optimization` compare equal.
pub fn normalize_term(raw: &str) -> String {
    raw.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whole-word phrase containment over already-normalized text.
pub fn contains_phrase(normalized_text: &str, normalized_phrase: &str) -> bool {
    if normalized_phrase.is_empty() {
        return false;
    }
    format!(" {normalized_text} ").contains(&format!(" {normalized_phrase} "))
}

/// One piece of evidence that a user holds a skill at some level.
/// Produced by a competency extractor and folded into an assessment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub skill_id: String,
    pub level: String,
    pub evidence_text: String,
    pub confidence: f64,
    pub source_artifact_id: String,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
}

/// Shared four-step band used for both urgency and priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Maps a normalized 0–1 score onto a band.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.75 {
            Severity::Critical
        } else if score >= 0.5 {
            Severity::High
        } else if score >= 0.25 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(ParseEnumError::new("severity", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GapSize {
    Small,
    Medium,
    Large,
}

impl GapSize {
    pub fn from_levels(levels_to_climb: usize) -> Self {
        match levels_to_climb {
            0 | 1 => GapSize::Small,
            2 => GapSize::Medium,
            _ => GapSize::Large,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GapSize::Small => "small",
            GapSize::Medium => "medium",
            GapSize::Large => "large",
        }
    }
}

impl FromStr for GapSize {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(GapSize::Small),
            "medium" => Ok(GapSize::Medium),
            "large" => Ok(GapSize::Large),
            other => Err(ParseEnumError::new("gap size", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GapStatus {
    Open,
    InProgress,
    Resolved,
}

impl GapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapStatus::Open => "open",
            GapStatus::InProgress => "in_progress",
            GapStatus::Resolved => "resolved",
        }
    }

    /// The only forward moves a gap may make. Reopening happens through a
    /// new assessment, never through a transition.
    pub fn can_transition_to(self, next: GapStatus) -> bool {
        matches!(
            (self, next),
            (GapStatus::Open, GapStatus::InProgress)
                | (GapStatus::Open, GapStatus::Resolved)
                | (GapStatus::InProgress, GapStatus::Resolved)
        )
    }
}

impl fmt::Display for GapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GapStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(GapStatus::Open),
            "in_progress" => Ok(GapStatus::InProgress),
            "resolved" => Ok(GapStatus::Resolved),
            other => Err(ParseEnumError::new("gap status", other)),
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("gap {gap_id}: transition {from} -> {to} is not allowed")]
    NotAllowed {
        gap_id: Uuid,
        from: GapStatus,
        to: GapStatus,
    },

    #[error("gap {0} is archived")]
    Archived(Uuid),
}

/// A detected shortfall between observed and required level for one skill.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillGap {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub user_id: Uuid,
    pub skill_id: String,
    pub category: SkillCategory,
    /// `None` means the skill was not observed with enough confidence.
    pub current_level: Option<String>,
    pub target_level: String,
    pub priority: Severity,
    pub priority_score: f64,
    pub urgency: Severity,
    pub urgency_score: f64,
    pub estimated_effort_hours: f64,
    pub gap_size: GapSize,
    pub status: GapStatus,
    pub evidence_sources: Vec<String>,
    pub low_confidence: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SkillGap {
    /// Applies a status change if the state machine allows it.
    pub fn transition(&mut self, next: GapStatus, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.archived {
            return Err(TransitionError::Archived(self.id));
        }
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::NotAllowed {
                gap_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        !self.archived && self.status != GapStatus::Resolved
    }

    /// Ranking order: priority score descending, ties by skill id ascending.
    pub fn rank_order(&self, other: &SkillGap) -> Ordering {
        other
            .priority_score
            .total_cmp(&self.priority_score)
            .then_with(|| self.skill_id.cmp(&other.skill_id))
    }
}
