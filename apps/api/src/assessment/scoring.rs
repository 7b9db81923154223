use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::skills::SkillCategory;

/// Tunables for gap scoring. Defaults are the documented weighting model;
/// every field can be overridden from the environment (see `Config`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Observations below this effective confidence count as unobserved.
    pub confidence_threshold: f64,
    /// Level assumed for a required skill with zero observations.
    pub fallback_level: Option<String>,
    pub evidence_half_life_months: f64,
    pub technical_impact_weight: f64,
    pub soft_impact_weight: f64,
    pub technical_hours_per_level: f64,
    pub soft_hours_per_level: f64,
    pub urgency_weight: f64,
    pub effort_weight: f64,
    /// Effort at or above this many hours gets no ease bonus.
    pub max_effort_hours: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            fallback_level: None,
            evidence_half_life_months: 18.0,
            technical_impact_weight: 0.8,
            soft_impact_weight: 0.6,
            technical_hours_per_level: 12.0,
            soft_hours_per_level: 8.0,
            urgency_weight: 0.7,
            effort_weight: 0.3,
            max_effort_hours: 60.0,
        }
    }
}

impl ScoringConfig {
    pub fn impact_weight(&self, category: SkillCategory) -> f64 {
        match category {
            SkillCategory::Technical => self.technical_impact_weight,
            SkillCategory::Soft => self.soft_impact_weight,
        }
    }

    pub fn hours_per_level(&self, category: SkillCategory) -> f64 {
        match category {
            SkillCategory::Technical => self.technical_hours_per_level,
            SkillCategory::Soft => self.soft_hours_per_level,
        }
    }
}

/// Business-impact tag a caller can attach to a required skill.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BusinessImpact {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl BusinessImpact {
    pub fn multiplier(&self) -> f64 {
        match self {
            BusinessImpact::Low => 0.5,
            BusinessImpact::Medium => 0.75,
            BusinessImpact::High => 1.0,
            BusinessImpact::Critical => 1.25,
        }
    }
}

/// Deadline factor when the caller supplies no deadline.
const NO_DEADLINE_FACTOR: f64 = 0.6;
/// Deadlines this many days out or further get the minimum factor.
const DEADLINE_HORIZON_DAYS: f64 = 180.0;
const MIN_DEADLINE_FACTOR: f64 = 0.3;

/// Evidence recency with exponential half-life decay.
/// Returns 1.0 for evidence without a timestamp or dated in the future.
pub fn compute_recency_factor(
    observed_at: Option<DateTime<Utc>>,
    as_of: DateTime<Utc>,
    half_life_months: f64,
) -> f64 {
    let observed = match observed_at {
        Some(t) => t.date_naive(),
        None => return 1.0,
    };
    let months_since = months_between(observed, as_of.date_naive());
    if months_since <= 0.0 || half_life_months <= 0.0 {
        return 1.0;
    }
    (0.5_f64)
        .powf(months_since / half_life_months)
        .clamp(0.0, 1.0)
}

/// 1.0 for overdue or imminent deadlines, falling linearly to 0.3 at the horizon.
pub fn compute_deadline_factor(deadline: Option<NaiveDate>, as_of: DateTime<Utc>) -> f64 {
    let deadline = match deadline {
        Some(d) => d,
        None => return NO_DEADLINE_FACTOR,
    };
    let days_left = (deadline - as_of.date_naive()).num_days().max(0) as f64;
    (1.0 - days_left / DEADLINE_HORIZON_DAYS).clamp(MIN_DEADLINE_FACTOR, 1.0)
}

/// urgency = category impact weight × business-impact multiplier × deadline factor
pub fn compute_urgency_score(
    category: SkillCategory,
    impact: BusinessImpact,
    deadline_factor: f64,
    config: &ScoringConfig,
) -> f64 {
    (config.impact_weight(category) * impact.multiplier() * deadline_factor).clamp(0.0, 1.0)
}

/// priority = urgency_weight × urgency + effort_weight × ease, where ease falls
/// as effort grows. Same urgency with less effort ranks higher.
pub fn compute_priority_score(urgency: f64, effort_hours: f64, config: &ScoringConfig) -> f64 {
    let effort_norm = if config.max_effort_hours > 0.0 {
        (effort_hours / config.max_effort_hours).clamp(0.0, 1.0)
    } else {
        1.0
    };
    (config.urgency_weight * urgency + config.effort_weight * (1.0 - effort_norm)).clamp(0.0, 1.0)
}

fn months_between(start: NaiveDate, end: NaiveDate) -> f64 {
    let years = end.year() - start.year();
    let months = end.month() as i32 - start.month() as i32;
    let total = years * 12 + months;
    let day_frac = (end.day() as f64 - start.day() as f64) / 30.0;
    (total as f64 + day_frac).max(0.0)
}
