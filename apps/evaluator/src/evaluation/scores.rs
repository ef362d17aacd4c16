use serde::{Deserialize, Serialize};

// CV sub-criteria weights.
pub const TECHNICAL_SKILLS_WEIGHT: f64 = 0.40;
pub const EXPERIENCE_LEVEL_WEIGHT: f64 = 0.25;
pub const ACHIEVEMENTS_WEIGHT: f64 = 0.20;
pub const CULTURAL_FIT_WEIGHT: f64 = 0.15;

// Project sub-criteria weights.
pub const CORRECTNESS_WEIGHT: f64 = 0.30;
pub const CODE_QUALITY_WEIGHT: f64 = 0.25;
pub const RESILIENCE_WEIGHT: f64 = 0.20;
pub const DOCUMENTATION_WEIGHT: f64 = 0.15;
pub const CREATIVITY_WEIGHT: f64 = 0.10;

/// Maps a 1–5 weighted average onto the 0–1 match rate.
pub const MATCH_RATE_FACTOR: f64 = 0.2;

pub const MAX_SCORE: f64 = 5.0;

pub const CV_FALLBACK_FEEDBACK: &str =
    "Failed to evaluate CV due to API response issues. Please try again later.";
pub const PROJECT_FALLBACK_FEEDBACK: &str =
    "Failed to evaluate project due to API response issues. Please try again later.";

/// Range checks applied to a decoded score payload.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

fn check_range(name: &str, value: f64, max: f64) -> Result<(), String> {
    if !value.is_finite() {
        return Err(format!("{name} is not a finite number"));
    }
    if !(0.0..=max).contains(&value) {
        return Err(format!("{name} = {value} is outside 0-{max}"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvEvaluation {
    pub technical_skills_score: f64,
    pub experience_level_score: f64,
    pub achievements_score: f64,
    pub cultural_fit_score: f64,
    pub weighted_average: f64,
    pub match_rate: f64,
    pub feedback: String,
}

impl CvEvaluation {
    /// Zero-score result used when the model returns no text at all.
    pub fn fallback() -> Self {
        Self {
            technical_skills_score: 0.0,
            experience_level_score: 0.0,
            achievements_score: 0.0,
            cultural_fit_score: 0.0,
            weighted_average: 0.0,
            match_rate: 0.0,
            feedback: CV_FALLBACK_FEEDBACK.to_string(),
        }
    }

    /// Weighted average recomputed from the sub-scores.
    pub fn expected_weighted_average(&self) -> f64 {
        self.technical_skills_score * TECHNICAL_SKILLS_WEIGHT
            + self.experience_level_score * EXPERIENCE_LEVEL_WEIGHT
            + self.achievements_score * ACHIEVEMENTS_WEIGHT
            + self.cultural_fit_score * CULTURAL_FIT_WEIGHT
    }
}

impl Validate for CvEvaluation {
    fn validate(&self) -> Result<(), String> {
        check_range("technical_skills_score", self.technical_skills_score, MAX_SCORE)?;
        check_range("experience_level_score", self.experience_level_score, MAX_SCORE)?;
        check_range("achievements_score", self.achievements_score, MAX_SCORE)?;
        check_range("cultural_fit_score", self.cultural_fit_score, MAX_SCORE)?;
        check_range("weighted_average", self.weighted_average, MAX_SCORE)?;
        check_range("match_rate", self.match_rate, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEvaluation {
    pub correctness_score: f64,
    pub code_quality_score: f64,
    pub resilience_score: f64,
    pub documentation_score: f64,
    pub creativity_score: f64,
    pub weighted_average: f64,
    pub project_score: f64,
    pub feedback: String,
}

impl ProjectEvaluation {
    pub fn fallback() -> Self {
        Self {
            correctness_score: 0.0,
            code_quality_score: 0.0,
            resilience_score: 0.0,
            documentation_score: 0.0,
            creativity_score: 0.0,
            weighted_average: 0.0,
            project_score: 0.0,
            feedback: PROJECT_FALLBACK_FEEDBACK.to_string(),
        }
    }

    pub fn expected_weighted_average(&self) -> f64 {
        self.correctness_score * CORRECTNESS_WEIGHT
            + self.code_quality_score * CODE_QUALITY_WEIGHT
            + self.resilience_score * RESILIENCE_WEIGHT
            + self.documentation_score * DOCUMENTATION_WEIGHT
            + self.creativity_score * CREATIVITY_WEIGHT
    }
}

impl Validate for ProjectEvaluation {
    fn validate(&self) -> Result<(), String> {
        check_range("correctness_score", self.correctness_score, MAX_SCORE)?;
        check_range("code_quality_score", self.code_quality_score, MAX_SCORE)?;
        check_range("resilience_score", self.resilience_score, MAX_SCORE)?;
        check_range("documentation_score", self.documentation_score, MAX_SCORE)?;
        check_range("creativity_score", self.creativity_score, MAX_SCORE)?;
        check_range("weighted_average", self.weighted_average, MAX_SCORE)?;
        check_range("project_score", self.project_score, MAX_SCORE)
    }
}

/// Renders a weight as a whole percentage, e.g. `0.25` → `25`.
pub fn percent(weight: f64) -> u32 {
    (weight * 100.0).round() as u32
}
