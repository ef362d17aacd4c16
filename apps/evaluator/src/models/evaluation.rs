use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an evaluation job.
///
/// `Queued → Processing → Completed | Failed`. Terminal states have no outgoing
/// transition; the only backwards edge is startup recovery of jobs that were
/// interrupted while `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl EvaluationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationStatus::Queued => "queued",
            EvaluationStatus::Processing => "processing",
            EvaluationStatus::Completed => "completed",
            EvaluationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EvaluationStatus::Completed | EvaluationStatus::Failed
        )
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvaluationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(EvaluationStatus::Queued),
            "processing" => Ok(EvaluationStatus::Processing),
            "completed" => Ok(EvaluationStatus::Completed),
            "failed" => Ok(EvaluationStatus::Failed),
            other => Err(format!("unknown evaluation status '{other}'")),
        }
    }
}

/// Scores and feedback of a completed evaluation.
/// Only ever attached to an `Evaluation` whose status is `Completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// 0.0 – 1.0
    pub cv_match_rate: f64,
    pub cv_feedback: String,
    /// 1.0 – 5.0 (0.0 for the degraded fallback)
    pub project_score: f64,
    pub project_feedback: String,
    pub overall_summary: String,
}

/// An evaluation job as owned by the job store.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub id: Uuid,
    pub job_title: String,
    pub cv_document_id: Uuid,
    pub project_document_id: Uuid,
    pub status: EvaluationStatus,
    pub result: Option<EvaluationResult>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Evaluation {
    /// Builds a freshly queued job. Stores call this on `create`.
    pub fn queued(new: NewEvaluation) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_title: new.job_title,
            cv_document_id: new.cv_document_id,
            project_document_id: new.project_document_id,
            status: EvaluationStatus::Queued,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating an evaluation job.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvaluation {
    pub job_title: String,
    pub cv_document_id: Uuid,
    pub project_document_id: Uuid,
}
