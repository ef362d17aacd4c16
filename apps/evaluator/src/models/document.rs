use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a reference document in the vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceCategory {
    JobDescription,
    CvRubric,
    CaseStudy,
    ProjectRubric,
}

impl ReferenceCategory {
    /// Categories retrieved when evaluating a CV.
    pub const CV_STAGE: [ReferenceCategory; 2] =
        [ReferenceCategory::JobDescription, ReferenceCategory::CvRubric];

    /// Categories retrieved when evaluating a project report.
    pub const PROJECT_STAGE: [ReferenceCategory; 2] =
        [ReferenceCategory::CaseStudy, ReferenceCategory::ProjectRubric];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceCategory::JobDescription => "job_description",
            ReferenceCategory::CvRubric => "cv_rubric",
            ReferenceCategory::CaseStudy => "case_study",
            ReferenceCategory::ProjectRubric => "project_rubric",
        }
    }
}

impl fmt::Display for ReferenceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job_description" => Ok(ReferenceCategory::JobDescription),
            "cv_rubric" => Ok(ReferenceCategory::CvRubric),
            "case_study" => Ok(ReferenceCategory::CaseStudy),
            "project_rubric" => Ok(ReferenceCategory::ProjectRubric),
            other => Err(format!("unknown reference category '{other}'")),
        }
    }
}

/// File-type tag of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DocumentKind {
    Cv,
    ProjectReport,
    Reference(ReferenceCategory),
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Cv => "cv",
            DocumentKind::ProjectReport => "project_report",
            DocumentKind::Reference(category) => category.as_str(),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cv" => Ok(DocumentKind::Cv),
            "project_report" => Ok(DocumentKind::ProjectReport),
            other => other
                .parse::<ReferenceCategory>()
                .map(DocumentKind::Reference)
                .map_err(|_| format!("unknown document kind '{other}'")),
        }
    }
}

impl From<DocumentKind> for String {
    fn from(kind: DocumentKind) -> Self {
        kind.as_str().to_string()
    }
}

impl TryFrom<String> for DocumentKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A stored source document. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub kind: DocumentKind,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(new: NewDocument) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: new.filename,
            original_filename: new.original_filename,
            kind: new.kind,
            file_path: new.file_path,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub original_filename: String,
    pub kind: DocumentKind,
    pub file_path: String,
}
