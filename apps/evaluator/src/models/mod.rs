pub mod document;
pub mod evaluation;

pub use document::{Document, DocumentKind, NewDocument, ReferenceCategory};
pub use evaluation::{Evaluation, EvaluationResult, EvaluationStatus, NewEvaluation};
