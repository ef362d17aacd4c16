//! The evaluation pipeline: prompts, structured-output extraction, score
//! payloads and the per-job state machine.

pub mod evaluator;
pub mod extract;
pub mod prompts;
pub mod scores;

pub use evaluator::{Evaluator, RunOutcome, Stage, StageFailure};
pub use extract::{extract_json, extract_validated};
pub use scores::{CvEvaluation, ProjectEvaluation, Validate};
