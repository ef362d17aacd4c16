use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::extract::extract_validated;
use super::prompts::{build_cv_prompt, build_project_prompt, build_summary_prompt};
use super::scores::{CvEvaluation, ProjectEvaluation, Validate};
use crate::errors::PipelineError;
use crate::ingest::pdf::TextExtractor;
use crate::llm_client::{generate_with_retry, GenerativeClient};
use crate::models::{EvaluationResult, EvaluationStatus, ReferenceCategory};
use crate::rag::ContextAssembler;
use crate::store::{DocumentStore, JobStore};
use crate::worker::JobRunner;

pub const SCORING_TEMPERATURE: f32 = 0.3;
pub const SUMMARY_TEMPERATURE: f32 = 0.5;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Step of the pipeline a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Claim,
    LoadJob,
    LoadCv,
    LoadProject,
    ExtractCv,
    ExtractProject,
    EvaluateCv,
    EvaluateProject,
    Summarize,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Claim => "failed to claim evaluation",
            Stage::LoadJob => "failed to load evaluation",
            Stage::LoadCv => "failed to load CV document",
            Stage::LoadProject => "failed to load project document",
            Stage::ExtractCv => "failed to parse CV",
            Stage::ExtractProject => "failed to parse project report",
            Stage::EvaluateCv => "failed to evaluate CV",
            Stage::EvaluateProject => "failed to evaluate project",
            Stage::Summarize => "failed to generate summary",
            Stage::Persist => "failed to save results",
        })
    }
}

#[derive(Debug, Error)]
#[error("{stage}: {source}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub source: PipelineError,
}

fn at<E: Into<PipelineError>>(stage: Stage) -> impl FnOnce(E) -> StageFailure {
    move |e| StageFailure {
        stage,
        source: e.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The job was not `Queued` when claimed (duplicate dispatch or finished).
    Skipped,
}

/// Drives one evaluation job from `Queued` to `Completed` or `Failed`.
pub struct Evaluator {
    jobs: Arc<dyn JobStore>,
    documents: Arc<dyn DocumentStore>,
    extractor: Arc<dyn TextExtractor>,
    llm: Arc<dyn GenerativeClient>,
    context: ContextAssembler,
    max_attempts: u32,
}

impl Evaluator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        documents: Arc<dyn DocumentStore>,
        extractor: Arc<dyn TextExtractor>,
        llm: Arc<dyn GenerativeClient>,
        context: ContextAssembler,
    ) -> Self {
        Self {
            jobs,
            documents,
            extractor,
            llm,
            context,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Runs the job. Every failure after the claim is recorded on the job
    /// before it is returned.
    pub async fn run(
        &self,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, StageFailure> {
        let claimed = self
            .jobs
            .update_status(job_id, EvaluationStatus::Queued, EvaluationStatus::Processing)
            .await
            .map_err(at(Stage::Claim))?;

        if !claimed {
            debug!(%job_id, "evaluation is not queued, skipping");
            return Ok(RunOutcome::Skipped);
        }

        info!(%job_id, "Starting evaluation");

        let result = match self.evaluate(job_id, cancel).await {
            Ok(result) => result,
            Err(failure) => {
                self.record_failure(job_id, &failure).await;
                return Err(failure);
            }
        };

        if let Err(e) = self.jobs.update_result(job_id, &result).await {
            let failure = at(Stage::Persist)(e);
            self.record_failure(job_id, &failure).await;
            return Err(failure);
        }

        info!(
            %job_id,
            cv_match_rate = result.cv_match_rate,
            project_score = result.project_score,
            "Evaluation completed"
        );
        Ok(RunOutcome::Completed)
    }

    async fn evaluate(
        &self,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<EvaluationResult, StageFailure> {
        let job = self
            .jobs
            .find_by_id(job_id)
            .await
            .map_err(at(Stage::LoadJob))?;
        let cv_document = self
            .documents
            .find_by_id(job.cv_document_id)
            .await
            .map_err(at(Stage::LoadCv))?;
        let project_document = self
            .documents
            .find_by_id(job.project_document_id)
            .await
            .map_err(at(Stage::LoadProject))?;

        debug!(%job_id, "Parsing documents");
        let cv = self
            .extractor
            .extract(Path::new(&cv_document.file_path))
            .await
            .map_err(at(Stage::ExtractCv))?;
        let project = self
            .extractor
            .extract(Path::new(&project_document.file_path))
            .await
            .map_err(at(Stage::ExtractProject))?;

        let cv_context = self
            .retrieve(job_id, &cv.text, &ReferenceCategory::CV_STAGE)
            .await;
        let project_context = self
            .retrieve(job_id, &project.text, &ReferenceCategory::PROJECT_STAGE)
            .await;

        debug!(%job_id, "Evaluating CV");
        let cv_eval: CvEvaluation = self
            .score(
                job_id,
                &build_cv_prompt(&job.job_title, &cv_context, &cv.text),
                CvEvaluation::fallback,
                cancel,
            )
            .await
            .map_err(at(Stage::EvaluateCv))?;
        let drift = (cv_eval.weighted_average - cv_eval.expected_weighted_average()).abs();
        if drift > 0.5 {
            debug!(%job_id, drift, "CV weighted average differs from sub-scores");
        }

        debug!(%job_id, "Evaluating project report");
        let project_eval: ProjectEvaluation = self
            .score(
                job_id,
                &build_project_prompt(&project_context, &project.text),
                ProjectEvaluation::fallback,
                cancel,
            )
            .await
            .map_err(at(Stage::EvaluateProject))?;

        debug!(%job_id, "Generating summary");
        let summary_prompt = build_summary_prompt(
            &job.job_title,
            cv_eval.match_rate,
            &cv_eval.feedback,
            project_eval.project_score,
            &project_eval.feedback,
        );
        let raw = generate_with_retry(
            self.llm.as_ref(),
            &summary_prompt,
            SUMMARY_TEMPERATURE,
            self.max_attempts,
            cancel,
        )
        .await
        .map_err(at(Stage::Summarize))?;

        let overall_summary = raw.trim().to_string();
        if overall_summary.is_empty() {
            return Err(at(Stage::Summarize)(PipelineError::MalformedOutput {
                reason: "summary is empty".to_string(),
                raw,
            }));
        }

        Ok(EvaluationResult {
            cv_match_rate: cv_eval.match_rate,
            cv_feedback: cv_eval.feedback,
            project_score: project_eval.project_score,
            project_feedback: project_eval.feedback,
            overall_summary,
        })
    }

    /// Retrieval failures are not fatal; the prompt then carries the
    /// no-context sentinel.
    async fn retrieve(&self, job_id: Uuid, text: &str, categories: &[ReferenceCategory]) -> String {
        match self.context.assemble(text, categories).await {
            Ok(context) => context,
            Err(e) => {
                warn!(%job_id, "Failed to retrieve reference context: {e}");
                String::new()
            }
        }
    }

    /// Generates and decodes one score payload. Empty model output yields the
    /// zero-score `fallback` instead of an error.
    async fn score<T: DeserializeOwned + Validate>(
        &self,
        job_id: Uuid,
        prompt: &str,
        fallback: fn() -> T,
        cancel: &CancellationToken,
    ) -> Result<T, PipelineError> {
        debug!(%job_id, prompt_chars = prompt.len(), "sending scoring prompt");

        let raw = generate_with_retry(
            self.llm.as_ref(),
            prompt,
            SCORING_TEMPERATURE,
            self.max_attempts,
            cancel,
        )
        .await?;

        if raw.trim().is_empty() {
            warn!(%job_id, "Empty response from model, using fallback scores");
            return Ok(fallback());
        }

        extract_validated(&raw)
    }

    async fn record_failure(&self, job_id: Uuid, failure: &StageFailure) {
        error!(%job_id, "Evaluation failed: {failure}");
        if let Err(e) = self.jobs.update_error(job_id, &failure.to_string()).await {
            error!(%job_id, "Failed to record evaluation failure: {e}");
        }
    }
}

#[async_trait]
impl JobRunner for Evaluator {
    async fn run(
        &self,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, StageFailure> {
        Evaluator::run(self, job_id, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::ingest::pdf::{ExtractedText, ExtractionError};
    use crate::llm_client::{EmbeddingClient, LlmError};
    use crate::models::{DocumentKind, Evaluation, NewDocument, NewEvaluation};
    use crate::rag::{MemoryVectorStore, NO_CONTEXT};
    use crate::store::{MemoryDocumentStore, MemoryJobStore, StoreError};

    const CV_JSON: &str = r#"```json
{
  "technical_skills_score": 4,
  "experience_level_score": 4,
  "achievements_score": 3,
  "cultural_fit_score": 5,
  "weighted_average": 4.0,
  "match_rate": 0.8,
  "feedback": "Solid backend experience."
}
```"#;

    const PROJECT_JSON: &str = r#"{
  "correctness_score": 4,
  "code_quality_score": 4,
  "resilience_score": 4,
  "documentation_score": 3,
  "creativity_score": 3,
  "weighted_average": 3.75,
  "project_score": 3.75,
  "feedback": "Good retry handling."
}"#;

    // ── Fakes ──────────────────────────────────────────────────────────────

    /// Returns "text of <path>", or `Missing` for paths containing "missing".
    struct FakeExtractor;

    #[async_trait]
    impl TextExtractor for FakeExtractor {
        async fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractionError> {
            let path_str = path.to_string_lossy();
            if path_str.contains("missing") {
                return Err(ExtractionError::Missing(path.to_path_buf()));
            }
            Ok(ExtractedText {
                text: format!("text of {path_str}"),
                page_count: 1,
            })
        }
    }

    #[derive(Clone)]
    enum Reply {
        Text(&'static str),
        Fail,
    }

    /// Answers by prompt kind and records every prompt it sees.
    struct ScriptedLlm {
        cv: Reply,
        project: Reply,
        summary: Reply,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn happy() -> Self {
            Self {
                cv: Reply::Text(CV_JSON),
                project: Reply::Text(PROJECT_JSON),
                summary: Reply::Text("  Strong candidate. Recommendation: Hire.\n"),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerativeClient for ScriptedLlm {
        async fn generate(&self, prompt: &str, _temperature: f32) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let reply = if prompt.contains("CANDIDATE CV:") {
                &self.cv
            } else if prompt.contains("CANDIDATE'S PROJECT REPORT:") {
                &self.project
            } else {
                &self.summary
            };
            match reply {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::Fail => Err(LlmError::Api {
                    status: 500,
                    message: "backend error".to_string(),
                }),
            }
        }
    }

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingClient for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Ok(vec![1.0, 0.0])
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl EmbeddingClient for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Err(LlmError::EmptyEmbedding)
        }
    }

    /// Delegates to a memory store but refuses to persist results.
    struct ResultRejectingStore(MemoryJobStore);

    #[async_trait]
    impl JobStore for ResultRejectingStore {
        async fn create(&self, new: NewEvaluation) -> Result<Evaluation, StoreError> {
            self.0.create(new).await
        }
        async fn find_by_id(&self, id: Uuid) -> Result<Evaluation, StoreError> {
            self.0.find_by_id(id).await
        }
        async fn update_status(
            &self,
            id: Uuid,
            from: EvaluationStatus,
            to: EvaluationStatus,
        ) -> Result<bool, StoreError> {
            self.0.update_status(id, from, to).await
        }
        async fn update_result(&self, _: Uuid, _: &EvaluationResult) -> Result<(), StoreError> {
            Err(StoreError::InvalidRow("disk full".to_string()))
        }
        async fn update_error(&self, id: Uuid, message: &str) -> Result<(), StoreError> {
            self.0.update_error(id, message).await
        }
        async fn find_pending_jobs(&self, limit: i64) -> Result<Vec<Evaluation>, StoreError> {
            self.0.find_pending_jobs(limit).await
        }
        async fn requeue_interrupted(&self) -> Result<u64, StoreError> {
            self.0.requeue_interrupted().await
        }
    }

    // ── Harness ────────────────────────────────────────────────────────────

    struct Harness {
        jobs: Arc<dyn JobStore>,
        documents: Arc<MemoryDocumentStore>,
        llm: Arc<ScriptedLlm>,
        embedder: Arc<dyn EmbeddingClient>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                jobs: Arc::new(MemoryJobStore::new()),
                documents: Arc::new(MemoryDocumentStore::new()),
                llm: Arc::new(ScriptedLlm::happy()),
                embedder: Arc::new(FixedEmbedder),
            }
        }

        fn evaluator(&self) -> Evaluator {
            let context =
                ContextAssembler::new(self.embedder.clone(), Arc::new(MemoryVectorStore::new()));
            Evaluator::new(
                self.jobs.clone(),
                self.documents.clone(),
                Arc::new(FakeExtractor),
                self.llm.clone(),
                context,
            )
            .with_max_attempts(2)
        }

        async fn document(&self, kind: DocumentKind, path: &str) -> Uuid {
            self.documents
                .create(NewDocument {
                    filename: format!("{kind}.pdf"),
                    original_filename: format!("{kind}.pdf"),
                    kind,
                    file_path: path.to_string(),
                })
                .await
                .unwrap()
                .id
        }

        async fn queued_job(&self) -> Uuid {
            let cv = self.document(DocumentKind::Cv, "uploads/cv.pdf").await;
            let project = self
                .document(DocumentKind::ProjectReport, "uploads/project.pdf")
                .await;
            self.job_with(cv, project).await
        }

        async fn job_with(&self, cv: Uuid, project: Uuid) -> Uuid {
            self.jobs
                .create(NewEvaluation {
                    job_title: "Backend Engineer".to_string(),
                    cv_document_id: cv,
                    project_document_id: project,
                })
                .await
                .unwrap()
                .id
        }
    }

    // ── Tests ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_successful_run_completes_job() {
        let h = Harness::new();
        let id = h.queued_job().await;

        let outcome = h.evaluator().run(id, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);

        let job = h.jobs.find_by_id(id).await.unwrap();
        assert_eq!(job.status, EvaluationStatus::Completed);
        assert!(job.error_message.is_none());
        let result = job.result.unwrap();
        assert_eq!(result.cv_match_rate, 0.8);
        assert_eq!(result.cv_feedback, "Solid backend experience.");
        assert_eq!(result.project_score, 3.75);
        assert_eq!(result.project_feedback, "Good retry handling.");
        assert_eq!(result.overall_summary, "Strong candidate. Recommendation: Hire.");

        let prompts = h.llm.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("text of uploads/cv.pdf"));
        assert!(prompts[0].contains(NO_CONTEXT));
        assert!(prompts[1].contains("text of uploads/project.pdf"));
        assert!(prompts[2].contains("Match Rate: 0.80"));
        assert!(prompts[2].contains("Project Score: 3.75"));
    }

    #[tokio::test]
    async fn test_missing_cv_document_fails_job() {
        let h = Harness::new();
        let project = h
            .document(DocumentKind::ProjectReport, "uploads/project.pdf")
            .await;
        let missing = Uuid::new_v4();
        let id = h.job_with(missing, project).await;

        let failure = h
            .evaluator()
            .run(id, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::LoadCv);

        let job = h.jobs.find_by_id(id).await.unwrap();
        assert_eq!(job.status, EvaluationStatus::Failed);
        assert!(job.result.is_none());
        let message = job.error_message.unwrap();
        assert_eq!(
            message,
            format!("failed to load CV document: document {missing} not found")
        );
        assert!(message.contains("not found"));
    }

    #[tokio::test]
    async fn test_unreadable_project_file_fails_job() {
        let h = Harness::new();
        let cv = h.document(DocumentKind::Cv, "uploads/cv.pdf").await;
        let project = h
            .document(DocumentKind::ProjectReport, "uploads/missing.pdf")
            .await;
        let id = h.job_with(cv, project).await;

        let failure = h
            .evaluator()
            .run(id, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::ExtractProject);
        assert!(h.llm.prompts().is_empty());

        let job = h.jobs.find_by_id(id).await.unwrap();
        assert_eq!(job.status, EvaluationStatus::Failed);
        assert!(job
            .error_message
            .unwrap()
            .starts_with("failed to parse project report: text extraction failed"));
    }

    #[tokio::test]
    async fn test_generation_failure_fails_job_after_retries() {
        let mut h = Harness::new();
        h.llm = Arc::new(ScriptedLlm {
            project: Reply::Fail,
            ..ScriptedLlm::happy()
        });
        let id = h.queued_job().await;

        let failure = h
            .evaluator()
            .run(id, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::EvaluateProject);
        // One CV call, then two project attempts.
        assert_eq!(h.llm.prompts().len(), 3);

        let job = h.jobs.find_by_id(id).await.unwrap();
        assert_eq!(job.status, EvaluationStatus::Failed);
        assert!(job
            .error_message
            .unwrap()
            .starts_with("failed to evaluate project: generation failed after 2 attempt(s)"));
    }

    #[tokio::test]
    async fn test_empty_cv_output_uses_fallback_scores() {
        let mut h = Harness::new();
        h.llm = Arc::new(ScriptedLlm {
            cv: Reply::Text("   \n"),
            ..ScriptedLlm::happy()
        });
        let id = h.queued_job().await;

        h.evaluator().run(id, &CancellationToken::new()).await.unwrap();

        let result = h.jobs.find_by_id(id).await.unwrap().result.unwrap();
        assert_eq!(result.cv_match_rate, 0.0);
        assert_eq!(
            result.cv_feedback,
            "Failed to evaluate CV due to API response issues. Please try again later."
        );
        assert_eq!(result.project_score, 3.75);
    }

    #[tokio::test]
    async fn test_malformed_cv_output_fails_job() {
        let mut h = Harness::new();
        h.llm = Arc::new(ScriptedLlm {
            cv: Reply::Text("I am unable to score this CV."),
            ..ScriptedLlm::happy()
        });
        let id = h.queued_job().await;

        let failure = h
            .evaluator()
            .run(id, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::EvaluateCv);
        assert!(matches!(
            failure.source,
            PipelineError::MalformedOutput { .. }
        ));
        assert_eq!(
            h.jobs.find_by_id(id).await.unwrap().status,
            EvaluationStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_empty_summary_fails_job() {
        let mut h = Harness::new();
        h.llm = Arc::new(ScriptedLlm {
            summary: Reply::Text(" \n "),
            ..ScriptedLlm::happy()
        });
        let id = h.queued_job().await;

        let failure = h
            .evaluator()
            .run(id, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Summarize);
        assert!(h.jobs.find_by_id(id).await.unwrap().result.is_none());
    }

    #[tokio::test]
    async fn test_retrieval_failure_is_not_fatal() {
        let mut h = Harness::new();
        h.embedder = Arc::new(BrokenEmbedder);
        let id = h.queued_job().await;

        let outcome = h.evaluator().run(id, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert!(h.llm.prompts()[0].contains(NO_CONTEXT));
    }

    #[tokio::test]
    async fn test_second_run_of_same_job_is_skipped() {
        let h = Harness::new();
        let id = h.queued_job().await;
        let evaluator = h.evaluator();

        evaluator.run(id, &CancellationToken::new()).await.unwrap();
        let again = evaluator.run(id, &CancellationToken::new()).await.unwrap();

        assert_eq!(again, RunOutcome::Skipped);
        assert_eq!(h.llm.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let h = Harness::new();
        let failure = h
            .evaluator()
            .run(Uuid::new_v4(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Claim);
        assert!(matches!(failure.source, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_persist_failure_still_leaves_job_failed() {
        let mut h = Harness::new();
        h.jobs = Arc::new(ResultRejectingStore(MemoryJobStore::new()));
        let id = h.queued_job().await;

        let failure = h
            .evaluator()
            .run(id, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Persist);

        let job = h.jobs.find_by_id(id).await.unwrap();
        assert_eq!(job.status, EvaluationStatus::Failed);
        assert!(job
            .error_message
            .unwrap()
            .starts_with("failed to save results: persistence failed"));
    }
}
