//! Embeds reference documents (job description, case study, rubrics) into the
//! vector store used for evaluation context.
//!
//! ```text
//! ingest                                   # default reference set under REFERENCE_DIR
//! ingest cv_rubric=./docs/rubric.pdf ...   # explicit category=path pairs
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use evaluator::config::IngestConfig;
use evaluator::ingest::chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use evaluator::ingest::pdf::PdfTextExtractor;
use evaluator::ingest::ReferenceIngestor;
use evaluator::llm_client::gemini::EMBEDDING_DIMENSIONS;
use evaluator::llm_client::GeminiClient;
use evaluator::models::ReferenceCategory;
use evaluator::rag::QdrantStore;

#[derive(Parser)]
#[command(name = "ingest")]
#[command(about = "Embed reference documents into the vector store")]
struct Cli {
    /// Documents as `category=path`. Defaults to the standard set under REFERENCE_DIR.
    documents: Vec<ReferenceDoc>,

    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,
}

#[derive(Debug, Clone)]
struct ReferenceDoc {
    category: ReferenceCategory,
    path: PathBuf,
}

impl FromStr for ReferenceDoc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (category, path) = s
            .split_once('=')
            .ok_or_else(|| format!("expected category=path, got '{s}'"))?;
        if path.trim().is_empty() {
            return Err(format!("missing path in '{s}'"));
        }
        Ok(Self {
            category: category.trim().parse()?,
            path: PathBuf::from(path.trim()),
        })
    }
}

/// The scoring rubric covers both the CV and the project, so it is stored
/// under both rubric categories.
fn default_documents(dir: &Path) -> Vec<ReferenceDoc> {
    [
        (ReferenceCategory::JobDescription, "Job_Description.pdf"),
        (ReferenceCategory::CaseStudy, "case_study_brief.pdf"),
        (ReferenceCategory::CvRubric, "scoring_rubric.pdf"),
        (ReferenceCategory::ProjectRubric, "scoring_rubric.pdf"),
        (ReferenceCategory::CaseStudy, "Study_Case_Submission.pdf"),
    ]
    .into_iter()
    .map(|(category, file)| ReferenceDoc {
        category,
        path: dir.join(file),
    })
    .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = IngestConfig::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let documents = if cli.documents.is_empty() {
        default_documents(&config.reference_dir)
    } else {
        cli.documents
    };
    info!("Starting ingestion of {} document(s)", documents.len());

    let vectors = QdrantStore::new(
        &config.qdrant_url,
        config.qdrant_api_key.clone(),
        config.qdrant_collection.clone(),
    )?;
    vectors.ensure_collection(EMBEDDING_DIMENSIONS).await?;

    let gemini = GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.gemini_embed_model.clone(),
    )?;

    let ingestor = ReferenceIngestor::new(
        Arc::new(PdfTextExtractor),
        Arc::new(gemini),
        Arc::new(vectors),
    )
    .with_chunking(cli.chunk_size, cli.chunk_overlap);

    let mut failed = 0usize;
    for doc in &documents {
        match ingestor.ingest(&doc.path, doc.category).await {
            Ok(report) if report.is_complete() => {
                info!(path = %doc.path.display(), chunks = report.chunks, "Document ingested");
            }
            Ok(report) => {
                warn!(
                    path = %doc.path.display(),
                    stored = report.stored,
                    failed = report.failed,
                    "Document partially ingested"
                );
                failed += 1;
            }
            Err(e) => {
                error!(path = %doc.path.display(), category = %doc.category, "Ingestion failed: {e}");
                failed += 1;
            }
        }
    }

    info!(
        succeeded = documents.len() - failed,
        failed, "Ingestion finished"
    );
    if failed > 0 {
        bail!("{failed} of {} document(s) failed to ingest", documents.len());
    }
    Ok(())
}
