use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use evaluator::config::Config;
use evaluator::db::{create_pool, run_migrations};
use evaluator::evaluation::Evaluator;
use evaluator::ingest::pdf::PdfTextExtractor;
use evaluator::llm_client::gemini::EMBEDDING_DIMENSIONS;
use evaluator::llm_client::GeminiClient;
use evaluator::rag::{ContextAssembler, QdrantStore};
use evaluator::routes::build_router;
use evaluator::state::AppState;
use evaluator::storage::UploadStorage;
use evaluator::store::{DocumentStore, JobStore, PgDocumentStore, PgJobStore};
use evaluator::worker::WorkerPool;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CV Evaluator v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;
    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(db.clone()));
    let documents: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(db));

    // Initialize upload storage
    let storage = UploadStorage::new(&config.upload_dir);
    storage.ensure_dir().await?;
    info!("Upload directory: {}", storage.root().display());

    // Initialize Qdrant
    let vectors = QdrantStore::new(
        &config.qdrant_url,
        config.qdrant_api_key.clone(),
        config.qdrant_collection.clone(),
    )?;
    vectors.ensure_collection(EMBEDDING_DIMENSIONS).await?;
    info!(
        "Qdrant initialized ({} / {})",
        vectors.url(),
        vectors.collection()
    );

    // Initialize LLM client
    let gemini = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.gemini_embed_model.clone(),
    )?);
    info!("LLM client initialized (model: {})", gemini.model());

    let evaluator = Evaluator::new(
        jobs.clone(),
        documents.clone(),
        Arc::new(PdfTextExtractor),
        gemini.clone(),
        ContextAssembler::new(gemini, Arc::new(vectors)),
    )
    .with_max_attempts(config.generation_max_attempts);

    // Recover jobs interrupted by a previous shutdown, then start workers
    let requeued = jobs.requeue_interrupted().await?;
    if requeued > 0 {
        info!(requeued, "Re-queued interrupted evaluations");
    }
    let mut pool = WorkerPool::start(Arc::new(evaluator), jobs.clone(), config.worker_config());

    let state = AppState {
        jobs,
        documents,
        storage,
        queue: pool.queue(),
        max_upload_bytes: config.max_upload_bytes,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // A second signal while draining aborts in-flight generation.
    let in_flight = pool.in_flight_token();
    let escalation = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Second shutdown signal, cancelling in-flight evaluations");
        in_flight.cancel();
    });

    pool.stop().await;
    escalation.abort();

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
