use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::worker::WorkerConfig;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_embed_model: String,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub qdrant_collection: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub worker_concurrency: usize,
    pub generation_max_attempts: u32,
    pub reconcile_interval: Duration,
    pub port: u16,
    pub rust_log: String,
}

/// Settings for the `ingest` binary. No database is involved.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_embed_model: String,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub qdrant_collection: String,
    pub reference_dir: PathBuf,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(lookup);

        Ok(Config {
            database_url: env.require("DATABASE_URL")?,
            gemini_api_key: env.require("GEMINI_API_KEY")?,
            gemini_model: env.or("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            gemini_embed_model: env.or("GEMINI_EMBED_MODEL", DEFAULT_EMBED_MODEL),
            qdrant_url: env.or("QDRANT_URL", DEFAULT_QDRANT_URL),
            qdrant_api_key: env.get("QDRANT_API_KEY"),
            qdrant_collection: env.or("QDRANT_COLLECTION", DEFAULT_QDRANT_COLLECTION),
            upload_dir: PathBuf::from(env.or("UPLOAD_DIR", "./uploads")),
            max_upload_bytes: env.parse("MAX_UPLOAD_BYTES", "10485760", "a byte count")?,
            worker_concurrency: env
                .parse::<usize>("WORKER_CONCURRENCY", "3", "a positive integer")?
                .max(1),
            generation_max_attempts: env
                .parse::<u32>("GENERATION_MAX_ATTEMPTS", "3", "a positive integer")?
                .max(1),
            reconcile_interval: Duration::from_secs(
                env.parse::<u64>("RECONCILE_INTERVAL_SECS", "10", "a number of seconds")?
                    .max(1),
            ),
            port: env.parse("PORT", "8080", "a valid port number")?,
            rust_log: env.or("RUST_LOG", "info"),
        })
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: self.worker_concurrency,
            reconcile_interval: self.reconcile_interval,
            ..WorkerConfig::default()
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(lookup);

        Ok(IngestConfig {
            gemini_api_key: env.require("GEMINI_API_KEY")?,
            gemini_model: env.or("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            gemini_embed_model: env.or("GEMINI_EMBED_MODEL", DEFAULT_EMBED_MODEL),
            qdrant_url: env.or("QDRANT_URL", DEFAULT_QDRANT_URL),
            qdrant_api_key: env.get("QDRANT_API_KEY"),
            qdrant_collection: env.or("QDRANT_COLLECTION", DEFAULT_QDRANT_COLLECTION),
            reference_dir: PathBuf::from(env.or("REFERENCE_DIR", "./reference_docs")),
            rust_log: env.or("RUST_LOG", "info"),
        })
    }
}

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_EMBED_MODEL: &str = "text-embedding-004";
const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
const DEFAULT_QDRANT_COLLECTION: &str = "cv_evaluator_docs";

/// Variable lookup where blank values count as unset.
struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .with_context(|| format!("Required environment variable '{key}' is not set"))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: &str, expected: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.or(key, default)
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be {expected}"))
    }
}
