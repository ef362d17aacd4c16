pub mod config;
pub mod db;
pub mod errors;
pub mod evaluation;
pub mod ingest;
pub mod llm_client;
pub mod models;
pub mod rag;
pub mod routes;
pub mod state;
pub mod storage;
pub mod store;
pub mod worker;
