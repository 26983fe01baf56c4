// Data processing pipeline: ingestion, processing, storage and geocoding

pub mod geocode;
pub mod ingestion;
pub mod orchestrator;
pub mod processing;
pub mod schema;
pub mod storage;

pub use orchestrator::{CleaningSummary, Pipeline, RunSummary};
