//! Paper Collector Core Library
//!
//! Collects bibliographic records from arXiv and a Zotero library, merges them
//! into a single deduplicated SQLite store and fetches a PDF for each new
//! record under a fixed concurrency budget.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`record`] - The canonical record and field normalization
//! - [`provider`] - arXiv and Zotero adapters (read sources, publish sink)
//! - [`dedup`] - Intra-batch and against-store deduplication
//! - [`db`] - Database connection and schema management
//! - [`store`] - Transactional record persistence
//! - [`download`] - Concurrency-bounded artifact retrieval
//! - [`pipeline`] - Stage orchestration and maintenance operations
//! - [`config`] - Pipeline configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod dedup;
pub mod download;
pub mod pipeline;
pub mod provider;
pub mod record;
pub mod store;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, LoadedConfig, PipelineConfig};
pub use db::{Database, DatabaseOptions, DbError};
pub use dedup::{ExistingSnapshot, PersistAction, PersistPlan, SkipReason, SkippedRecord};
pub use download::{
    ArtifactClient, ArtifactFetcher, DEFAULT_CONCURRENCY, DownloadError, FetchError, FetchOutcome,
    FetchStats, HttpClient,
};
pub use pipeline::{Pipeline, PipelineError, PipelineReport, PipelineStage, SourceFailure};
pub use provider::{
    ArxivSource, ProviderError, PublishError, PublishSink, RecordSource, ZoteroPublisher,
    ZoteroSource,
};
pub use record::{Record, SourceKind, SourceMetadata, normalize_identity};
pub use store::{PersistOutcome, RecordRepository, Store, StoreDbErrorKind, StoreError};
