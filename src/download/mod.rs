//! Artifact retrieval for persisted records.
//!
//! This module fetches the PDF behind each record's URL with a bounded number
//! of simultaneous requests and writes it to `{artifact_dir}/{id}.pdf`.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large files)
//! - Success means HTTP 200 and nothing else; no retries
//! - Partial bodies never land at the final path (`.part` then rename)
//! - Structured error types with full context
//!
//! # Example
//!
//! ```no_run
//! use collector_core::download::{ArtifactFetcher, HttpClient, DEFAULT_CONCURRENCY};
//! use std::sync::Arc;
//!
//! # async fn example(records: Vec<collector_core::Record>) -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(HttpClient::new()?);
//! let fetcher = ArtifactFetcher::new(DEFAULT_CONCURRENCY, "./pdfs", client)?;
//! for outcome in fetcher.fetch_all(&records).await? {
//!     println!("{}: saved={}", outcome.identity(), outcome.is_saved());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
mod fetcher;

pub use client::{ArtifactClient, HttpClient};
pub use error::DownloadError;
pub use fetcher::{ArtifactFetcher, DEFAULT_CONCURRENCY, FetchError, FetchOutcome, FetchStats};

// Note: no module-local Result alias; use `Result<T, DownloadError>` explicitly.
