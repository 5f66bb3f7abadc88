//! Concurrency-bounded artifact retrieval for persisted records.
//!
//! The [`ArtifactFetcher`] admits at most `concurrency` requests at a time
//! through a counting semaphore.
//!
//! # Concurrency Model
//!
//! - Permits are acquired in input order before a task is spawned; tokio
//!   semaphores are fair, so admission follows input order
//! - Each retrieval runs in its own Tokio task and releases its permit when
//!   the task ends (RAII)
//! - Records with no usable URL or no store id never take a permit
//!
//! Outcomes come back in input order regardless of completion order. The
//! fetcher never touches the store; reconciling outcomes is the caller's job.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::client::ArtifactClient;
use super::constants::ARTIFACT_EXTENSION;
use super::error::DownloadError;
use crate::record::Record;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default number of simultaneous artifact requests.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Error type for fetcher construction and batch setup.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency { value: usize },

    #[error("failed to prepare artifact directory {path}: {source}")]
    ArtifactDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// What happened to one record.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The artifact was written to `path`.
    Saved {
        identity: String,
        path: PathBuf,
        bytes: u64,
    },
    /// No usable URL; no request was made.
    MissingUrl { identity: String },
    /// The record has no store id to name the artifact after.
    NotPersisted { identity: String },
    /// The request or the write failed; not retried.
    Failed {
        identity: String,
        error: DownloadError,
    },
}

impl FetchOutcome {
    #[must_use]
    pub fn identity(&self) -> &str {
        match self {
            Self::Saved { identity, .. }
            | Self::MissingUrl { identity }
            | Self::NotPersisted { identity }
            | Self::Failed { identity, .. } => identity,
        }
    }

    /// Returns the artifact path for successful outcomes.
    #[must_use]
    pub fn saved_path(&self) -> Option<&Path> {
        match self {
            Self::Saved { path, .. } => Some(path),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// Counters for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Artifacts written.
    pub fetched: usize,
    /// Requests or writes that failed.
    pub failed: usize,
    /// Records never requested (missing URL or not persisted).
    pub skipped: usize,
}

impl FetchStats {
    /// Tallies a finished batch.
    #[must_use]
    pub fn from_outcomes(outcomes: &[FetchOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut stats, outcome| {
            match outcome {
                FetchOutcome::Saved { .. } => stats.fetched += 1,
                FetchOutcome::Failed { .. } => stats.failed += 1,
                FetchOutcome::MissingUrl { .. } | FetchOutcome::NotPersisted { .. } => {
                    stats.skipped += 1;
                }
            }
            stats
        })
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.fetched + self.failed + self.skipped
    }
}

/// Retrieves artifacts for persisted records under a fixed concurrency budget.
pub struct ArtifactFetcher {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    artifact_dir: PathBuf,
    client: Arc<dyn ArtifactClient>,
}

impl std::fmt::Debug for ArtifactFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactFetcher")
            .field("concurrency", &self.concurrency)
            .field("artifact_dir", &self.artifact_dir)
            .finish_non_exhaustive()
    }
}

impl ArtifactFetcher {
    /// Creates a fetcher writing into `artifact_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidConcurrency`] if `concurrency` is outside 1-100.
    #[instrument(level = "debug", skip(client, artifact_dir), fields(artifact_dir = %artifact_dir.as_ref().display()))]
    pub fn new(
        concurrency: usize,
        artifact_dir: impl AsRef<Path>,
        client: Arc<dyn ArtifactClient>,
    ) -> Result<Self, FetchError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(FetchError::InvalidConcurrency { value: concurrency });
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            artifact_dir: artifact_dir.as_ref().to_path_buf(),
            client,
        })
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// Returns where the artifact for store id `id` is written.
    #[must_use]
    pub fn artifact_path(&self, id: i64) -> PathBuf {
        self.artifact_dir.join(format!("{id}.{ARTIFACT_EXTENSION}"))
    }

    /// Retrieves artifacts for `records`, returning one outcome per record in input order.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ArtifactDir`] if the artifact directory cannot be created,
    /// or [`FetchError::SemaphoreClosed`] if the admission gate closed.
    /// Individual retrieval failures are outcomes, not errors.
    #[instrument(skip(self, records), fields(records = records.len(), concurrency = self.concurrency))]
    pub async fn fetch_all(&self, records: &[Record]) -> Result<Vec<FetchOutcome>, FetchError> {
        tokio::fs::create_dir_all(&self.artifact_dir)
            .await
            .map_err(|source| FetchError::ArtifactDir {
                path: self.artifact_dir.clone(),
                source,
            })?;

        let mut slots: Vec<Option<FetchOutcome>> = Vec::with_capacity(records.len());
        let mut handles = Vec::new();

        for (index, record) in records.iter().enumerate() {
            let identity = record.identity.clone();

            let Some(url) = record.artifact_url() else {
                debug!(identity = %identity, "no artifact URL, skipping");
                slots.push(Some(FetchOutcome::MissingUrl { identity }));
                continue;
            };
            let Some(id) = record.id else {
                warn!(identity = %identity, "record has no store id, skipping");
                slots.push(Some(FetchOutcome::NotPersisted { identity }));
                continue;
            };
            slots.push(None);

            // Blocks while `concurrency` requests are in flight
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| FetchError::SemaphoreClosed)?;

            let client = Arc::clone(&self.client);
            let dest = self.artifact_path(id);
            let url = url.to_string();
            let task_url = url.clone();

            handles.push((
                index,
                identity,
                url,
                tokio::spawn(async move {
                    let _permit = permit;
                    let result = client.fetch_to_file(&task_url, &dest).await;
                    (dest, result)
                }),
            ));
        }

        for (index, identity, url, handle) in handles {
            let outcome = match handle.await {
                Ok((path, Ok(bytes))) => {
                    debug!(identity = %identity, path = %path.display(), bytes, "artifact fetched");
                    FetchOutcome::Saved {
                        identity,
                        path,
                        bytes,
                    }
                }
                Ok((_, Err(error))) => {
                    warn!(identity = %identity, url = %url, error = %error, "artifact fetch failed");
                    FetchOutcome::Failed { identity, error }
                }
                Err(join_error) => {
                    warn!(identity = %identity, error = %join_error, "fetch task panicked");
                    FetchOutcome::Failed {
                        identity,
                        error: DownloadError::TaskAborted {
                            url,
                            reason: join_error.to_string(),
                        },
                    }
                }
            };
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(outcome);
            }
        }

        let outcomes: Vec<FetchOutcome> = slots.into_iter().flatten().collect();
        let stats = FetchStats::from_outcomes(&outcomes);
        info!(
            fetched = stats.fetched,
            failed = stats.failed,
            skipped = stats.skipped,
            "artifact batch complete"
        );

        Ok(outcomes)
    }
}
