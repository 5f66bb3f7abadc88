//! Collection-and-persistence pipeline.
//!
//! One [`Pipeline::run`] walks a fixed sequence of stages:
//!
//! ```text
//! Init → Snapshot → Collect → Dedup → Persist → FetchArtifacts → Reconcile → Done
//! ```
//!
//! Only an unusable store (snapshot failure) or an unusable artifact directory
//! aborts a run. A failing source contributes nothing, a persistence conflict
//! leaves the run with zero stored records, and per-record publish or fetch
//! failures are counted in the [`PipelineReport`]. There is no automatic retry;
//! running again is safe because every stage is idempotent against the store.

pub mod maintenance;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::dedup::{self, SkippedRecord};
use crate::download::{ArtifactFetcher, FetchError, FetchOutcome, FetchStats, HttpClient};
use crate::provider::{
    ArxivSource, ProviderError, PublishSink, RecordSource, ZoteroPublisher, ZoteroSource,
};
use crate::record::Record;
use crate::store::{RecordRepository, StoreError};

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The store could not be read or written outside a batch persist.
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    /// The artifact stage could not start.
    #[error("artifact stage failed: {0}")]
    Fetch(#[from] FetchError),

    /// A provider adapter could not be constructed.
    #[error("provider setup failed: {0}")]
    Provider(#[from] ProviderError),

    /// The artifact HTTP client could not be constructed.
    #[error("artifact client setup failed: {0}")]
    Download(#[from] crate::download::DownloadError),
}

/// Stage of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Init,
    Snapshot,
    Collect,
    Dedup,
    Persist,
    FetchArtifacts,
    Reconcile,
    Done,
}

impl PipelineStage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Snapshot => "snapshot",
            Self::Collect => "collect",
            Self::Dedup => "dedup",
            Self::Persist => "persist",
            Self::FetchArtifacts => "fetch_artifacts",
            Self::Reconcile => "reconcile",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source that failed during Collect.
#[derive(Debug)]
pub struct SourceFailure {
    pub source: &'static str,
    pub error: ProviderError,
}

/// Counts and details of one run.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Records returned by all sources, before dedup.
    pub total_collected: usize,
    /// Distinct identities among the collected records.
    pub deduplicated: usize,
    /// Newly written records, with their store ids.
    pub stored: Vec<Record>,
    /// How many of `stored` replaced an artifact-less row.
    pub replaced: usize,
    /// Records not written because their identity was already stored.
    pub skipped: Vec<SkippedRecord>,
    /// Stored rows without an artifact that were offered for fetching again.
    pub refetched: usize,
    pub published: usize,
    pub publish_failed: usize,
    pub fetch: FetchStats,
    /// Fetched artifacts recorded in the store.
    pub reconciled: usize,
    pub reconcile_failed: usize,
    /// Records with an artifact that the organizer has not consumed yet.
    pub awaiting_organization: i64,
    pub source_failures: Vec<SourceFailure>,
    /// Set when the batch was rolled back; nothing was stored.
    pub persistence_conflict: Option<StoreError>,
}

impl PipelineReport {
    #[must_use]
    pub fn stored_count(&self) -> usize {
        self.stored.len()
    }

    /// True when every source answered and the batch committed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.source_failures.is_empty() && self.persistence_conflict.is_none()
    }
}

/// Callback notified on every stage transition.
pub type StageObserver = Arc<dyn Fn(PipelineStage) + Send + Sync>;

/// The collection-and-persistence pipeline.
pub struct Pipeline {
    repository: Arc<dyn RecordRepository>,
    sources: Vec<Box<dyn RecordSource>>,
    sink: Option<Arc<dyn PublishSink>>,
    fetcher: ArtifactFetcher,
    force_update: bool,
    refetch_missing_artifacts: bool,
    observer: Option<StageObserver>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("sink", &self.sink.as_ref().map(|s| s.kind()))
            .field("fetcher", &self.fetcher)
            .field("force_update", &self.force_update)
            .field("refetch_missing_artifacts", &self.refetch_missing_artifacts)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline with no sources and no sink.
    #[must_use]
    pub fn new(repository: Arc<dyn RecordRepository>, fetcher: ArtifactFetcher) -> Self {
        Self {
            repository,
            sources: Vec::new(),
            sink: None,
            fetcher,
            force_update: false,
            refetch_missing_artifacts: true,
            observer: None,
        }
    }

    /// Builds sources, sink and fetcher from configuration.
    ///
    /// arXiv is added when enabled; Zotero (read and publish) only when its
    /// credentials are present.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if an adapter or the fetcher cannot be constructed.
    pub fn from_config(
        config: &PipelineConfig,
        repository: Arc<dyn RecordRepository>,
    ) -> Result<Self, PipelineError> {
        let client = HttpClient::with_timeouts(
            config.http.connect_timeout_secs,
            config.http.download_timeout_secs,
        )?;
        let fetcher = ArtifactFetcher::new(
            config.fetch_concurrency,
            &config.artifact_dir,
            Arc::new(client),
        )?;

        let mut pipeline = Self::new(repository, fetcher)
            .force_update(config.force_update)
            .refetch_missing_artifacts(config.refetch_missing_artifacts);

        if config.arxiv.enabled {
            pipeline = pipeline.with_source(Box::new(ArxivSource::new(
                config.arxiv.clone(),
                config.api_timeouts(),
            )?));
        }

        if config.zotero.is_configured() {
            pipeline = pipeline.with_source(Box::new(ZoteroSource::new(
                &config.zotero,
                config.api_timeouts(),
            )?));
            if config.zotero.publish {
                pipeline = pipeline.with_sink(Arc::new(ZoteroPublisher::new(
                    &config.zotero,
                    config.api_timeouts(),
                )?));
            }
        } else if config.zotero.enabled {
            info!("Zotero credentials not configured, skipping Zotero");
        }

        Ok(pipeline)
    }

    /// Appends a source; sources are collected in the order they were added.
    #[must_use]
    pub fn with_source(mut self, source: Box<dyn RecordSource>) -> Self {
        self.sources.push(source);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn PublishSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace stored rows that have no artifact.
    #[must_use]
    pub fn force_update(mut self, force_update: bool) -> Self {
        self.force_update = force_update;
        self
    }

    /// Re-offer stored rows without an artifact for fetching.
    #[must_use]
    pub fn refetch_missing_artifacts(mut self, enabled: bool) -> Self {
        self.refetch_missing_artifacts = enabled;
        self
    }

    /// Registers a callback for stage transitions (e.g. progress display).
    #[must_use]
    pub fn with_stage_observer(mut self, observer: StageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Names of the configured sources, in collection order.
    #[must_use]
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    #[must_use]
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    fn enter(&self, stage: PipelineStage) {
        debug!(stage = %stage, "pipeline stage");
        if let Some(observer) = &self.observer {
            observer(stage);
        }
    }

    /// Runs every stage once.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if the snapshot cannot be taken, or
    /// [`PipelineError::Fetch`] if the artifact directory cannot be prepared.
    #[instrument(skip(self), fields(sources = self.sources.len(), force_update = self.force_update))]
    pub async fn run(&self) -> Result<PipelineReport, PipelineError> {
        let mut report = PipelineReport::default();
        self.enter(PipelineStage::Init);

        self.enter(PipelineStage::Snapshot);
        let snapshot = self.repository.snapshot_existing().await?;
        info!(
            existing = snapshot.len(),
            with_artifact = snapshot.with_artifact(),
            "snapshot taken"
        );

        self.enter(PipelineStage::Collect);
        let batches = self.collect(&mut report).await;
        report.total_collected = batches.iter().map(Vec::len).sum();

        self.enter(PipelineStage::Dedup);
        let unique = dedup::deduplicate(batches);
        report.deduplicated = unique.len();
        info!(
            collected = report.total_collected,
            deduplicated = report.deduplicated,
            "records deduplicated"
        );

        self.enter(PipelineStage::Persist);
        let refetch = match self
            .repository
            .persist(unique, &snapshot, self.force_update)
            .await
        {
            Ok(outcome) => {
                report.stored = outcome.stored;
                report.replaced = outcome.replaced;
                report.skipped = outcome.skipped;
                outcome.refetch
            }
            Err(error) => {
                warn!(
                    kind = ?error.database_kind(),
                    error = %error,
                    "batch rolled back, nothing stored this run"
                );
                report.persistence_conflict = Some(error);
                Vec::new()
            }
        };
        self.publish(&mut report).await;

        self.enter(PipelineStage::FetchArtifacts);
        let candidates = self.fetch_candidates(&report.stored, &refetch).await?;
        report.refetched = candidates.len() - report.stored.len();
        let outcomes = self.fetcher.fetch_all(&candidates).await?;
        report.fetch = FetchStats::from_outcomes(&outcomes);

        self.enter(PipelineStage::Reconcile);
        self.reconcile(&outcomes, &mut report).await;

        self.enter(PipelineStage::Done);
        report.awaiting_organization = match self.repository.count_processed_unorganized().await {
            Ok(count) => count,
            Err(error) => {
                warn!(error = %error, "could not count records awaiting organization");
                0
            }
        };

        info!(
            collected = report.total_collected,
            deduplicated = report.deduplicated,
            stored = report.stored.len(),
            replaced = report.replaced,
            skipped = report.skipped.len(),
            published = report.published,
            publish_failed = report.publish_failed,
            fetched = report.fetch.fetched,
            fetch_failed = report.fetch.failed,
            fetch_skipped = report.fetch.skipped,
            awaiting_organization = report.awaiting_organization,
            source_failures = report.source_failures.len(),
            "pipeline run complete"
        );

        Ok(report)
    }

    async fn collect(&self, report: &mut PipelineReport) -> Vec<Vec<Record>> {
        let mut batches = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match source.fetch().await {
                Ok(records) => {
                    info!(source = source.name(), count = records.len(), "source collected");
                    batches.push(records);
                }
                Err(error) => {
                    warn!(source = source.name(), error = %error, "source failed, continuing without it");
                    report.source_failures.push(SourceFailure {
                        source: source.name(),
                        error,
                    });
                }
            }
        }
        batches
    }

    async fn publish(&self, report: &mut PipelineReport) {
        let Some(sink) = &self.sink else {
            return;
        };

        for record in report
            .stored
            .iter()
            .filter(|record| record.source_kind() != sink.kind())
        {
            match sink.publish(record).await {
                Ok(()) => report.published += 1,
                Err(error) => {
                    warn!(identity = %record.identity, error = %error, "publish failed");
                    report.publish_failed += 1;
                }
            }
        }

        if report.published + report.publish_failed > 0 {
            info!(
                published = report.published,
                failed = report.publish_failed,
                "records published"
            );
        }
    }

    /// Newly stored records first, then stored rows still lacking an artifact.
    ///
    /// `refetch` comes from the snapshot, which checks artifact files on disk,
    /// so a row stays eligible even when `processed` is set but its file is gone.
    async fn fetch_candidates(
        &self,
        stored: &[Record],
        refetch: &[String],
    ) -> Result<Vec<Record>, PipelineError> {
        let mut candidates = stored.to_vec();
        if !self.refetch_missing_artifacts || refetch.is_empty() {
            return Ok(candidates);
        }

        let mut seen: HashSet<String> = candidates.iter().map(|r| r.identity.clone()).collect();
        let pending = self.repository.get_many(refetch).await?;
        for record in pending {
            if seen.insert(record.identity.clone()) {
                candidates.push(record);
            }
        }
        Ok(candidates)
    }

    async fn reconcile(&self, outcomes: &[FetchOutcome], report: &mut PipelineReport) {
        for outcome in outcomes {
            match outcome {
                FetchOutcome::Saved { identity, path, .. } => {
                    match self.repository.mark_artifact(identity, path).await {
                        Ok(()) => report.reconciled += 1,
                        Err(error) => {
                            warn!(identity = %identity, error = %error, "could not record artifact");
                            report.reconcile_failed += 1;
                        }
                    }
                }
                FetchOutcome::Failed { identity, error } => {
                    warn!(identity = %identity, error = %error, "artifact fetch failed");
                }
                FetchOutcome::MissingUrl { .. } | FetchOutcome::NotPersisted { .. } => {}
            }
        }
    }
}
