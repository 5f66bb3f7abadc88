//! Operator maintenance: reset, artifact sync, export and inspection.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, instrument};

use crate::record::Record;
use crate::store::{RecordRepository, StoreError};

/// Default number of records shown by [`latest`].
pub const DEFAULT_VIEW_LIMIT: u32 = 10;

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode export: {0}")]
    Encode(#[from] serde_json::Error),
}

impl MaintenanceError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What a reset removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSummary {
    pub records_removed: u64,
    /// True when an existing artifact directory was cleared.
    pub artifacts_cleared: bool,
}

/// Deletes every artifact and every record, leaving an empty artifact directory.
///
/// # Errors
///
/// Returns [`MaintenanceError::Io`] if the directory cannot be removed or
/// recreated, or [`MaintenanceError::Store`] if the bulk delete fails.
#[instrument(skip(repository), fields(artifact_dir = %artifact_dir.display()))]
pub async fn reset(
    repository: &dyn RecordRepository,
    artifact_dir: &Path,
) -> Result<ResetSummary, MaintenanceError> {
    let artifacts_cleared = tokio::fs::try_exists(artifact_dir)
        .await
        .map_err(|e| MaintenanceError::io(artifact_dir, e))?;
    if artifacts_cleared {
        tokio::fs::remove_dir_all(artifact_dir)
            .await
            .map_err(|e| MaintenanceError::io(artifact_dir, e))?;
    }
    tokio::fs::create_dir_all(artifact_dir)
        .await
        .map_err(|e| MaintenanceError::io(artifact_dir, e))?;

    let records_removed = repository.reset_all().await?;
    info!(records_removed, artifacts_cleared, "store reset");

    Ok(ResetSummary {
        records_removed,
        artifacts_cleared,
    })
}

/// Clears artifact state for records whose file no longer exists.
///
/// # Errors
///
/// Returns [`MaintenanceError::Store`] on database failure.
pub async fn sync(repository: &dyn RecordRepository) -> Result<u64, MaintenanceError> {
    let cleared = repository.sync_artifacts().await?;
    info!(cleared, "artifact state synced");
    Ok(cleared)
}

/// Writes every record as a pretty-printed JSON array to `path`.
///
/// Returns the number of records exported.
///
/// # Errors
///
/// Returns [`MaintenanceError`] if reading, encoding or writing fails.
#[instrument(skip(repository), fields(path = %path.display()))]
pub async fn export_json(
    repository: &dyn RecordRepository,
    path: &Path,
) -> Result<usize, MaintenanceError> {
    let records = repository.list_all().await?;
    let encoded = serde_json::to_vec_pretty(&records)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| MaintenanceError::io(parent, e))?;
    }
    tokio::fs::write(path, encoded)
        .await
        .map_err(|e| MaintenanceError::io(path, e))?;

    info!(count = records.len(), "records exported");
    Ok(records.len())
}

/// One line of the `--view` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordStatus {
    pub title: String,
    pub authors: String,
    pub source: String,
    /// Artifact recorded and present on disk.
    pub has_artifact: bool,
    pub organized: bool,
}

/// The newest `limit` records together with the total record count.
///
/// # Errors
///
/// Returns [`MaintenanceError::Store`] on database failure.
pub async fn latest(
    repository: &dyn RecordRepository,
    limit: u32,
) -> Result<(usize, Vec<RecordStatus>), MaintenanceError> {
    let total = repository.list_all().await?.len();
    let mut statuses = Vec::new();
    for record in repository.latest(limit).await? {
        statuses.push(status_of(&record).await);
    }
    Ok((total, statuses))
}

async fn status_of(record: &Record) -> RecordStatus {
    let has_artifact = match record.artifact_path.as_deref() {
        Some(path) if !path.is_empty() => tokio::fs::try_exists(path).await.unwrap_or(false),
        _ => false,
    };
    RecordStatus {
        title: record.title.clone(),
        authors: record.authors.join(", "),
        source: record.source_kind().to_string(),
        has_artifact,
        organized: record.organized,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dedup::ExistingSnapshot;
    use crate::db::Database;
    use crate::record::{SourceKind, SourceMetadata};
    use crate::store::Store;

    async fn seeded_store(titles: &[&str]) -> Store {
        let store = Store::new(Database::new_in_memory().await.unwrap());
        let records = titles
            .iter()
            .map(|t| Record::collected(t, Vec::new(), SourceMetadata::empty(SourceKind::Arxiv)))
            .collect();
        store
            .persist(records, &ExistingSnapshot::new(), false)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_reset_clears_records_and_artifacts() {
        let titles: Vec<String> = (0..10).map(|n| format!("Paper {n}")).collect();
        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        let store = seeded_store(&refs).await;
        let dir = tempfile::tempdir().unwrap();
        let artifacts = dir.path().join("pdf");
        std::fs::create_dir_all(&artifacts).unwrap();
        std::fs::write(artifacts.join("1.pdf"), b"x").unwrap();

        let summary = reset(&store, &artifacts).await.unwrap();
        assert_eq!(summary.records_removed, 10);
        assert!(summary.artifacts_cleared);
        assert!(artifacts.is_dir());
        assert_eq!(std::fs::read_dir(&artifacts).unwrap().count(), 0);

        let again = reset(&store, &artifacts).await.unwrap();
        assert_eq!(again.records_removed, 0);
    }

    #[tokio::test]
    async fn test_sync_clears_vanished_artifacts() {
        let store = seeded_store(&["Gone"]).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.pdf");
        std::fs::write(&path, b"x").unwrap();
        store.mark_artifact("gone", &path).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(sync(&store).await.unwrap(), 1);
        let record = store.get("gone").await.unwrap().unwrap();
        assert!(!record.processed);
        assert!(record.artifact_path.is_none());
        assert_eq!(sync(&store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_export_writes_json_array() {
        let store = seeded_store(&["One", "Two"]).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("papers.json");

        assert_eq!(export_json(&store, &path).await.unwrap(), 2);

        let exported: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let array = exported.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["title"], "One");
        assert!(array[0].get("abstract").is_some());
    }

    #[tokio::test]
    async fn test_latest_reports_status() {
        let store = seeded_store(&["First", "Second", "Third"]).await;
        let (total, statuses) = latest(&store, 2).await.unwrap();

        assert_eq!(total, 3);
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|s| !s.has_artifact && !s.organized));
        assert_eq!(statuses[0].authors, "Unknown Author");
    }
}
