//! Repository seam for record persistence.
//!
//! The pipeline and maintenance operations depend on this trait rather than on
//! [`Store`] directly, so orchestration can be exercised against a substitute
//! data-access boundary.

use std::path::Path;

use async_trait::async_trait;

use super::{PersistOutcome, Result, Store};
use crate::dedup::ExistingSnapshot;
use crate::record::{Record, SourceKind};

/// Data-access contract for collected records.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Reads stored identities and their artifact presence.
    async fn snapshot_existing(&self) -> Result<ExistingSnapshot>;

    /// Writes a batch in one transaction.
    async fn persist(
        &self,
        records: Vec<Record>,
        snapshot: &ExistingSnapshot,
        force_update: bool,
    ) -> Result<PersistOutcome>;

    /// Records a fetched artifact.
    async fn mark_artifact(&self, identity: &str, path: &Path) -> Result<()>;

    /// Records organizer output.
    async fn mark_organized(&self, identity: &str, metadata: &serde_json::Value) -> Result<()>;

    /// Lists records awaiting organization.
    async fn query_processed_unorganized(&self, source: Option<SourceKind>)
    -> Result<Vec<Record>>;

    /// Counts records awaiting organization.
    async fn count_processed_unorganized(&self) -> Result<i64>;

    /// Reads records by identity, skipping unknown ones.
    async fn get_many(&self, identities: &[String]) -> Result<Vec<Record>>;

    /// Deletes every record.
    async fn reset_all(&self) -> Result<u64>;

    /// Clears artifact state for records whose file vanished.
    async fn sync_artifacts(&self) -> Result<u64>;

    /// Lists every record.
    async fn list_all(&self) -> Result<Vec<Record>>;

    /// Lists the newest records.
    async fn latest(&self, limit: u32) -> Result<Vec<Record>>;
}

#[async_trait]
impl RecordRepository for Store {
    async fn snapshot_existing(&self) -> Result<ExistingSnapshot> {
        Store::snapshot_existing(self).await
    }

    async fn persist(
        &self,
        records: Vec<Record>,
        snapshot: &ExistingSnapshot,
        force_update: bool,
    ) -> Result<PersistOutcome> {
        Store::persist(self, records, snapshot, force_update).await
    }

    async fn mark_artifact(&self, identity: &str, path: &Path) -> Result<()> {
        Store::mark_artifact(self, identity, path).await
    }

    async fn mark_organized(&self, identity: &str, metadata: &serde_json::Value) -> Result<()> {
        Store::mark_organized(self, identity, metadata).await
    }

    async fn query_processed_unorganized(
        &self,
        source: Option<SourceKind>,
    ) -> Result<Vec<Record>> {
        Store::query_processed_unorganized(self, source).await
    }

    async fn count_processed_unorganized(&self) -> Result<i64> {
        Store::count_processed_unorganized(self).await
    }

    async fn get_many(&self, identities: &[String]) -> Result<Vec<Record>> {
        Store::get_many(self, identities).await
    }

    async fn reset_all(&self) -> Result<u64> {
        Store::reset_all(self).await
    }

    async fn sync_artifacts(&self) -> Result<u64> {
        Store::sync_artifacts(self).await
    }

    async fn list_all(&self) -> Result<Vec<Record>> {
        Store::list_all(self).await
    }

    async fn latest(&self, limit: u32) -> Result<Vec<Record>> {
        Store::latest(self, limit).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::record::SourceMetadata;

    async fn awaiting(repo: &impl RecordRepository) -> Result<i64> {
        repo.count_processed_unorganized().await
    }

    #[tokio::test]
    async fn test_record_repository_trait_delegates_record_lifecycle() {
        let store = Store::new(Database::new_in_memory().await.unwrap());
        let temp = tempfile::tempdir().unwrap();
        let artifact = temp.path().join("1.pdf");
        std::fs::write(&artifact, b"%PDF").unwrap();

        let record = Record::collected(
            "Seam Paper",
            vec![],
            SourceMetadata::empty(SourceKind::Zotero),
        );
        let snapshot = RecordRepository::snapshot_existing(&store).await.unwrap();
        let outcome = RecordRepository::persist(&store, vec![record], &snapshot, false)
            .await
            .unwrap();
        assert_eq!(outcome.stored.len(), 1);

        RecordRepository::mark_artifact(&store, "seam paper", &artifact)
            .await
            .unwrap();
        assert_eq!(awaiting(&store).await.unwrap(), 1);

        let pending = RecordRepository::query_processed_unorganized(&store, Some(SourceKind::Zotero))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        RecordRepository::mark_organized(&store, "seam paper", &serde_json::json!({"note": "n.md"}))
            .await
            .unwrap();
        assert_eq!(awaiting(&store).await.unwrap(), 0);
    }
}
