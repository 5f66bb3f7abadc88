//! Store module for deduplicated paper persistence.
//!
//! Every collected [`Record`] lives in the `papers` table keyed by its
//! normalized identity. Writes from a pipeline run go through [`Store::persist`],
//! which executes a [`PersistPlan`](crate::dedup::PersistPlan) inside a single
//! transaction: either the whole batch lands or none of it does.
//!
//! After persistence, state only changes through explicit patch operations:
//! [`Store::mark_artifact`] once a PDF was fetched and [`Store::mark_organized`]
//! once the downstream organizer consumed the record.
//!
//! # Example
//!
//! ```ignore
//! use collector_core::{Database, Store};
//! use std::path::Path;
//!
//! let db = Database::new(Path::new("papers.db")).await?;
//! let store = Store::new(db);
//!
//! let snapshot = store.snapshot_existing().await?;
//! let outcome = store.persist(records, &snapshot, false).await?;
//! for record in &outcome.stored {
//!     // ... fetch the artifact ...
//!     store.mark_artifact(&record.identity, &path).await?;
//! }
//! ```

mod error;
mod repository;
mod row;

pub use error::{StoreDbErrorKind, StoreError};
pub use repository::RecordRepository;

use std::path::Path;

use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, info, instrument, warn};

use crate::db::Database;
use crate::dedup::{self, ExistingEntry, ExistingSnapshot, PersistAction, SkippedRecord};
use crate::record::{Record, SourceKind, normalize_identity};
use row::{PaperRow, encode_authors, encode_timestamp};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Returns `Ok(())` if at least one row was affected; otherwise [`StoreError::NotFound`].
fn check_affected(identity: &str, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(StoreError::NotFound(identity.to_string()))
    } else {
        Ok(())
    }
}

/// What a batch persist did.
#[derive(Debug, Clone, Default)]
pub struct PersistOutcome {
    /// Newly written records, carrying their assigned ids, in plan order.
    pub stored: Vec<Record>,
    /// How many of `stored` replaced an artifact-less row.
    pub replaced: usize,
    /// Records not written because their identity is already stored.
    pub skipped: Vec<SkippedRecord>,
    /// Stored identities without an artifact that should be fetched again.
    pub refetch: Vec<String>,
}

/// SQLite-backed record store.
#[derive(Debug, Clone)]
pub struct Store {
    db: Database,
}

impl Store {
    /// Creates a store over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the underlying database handle.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Reads every stored identity along with whether its artifact is present.
    ///
    /// An artifact counts as present only when a path is recorded **and** the
    /// file exists on disk.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn snapshot_existing(&self) -> Result<ExistingSnapshot> {
        let rows = sqlx::query("SELECT identity, artifact_path, processed FROM papers")
            .fetch_all(self.db.pool())
            .await?;

        let mut snapshot = ExistingSnapshot::new();
        for row in rows {
            let identity: String = row.get("identity");
            let artifact_path: Option<String> = row.get("artifact_path");
            let processed: bool = row.get("processed");
            let has_artifact = match artifact_path.as_deref() {
                Some(path) if !path.is_empty() => artifact_exists(path).await,
                _ => false,
            };
            snapshot.insert(
                identity,
                ExistingEntry {
                    has_artifact,
                    processed,
                },
            );
        }

        debug!(
            existing = snapshot.len(),
            with_artifact = snapshot.with_artifact(),
            "store snapshot taken"
        );
        Ok(snapshot)
    }

    /// Deduplicates `records`, resolves them against `snapshot` and writes the
    /// result in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PersistenceConflict`] if any statement or the commit
    /// fails. The transaction is rolled back and nothing from the batch is stored.
    #[instrument(skip(self, records, snapshot), fields(records = records.len(), force_update))]
    pub async fn persist(
        &self,
        records: Vec<Record>,
        snapshot: &ExistingSnapshot,
        force_update: bool,
    ) -> Result<PersistOutcome> {
        let plan = dedup::plan(std::iter::once(records), snapshot, force_update);
        let replaced = plan.replacements();

        if plan.actions.is_empty() {
            return Ok(PersistOutcome {
                stored: Vec::new(),
                replaced: 0,
                skipped: plan.skipped,
                refetch: plan.refetch,
            });
        }

        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| StoreError::conflict(&e))?;

        let stored = match apply_actions(&mut tx, plan.actions).await {
            Ok(stored) => stored,
            Err(error) => {
                warn!(error = %error, "persist failed, rolling back batch");
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(error = %rollback_error, "rollback failed");
                }
                return Err(StoreError::conflict(&error));
            }
        };

        tx.commit().await.map_err(|e| {
            warn!(error = %e, "persist commit failed");
            StoreError::conflict(&e)
        })?;

        info!(
            stored = stored.len(),
            replaced,
            skipped = plan.skipped.len(),
            "batch persisted"
        );

        Ok(PersistOutcome {
            stored,
            replaced,
            skipped: plan.skipped,
            refetch: plan.refetch,
        })
    }

    /// Records a fetched artifact and flags the record processed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no record has this identity.
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn mark_artifact(&self, identity: &str, path: &Path) -> Result<()> {
        let identity = normalize_identity(identity);
        let result = sqlx::query(
            r"UPDATE papers
              SET artifact_path = ?, processed = 1,
                  updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
              WHERE identity = ?",
        )
        .bind(path.to_string_lossy().into_owned())
        .bind(&identity)
        .execute(self.db.pool())
        .await?;

        check_affected(&identity, result.rows_affected())
    }

    /// Flags a record organized and stores the organizer's provenance blob.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no record has this identity.
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self, organized_metadata))]
    pub async fn mark_organized(
        &self,
        identity: &str,
        organized_metadata: &serde_json::Value,
    ) -> Result<()> {
        let identity = normalize_identity(identity);
        let result = sqlx::query(
            r"UPDATE papers
              SET organized = 1, organized_metadata = ?,
                  updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
              WHERE identity = ?",
        )
        .bind(organized_metadata.to_string())
        .bind(&identity)
        .execute(self.db.pool())
        .await?;

        check_affected(&identity, result.rows_affected())
    }

    /// Lists records that have an artifact but were not organized yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn query_processed_unorganized(
        &self,
        source: Option<SourceKind>,
    ) -> Result<Vec<Record>> {
        let rows = match source {
            Some(kind) => {
                sqlx::query_as::<_, PaperRow>(
                    r"SELECT * FROM papers
                      WHERE processed = 1 AND organized = 0 AND source = ?
                      ORDER BY id ASC",
                )
                .bind(kind.as_str())
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, PaperRow>(
                    r"SELECT * FROM papers
                      WHERE processed = 1 AND organized = 0
                      ORDER BY id ASC",
                )
                .fetch_all(self.db.pool())
                .await?
            }
        };

        into_records(rows)
    }

    /// Counts records awaiting organization.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_processed_unorganized(&self) -> Result<i64> {
        let row = sqlx::query(
            r"SELECT COUNT(*) AS count FROM papers WHERE processed = 1 AND organized = 0",
        )
        .fetch_one(self.db.pool())
        .await?;

        Ok(row.get("count"))
    }

    /// Deletes every record.
    ///
    /// # Returns
    ///
    /// The number of records removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn reset_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM papers")
            .execute(self.db.pool())
            .await?;

        info!(removed = result.rows_affected(), "store reset");
        Ok(result.rows_affected())
    }

    /// Clears artifact state for records whose file no longer exists.
    ///
    /// # Returns
    ///
    /// The number of records reset to unprocessed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a query fails.
    #[instrument(skip(self))]
    pub async fn sync_artifacts(&self) -> Result<u64> {
        let rows = sqlx::query(
            r"SELECT identity, artifact_path FROM papers
              WHERE processed = 1 OR artifact_path IS NOT NULL",
        )
        .fetch_all(self.db.pool())
        .await?;

        let mut reset = 0_u64;
        for row in rows {
            let identity: String = row.get("identity");
            let artifact_path: Option<String> = row.get("artifact_path");
            let present = match artifact_path.as_deref() {
                Some(path) if !path.is_empty() => artifact_exists(path).await,
                _ => false,
            };
            if present {
                continue;
            }

            debug!(identity = %identity, path = ?artifact_path, "artifact missing, clearing");
            let result = sqlx::query(
                r"UPDATE papers
                  SET processed = 0, artifact_path = NULL,
                      updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
                  WHERE identity = ?",
            )
            .bind(&identity)
            .execute(self.db.pool())
            .await?;
            reset += result.rows_affected();
        }

        info!(reset, "artifact state synchronized");
        Ok(reset)
    }

    /// Gets a record by identity (the raw title is normalized first).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, identity: &str) -> Result<Option<Record>> {
        let row = sqlx::query_as::<_, PaperRow>("SELECT * FROM papers WHERE identity = ?")
            .bind(normalize_identity(identity))
            .fetch_optional(self.db.pool())
            .await?;

        row.map(Record::try_from).transpose()
    }

    /// Gets the records for several identities, in the given order, skipping unknown ones.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a query fails.
    #[instrument(skip(self, identities), fields(requested = identities.len()))]
    pub async fn get_many(&self, identities: &[String]) -> Result<Vec<Record>> {
        let mut records = Vec::with_capacity(identities.len());
        for identity in identities {
            if let Some(record) = self.get(identity).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Lists every record in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<Record>> {
        let rows = sqlx::query_as::<_, PaperRow>("SELECT * FROM papers ORDER BY id ASC")
            .fetch_all(self.db.pool())
            .await?;

        into_records(rows)
    }

    /// Lists the most recently added records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn latest(&self, limit: u32) -> Result<Vec<Record>> {
        let rows = sqlx::query_as::<_, PaperRow>(
            "SELECT * FROM papers ORDER BY added_at DESC, id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;

        into_records(rows)
    }

    /// Counts all records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM papers")
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.get("count"))
    }
}

async fn artifact_exists(path: &str) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn into_records(rows: Vec<PaperRow>) -> Result<Vec<Record>> {
    rows.into_iter().map(Record::try_from).collect()
}

/// Executes the plan's writes in order on an open transaction.
async fn apply_actions(
    tx: &mut Transaction<'_, Sqlite>,
    actions: Vec<PersistAction>,
) -> std::result::Result<Vec<Record>, sqlx::Error> {
    let mut stored = Vec::with_capacity(actions.len());

    for action in actions {
        if let PersistAction::Replace(record) = &action {
            sqlx::query("DELETE FROM papers WHERE identity = ?")
                .bind(&record.identity)
                .execute(&mut **tx)
                .await?;
        }

        let mut record = action.into_record();
        let row = sqlx::query(
            r"INSERT INTO papers (
                identity,
                title,
                authors,
                abstract,
                url,
                doi,
                journal,
                publication_date,
                source,
                source_metadata
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
              RETURNING id, added_at",
        )
        .bind(&record.identity)
        .bind(&record.title)
        .bind(encode_authors(&record.authors))
        .bind(&record.abstract_text)
        .bind(&record.url)
        .bind(&record.doi)
        .bind(&record.journal)
        .bind(encode_timestamp(&record.publication_date))
        .bind(record.source_kind().as_str())
        .bind(record.source_metadata.to_stored())
        .fetch_one(&mut **tx)
        .await?;

        record.id = Some(row.get("id"));
        let added_at: String = row.get("added_at");
        record.added_at = chrono::DateTime::parse_from_rfc3339(&added_at)
            .ok()
            .map(|t| t.with_timezone(&chrono::Utc));
        record.artifact_path = None;
        record.processed = false;
        record.organized = false;
        stored.push(record);
    }

    Ok(stored)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::SourceMetadata;

    fn record(title: &str) -> Record {
        Record::collected(title, vec![], SourceMetadata::empty(SourceKind::Arxiv))
    }

    /// Regression: patch operations report NotFound when no row matches.
    #[tokio::test]
    async fn test_mark_artifact_returns_not_found_for_missing_identity() {
        let store = Store::new(Database::new_in_memory().await.unwrap());

        let result = store
            .mark_artifact("never stored", Path::new("/tmp/x.pdf"))
            .await;
        assert!(
            matches!(&result, Err(StoreError::NotFound(identity)) if identity == "never stored"),
            "expected NotFound, got {result:?}"
        );
    }

    #[tokio::test]
    async fn test_persist_assigns_ids_and_timestamps() {
        let store = Store::new(Database::new_in_memory().await.unwrap());

        let outcome = store
            .persist(
                vec![record("First"), record("Second")],
                &ExistingSnapshot::new(),
                false,
            )
            .await
            .unwrap();

        assert_eq!(outcome.stored.len(), 2);
        assert!(outcome.stored.iter().all(|r| r.id.is_some()));
        assert!(outcome.stored.iter().all(|r| r.added_at.is_some()));
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_persist_deduplicates_within_the_batch() {
        let store = Store::new(Database::new_in_memory().await.unwrap());

        let outcome = store
            .persist(
                vec![record("Same Title"), record("same   title")],
                &ExistingSnapshot::new(),
                false,
            )
            .await
            .unwrap();

        assert_eq!(outcome.stored.len(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_normalizes_lookup_key() {
        let store = Store::new(Database::new_in_memory().await.unwrap());
        store
            .persist(vec![record("Graph Nets")], &ExistingSnapshot::new(), false)
            .await
            .unwrap();

        let found = store.get("  GRAPH   nets ").await.unwrap();
        assert_eq!(found.unwrap().title, "Graph Nets");
    }
}
