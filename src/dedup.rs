//! Intra-batch and against-store deduplication.
//!
//! Everything here is pure: the store supplies an [`ExistingSnapshot`], these
//! functions decide what to insert, replace or skip, and the store executes the
//! resulting [`PersistPlan`] inside one transaction.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::record::{Record, SourceKind};

/// What the store already knows about one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExistingEntry {
    /// An artifact path is recorded and the file exists on disk.
    pub has_artifact: bool,
    /// The row is flagged processed.
    pub processed: bool,
}

/// Identities present in the store at the start of a run.
#[derive(Debug, Clone, Default)]
pub struct ExistingSnapshot {
    entries: HashMap<String, ExistingEntry>,
}

impl ExistingSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: impl Into<String>, entry: ExistingEntry) {
        self.entries.insert(identity.into(), entry);
    }

    #[must_use]
    pub fn get(&self, identity: &str) -> Option<ExistingEntry> {
        self.entries.get(identity).copied()
    }

    #[must_use]
    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of stored identities whose artifact is present.
    #[must_use]
    pub fn with_artifact(&self) -> usize {
        self.entries.values().filter(|e| e.has_artifact).count()
    }
}

impl FromIterator<(String, ExistingEntry)> for ExistingSnapshot {
    fn from_iter<T: IntoIterator<Item = (String, ExistingEntry)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// A write the store must perform.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistAction {
    /// New identity.
    Insert(Record),
    /// Delete the artifact-less row with the same identity, then insert.
    Replace(Record),
}

impl PersistAction {
    #[must_use]
    pub fn record(&self) -> &Record {
        match self {
            Self::Insert(record) | Self::Replace(record) => record,
        }
    }

    #[must_use]
    pub fn into_record(self) -> Record {
        match self {
            Self::Insert(record) | Self::Replace(record) => record,
        }
    }

    #[must_use]
    pub fn is_replace(&self) -> bool {
        matches!(self, Self::Replace(_))
    }
}

/// Why a collected record was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The stored row already has its artifact.
    DuplicateWithArtifact,
    /// The stored row has no artifact and force-update is off.
    ExistingWithoutArtifact,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateWithArtifact => write!(f, "duplicate_with_artifact"),
            Self::ExistingWithoutArtifact => write!(f, "existing_without_artifact"),
        }
    }
}

/// A collected record dropped against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub identity: String,
    pub title: String,
    pub source: SourceKind,
    pub reason: SkipReason,
}

/// The outcome of deduplication, ready for the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistPlan {
    /// Writes in plan order.
    pub actions: Vec<PersistAction>,
    /// Records dropped because their identity is already stored.
    pub skipped: Vec<SkippedRecord>,
    /// Stored identities without an artifact, to be offered for fetching again.
    pub refetch: Vec<String>,
}

impl PersistPlan {
    #[must_use]
    pub fn inserts(&self) -> usize {
        self.actions.iter().filter(|a| !a.is_replace()).count()
    }

    #[must_use]
    pub fn replacements(&self) -> usize {
        self.actions.iter().filter(|a| a.is_replace()).count()
    }
}

/// Merges batches in source order, keeping the first record seen for each identity.
#[must_use]
pub fn deduplicate<I>(batches: I) -> Vec<Record>
where
    I: IntoIterator<Item = Vec<Record>>,
{
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for record in batches.into_iter().flatten() {
        if seen.insert(record.identity.clone()) {
            unique.push(record);
        } else {
            debug!(
                identity = %record.identity,
                source = %record.source_kind(),
                "dropping in-batch duplicate"
            );
        }
    }

    unique
}

/// Decides insert, replace or skip for each record against the store snapshot.
///
/// Expects records that are already unique by identity (see [`deduplicate`]).
#[must_use]
pub fn resolve_against_store(
    records: Vec<Record>,
    snapshot: &ExistingSnapshot,
    force_update: bool,
) -> PersistPlan {
    let mut plan = PersistPlan::default();

    for record in records {
        let Some(existing) = snapshot.get(&record.identity) else {
            plan.actions.push(PersistAction::Insert(record));
            continue;
        };

        if !existing.has_artifact && force_update {
            debug!(identity = %record.identity, "replacing stored row without artifact");
            plan.actions.push(PersistAction::Replace(record));
            continue;
        }

        let reason = if existing.has_artifact {
            SkipReason::DuplicateWithArtifact
        } else {
            plan.refetch.push(record.identity.clone());
            SkipReason::ExistingWithoutArtifact
        };

        info!(
            identity = %record.identity,
            source = %record.source_kind(),
            reason = %reason,
            "skipping record already in store"
        );

        plan.skipped.push(SkippedRecord {
            identity: record.identity,
            title: record.title,
            source: record.source_metadata.kind(),
            reason,
        });
    }

    plan
}

/// Intra-batch dedup followed by resolution against the store.
#[must_use]
pub fn plan<I>(batches: I, snapshot: &ExistingSnapshot, force_update: bool) -> PersistPlan
where
    I: IntoIterator<Item = Vec<Record>>,
{
    resolve_against_store(deduplicate(batches), snapshot, force_update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SourceMetadata;

    fn record(title: &str, kind: SourceKind) -> Record {
        Record::collected(title, vec!["A".to_string()], SourceMetadata::empty(kind))
    }

    fn snapshot(entries: &[(&str, bool)]) -> ExistingSnapshot {
        entries
            .iter()
            .map(|(identity, has_artifact)| {
                (
                    (*identity).to_string(),
                    ExistingEntry {
                        has_artifact: *has_artifact,
                        processed: *has_artifact,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_deduplicate_keeps_first_occurrence_across_sources() {
        let arxiv = vec![record("X", SourceKind::Arxiv), record("Y", SourceKind::Arxiv)];
        let zotero = vec![record("x", SourceKind::Zotero), record("Z", SourceKind::Zotero)];

        let unique = deduplicate(vec![arxiv, zotero]);

        let identities: Vec<&str> = unique.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(identities, vec!["x", "y", "z"]);
        assert_eq!(unique[0].source_kind(), SourceKind::Arxiv);
    }

    #[test]
    fn test_deduplicate_within_single_batch() {
        let batch = vec![
            record("Graph  Nets", SourceKind::Arxiv),
            record("graph nets", SourceKind::Arxiv),
        ];
        assert_eq!(deduplicate(vec![batch]).len(), 1);
    }

    #[test]
    fn test_resolve_inserts_unknown_identities() {
        let plan = resolve_against_store(
            vec![record("New", SourceKind::Arxiv)],
            &ExistingSnapshot::new(),
            false,
        );
        assert_eq!(plan.inserts(), 1);
        assert!(plan.skipped.is_empty());
        assert!(plan.refetch.is_empty());
    }

    #[test]
    fn test_resolve_skips_existing_with_artifact_even_when_forced() {
        let plan = resolve_against_store(
            vec![record("X", SourceKind::Zotero)],
            &snapshot(&[("x", true)]),
            true,
        );
        assert!(plan.actions.is_empty());
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].reason, SkipReason::DuplicateWithArtifact);
        assert!(plan.refetch.is_empty());
    }

    #[test]
    fn test_resolve_replaces_artifactless_row_when_forced() {
        let plan = resolve_against_store(
            vec![record("X", SourceKind::Arxiv)],
            &snapshot(&[("x", false)]),
            true,
        );
        assert_eq!(plan.replacements(), 1);
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_resolve_offers_artifactless_row_for_refetch_without_force() {
        let plan = resolve_against_store(
            vec![record("X", SourceKind::Arxiv)],
            &snapshot(&[("x", false)]),
            false,
        );
        assert!(plan.actions.is_empty());
        assert_eq!(plan.skipped[0].reason, SkipReason::ExistingWithoutArtifact);
        assert_eq!(plan.refetch, vec!["x".to_string()]);
    }

    #[test]
    fn test_plan_is_idempotent_once_everything_is_stored() {
        let batches = || vec![vec![record("A", SourceKind::Arxiv), record("B", SourceKind::Arxiv)]];

        let first = plan(batches(), &ExistingSnapshot::new(), false);
        assert_eq!(first.inserts(), 2);

        let stored = snapshot(&[("a", false), ("b", true)]);
        let second = plan(batches(), &stored, false);
        assert!(second.actions.is_empty());
        assert_eq!(second.skipped.len(), 2);
    }
}
