//! The canonical record collected from every provider.
//!
//! A [`Record`] is a plain value: adapters build it, the store persists it and
//! hands back copies carrying the assigned id. State changes after persistence
//! (artifact fetched, record organized) go through explicit store patch
//! operations rather than by mutating a shared object.

mod fields;
mod metadata;

pub use fields::{
    UNKNOWN_AUTHOR, author_from_parts, collapse_whitespace, finalize_authors, normalize_identity,
    parse_publication_date, try_parse_publication_date,
};
pub use metadata::{ArxivMetadata, SourceKind, SourceMetadata, ZoteroMetadata};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A bibliographic record and its persistence state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Store-assigned id; `None` until persisted.
    pub id: Option<i64>,
    /// Normalized title, the natural key.
    pub identity: String,
    /// Display title as received (whitespace collapsed).
    pub title: String,
    /// Ordered author display names; never empty.
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub url: Option<String>,
    pub doi: Option<String>,
    pub journal: Option<String>,
    /// Publication date, or collection time when the source gave none.
    pub publication_date: DateTime<Utc>,
    /// Provenance and its source-specific fields.
    pub source_metadata: SourceMetadata,
    /// Local path of the fetched artifact.
    pub artifact_path: Option<String>,
    /// True once the artifact was fetched and recorded.
    pub processed: bool,
    /// True once the organization step consumed the record.
    pub organized: bool,
    /// Opaque provenance written by the organization step.
    pub organized_metadata: Option<serde_json::Value>,
    /// When the record was inserted.
    pub added_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Creates a freshly collected record.
    ///
    /// The identity is derived from `title`, an empty author list becomes
    /// [`UNKNOWN_AUTHOR`], and the publication date defaults to now until
    /// [`with_publication_date`](Self::with_publication_date) says otherwise.
    #[must_use]
    pub fn collected(title: &str, authors: Vec<String>, source_metadata: SourceMetadata) -> Self {
        Self {
            id: None,
            identity: normalize_identity(title),
            title: collapse_whitespace(title),
            authors: finalize_authors(authors),
            abstract_text: None,
            url: None,
            doi: None,
            journal: None,
            publication_date: Utc::now(),
            source_metadata,
            artifact_path: None,
            processed: false,
            organized: false,
            organized_metadata: None,
            added_at: None,
        }
    }

    #[must_use]
    pub fn with_abstract(mut self, abstract_text: Option<String>) -> Self {
        self.abstract_text = non_blank(abstract_text.map(|text| collapse_whitespace(&text)));
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = non_blank(url.map(|u| u.trim().to_string()));
        self
    }

    #[must_use]
    pub fn with_doi(mut self, doi: Option<String>) -> Self {
        self.doi = non_blank(doi.map(|d| d.trim().to_string()));
        self
    }

    #[must_use]
    pub fn with_journal(mut self, journal: Option<String>) -> Self {
        self.journal = non_blank(journal.map(|j| collapse_whitespace(&j)));
        self
    }

    /// Sets the publication date from raw source text, falling back to now.
    #[must_use]
    pub fn with_publication_date(mut self, raw: Option<&str>) -> Self {
        self.publication_date = parse_publication_date(raw);
        self
    }

    /// Returns the provenance of this record.
    #[must_use]
    pub fn source_kind(&self) -> SourceKind {
        self.source_metadata.kind()
    }

    /// Returns the URL to fetch the artifact from, if there is a usable one.
    #[must_use]
    pub fn artifact_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|url| !url.trim().is_empty())
    }

    /// Returns true when an artifact path has been recorded.
    #[must_use]
    pub fn has_artifact_path(&self) -> bool {
        self.artifact_path
            .as_deref()
            .is_some_and(|path| !path.is_empty())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "#{id} [{}] {}", self.source_kind(), self.title),
            None => write!(f, "[{}] {}", self.source_kind(), self.title),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn arxiv_meta() -> SourceMetadata {
        SourceMetadata::empty(SourceKind::Arxiv)
    }

    #[test]
    fn test_collected_record_starts_unfetched() {
        let record = Record::collected("  Deep   Learning ", vec![], arxiv_meta());
        assert_eq!(record.identity, "deep learning");
        assert_eq!(record.title, "Deep Learning");
        assert_eq!(record.authors, vec![UNKNOWN_AUTHOR.to_string()]);
        assert!(record.id.is_none());
        assert!(!record.processed);
        assert!(!record.organized);
        assert!(!record.has_artifact_path());
        assert_eq!(record.source_kind(), SourceKind::Arxiv);
    }

    #[test]
    fn test_builders_drop_blank_values() {
        let record = Record::collected("T", vec!["A".to_string()], arxiv_meta())
            .with_url(Some("   ".to_string()))
            .with_doi(Some("10.1/x".to_string()))
            .with_abstract(Some("line one\n  line two".to_string()))
            .with_journal(None);

        assert!(record.url.is_none());
        assert!(record.artifact_url().is_none());
        assert_eq!(record.doi.as_deref(), Some("10.1/x"));
        assert_eq!(record.abstract_text.as_deref(), Some("line one line two"));
        assert!(record.journal.is_none());
    }

    #[test]
    fn test_display_includes_source_and_id() {
        let mut record = Record::collected("Graph Nets", vec![], arxiv_meta());
        assert_eq!(record.to_string(), "[arxiv] Graph Nets");
        record.id = Some(7);
        assert_eq!(record.to_string(), "#7 [arxiv] Graph Nets");
    }

    #[test]
    fn test_serialize_uses_abstract_key() {
        let record = Record::collected("T", vec![], arxiv_meta())
            .with_abstract(Some("summary".to_string()));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["abstract"], "summary");
        assert_eq!(value["source_metadata"]["source"], "arxiv");
    }
}
