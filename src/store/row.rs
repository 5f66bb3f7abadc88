//! Row mapping between the `papers` table and [`Record`].

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::warn;

use super::StoreError;
use crate::record::{Record, SourceKind, SourceMetadata, finalize_authors, try_parse_publication_date};

/// A raw `papers` row.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct PaperRow {
    pub id: i64,
    pub identity: String,
    pub title: String,
    pub authors: String,
    #[sqlx(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub url: Option<String>,
    pub doi: Option<String>,
    pub journal: Option<String>,
    pub publication_date: String,
    pub source: String,
    pub source_metadata: String,
    pub artifact_path: Option<String>,
    pub processed: bool,
    pub organized: bool,
    pub organized_metadata: Option<String>,
    pub added_at: String,
}

impl TryFrom<PaperRow> for Record {
    type Error = StoreError;

    fn try_from(row: PaperRow) -> Result<Self, Self::Error> {
        let source: SourceKind = row.source.parse().map_err(|reason| StoreError::InvalidRow {
            identity: row.identity.clone(),
            reason,
        })?;

        let authors = match serde_json::from_str::<Vec<String>>(&row.authors) {
            Ok(authors) => authors,
            Err(_) => vec![row.authors.clone()],
        };

        let publication_date = try_parse_publication_date(&row.publication_date)
            .unwrap_or_else(|| {
                warn!(identity = %row.identity, raw = %row.publication_date, "unparseable stored publication date");
                Utc::now()
            });

        let organized_metadata = row
            .organized_metadata
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());

        Ok(Self {
            id: Some(row.id),
            source_metadata: SourceMetadata::from_stored(source, &row.source_metadata),
            identity: row.identity,
            title: row.title,
            authors: finalize_authors(authors),
            abstract_text: row.abstract_text,
            url: row.url,
            doi: row.doi,
            journal: row.journal,
            publication_date,
            artifact_path: row.artifact_path,
            processed: row.processed,
            organized: row.organized,
            organized_metadata,
            added_at: DateTime::parse_from_rfc3339(&row.added_at)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        })
    }
}

/// Encodes a timestamp the way the schema stores it.
pub(crate) fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Encodes the author list as a JSON array.
pub(crate) fn encode_authors(authors: &[String]) -> String {
    serde_json::to_string(authors).unwrap_or_else(|_| "[]".to_string())
}
