//! arXiv search adapter.
//!
//! Pages through the arXiv Atom API once per configured query term. Requests are
//! strictly sequential and spaced by `request_delay_ms`, as arXiv asks clients
//! to wait at least three seconds between calls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::http_client::{HttpTimeouts, build_api_client};
use super::{ProviderError, RecordSource};
use crate::config::ArxivConfig;
use crate::record::{ArxivMetadata, Record, SourceKind, SourceMetadata};

const SOURCE_NAME: &str = "arxiv";

/// Marker in the id of the pseudo-entry arXiv returns for a rejected query.
const API_ERROR_ID_MARKER: &str = "/api/errors";

const DOI_URL_PREFIXES: [&str; 4] = [
    "http://dx.doi.org/",
    "https://dx.doi.org/",
    "http://doi.org/",
    "https://doi.org/",
];

// ==================== Atom feed types ====================

#[derive(Debug, Deserialize)]
pub(crate) struct AtomFeed {
    #[serde(rename = "entry", default)]
    pub entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AtomEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub summary: Option<String>,
    pub published: Option<String>,
    #[serde(rename = "author", default)]
    pub authors: Vec<AtomAuthor>,
    #[serde(rename = "link", default)]
    pub links: Vec<AtomLink>,
    #[serde(rename = "category", default)]
    pub categories: Vec<AtomCategory>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AtomAuthor {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AtomLink {
    #[serde(rename = "@href")]
    pub href: String,
    #[serde(rename = "@title")]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AtomCategory {
    #[serde(rename = "@term")]
    pub term: String,
}

// ==================== ArxivSource ====================

/// Collects recent submissions from the arXiv search API.
pub struct ArxivSource {
    client: Client,
    config: ArxivConfig,
}

impl ArxivSource {
    /// Creates an adapter from its configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Client`] if the HTTP client cannot be built, or
    /// [`ProviderError::Config`] if `base_url` is not a valid URL.
    pub fn new(config: ArxivConfig, timeouts: HttpTimeouts) -> Result<Self, ProviderError> {
        if Url::parse(&config.base_url).is_err() {
            return Err(ProviderError::config(
                SOURCE_NAME,
                format!("invalid base_url '{}'", config.base_url),
            ));
        }
        let client = build_api_client(SOURCE_NAME, timeouts)?;
        Ok(Self { client, config })
    }

    fn page_url(&self, query: &str, start: usize, max_results: usize) -> String {
        format!(
            "{}?search_query={}&start={start}&max_results={max_results}&sortBy={}&sortOrder=descending",
            self.config.base_url,
            urlencoding::encode(query),
            self.config.sort_order.as_api_str(),
        )
    }

    #[instrument(skip(self), fields(source = SOURCE_NAME))]
    async fn fetch_page(&self, url: &str) -> Result<AtomFeed, ProviderError> {
        debug!(api_url = %url, "calling arXiv API");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::http(SOURCE_NAME, url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::status(SOURCE_NAME, url, status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::http(SOURCE_NAME, url, e))?;

        parse_feed(&body)
    }

    async fn pause(&self) {
        if self.config.request_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.request_delay_ms)).await;
        }
    }
}

impl std::fmt::Debug for ArxivSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArxivSource")
            .field("base_url", &self.config.base_url)
            .field("query_terms", &self.config.query_terms)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RecordSource for ArxivSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Arxiv
    }

    #[instrument(skip(self), fields(source = SOURCE_NAME, terms = self.config.query_terms.len()))]
    async fn fetch(&self) -> Result<Vec<Record>, ProviderError> {
        let mut records = Vec::new();
        let mut first_request = true;

        for query in &self.config.query_terms {
            let mut read = 0;
            while read < self.config.max_results {
                if !first_request {
                    self.pause().await;
                }
                first_request = false;

                let wanted = self.config.page_size.min(self.config.max_results - read);
                let feed = self.fetch_page(&self.page_url(query, read, wanted)).await?;
                let received = feed.entries.len();
                read += received;

                records.extend(feed.entries.into_iter().filter_map(entry_to_record));

                if received < wanted {
                    break;
                }
            }
            info!(query = %query, entries = read, "arXiv query collected");
        }

        Ok(records)
    }
}

// ==================== Mapping helpers ====================

/// Decodes an Atom response body.
///
/// A feed holding arXiv's error pseudo-entry is reported as a parse failure.
pub(crate) fn parse_feed(body: &str) -> Result<AtomFeed, ProviderError> {
    let feed: AtomFeed =
        quick_xml::de::from_str(body).map_err(|e| ProviderError::parse(SOURCE_NAME, e))?;

    if let Some(error_entry) = feed
        .entries
        .iter()
        .find(|entry| entry.id.contains(API_ERROR_ID_MARKER))
    {
        let reason = error_entry
            .summary
            .as_deref()
            .map_or_else(|| "query rejected".to_string(), |s| s.trim().to_string());
        warn!(%reason, "arXiv rejected the query");
        return Err(ProviderError::parse(SOURCE_NAME, reason));
    }

    Ok(feed)
}

/// Maps one entry to a record; entries without a title are skipped.
pub(crate) fn entry_to_record(entry: AtomEntry) -> Option<Record> {
    if entry.title.trim().is_empty() {
        debug!(id = %entry.id, "skipping arXiv entry without title");
        return None;
    }

    let pdf_url = pdf_url(&entry);
    let doi = entry
        .links
        .iter()
        .filter(|link| link.title.as_deref() == Some("doi"))
        .find_map(|link| doi_from_url(&link.href));

    let external_id = Some(entry.id.trim().to_string()).filter(|id| !id.is_empty());
    let metadata = SourceMetadata::Arxiv(ArxivMetadata {
        external_id,
        categories: entry.categories.into_iter().map(|c| c.term).collect(),
    });
    let authors = entry.authors.into_iter().map(|author| author.name).collect();

    Some(
        Record::collected(&entry.title, authors, metadata)
            .with_abstract(entry.summary)
            .with_url(pdf_url)
            .with_doi(doi)
            .with_publication_date(entry.published.as_deref()),
    )
}

/// Picks the PDF link, else rewrites the `/abs/` entry id to its `/pdf/` form.
fn pdf_url(entry: &AtomEntry) -> Option<String> {
    if let Some(link) = entry
        .links
        .iter()
        .find(|link| link.title.as_deref() == Some("pdf"))
    {
        return Some(link.href.clone());
    }

    let mut url = Url::parse(entry.id.trim()).ok()?;
    let rewritten = url.path().strip_prefix("/abs/")?.to_string();
    url.set_path(&format!("/pdf/{rewritten}"));
    Some(url.to_string())
}

fn doi_from_url(href: &str) -> Option<String> {
    DOI_URL_PREFIXES
        .iter()
        .find_map(|prefix| href.strip_prefix(prefix))
        .map(|doi| urlencoding::decode(doi).map_or_else(|_| doi.to_string(), |d| d.into_owned()))
}
