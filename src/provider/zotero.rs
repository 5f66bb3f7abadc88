//! Zotero Web API (v3) adapters.
//!
//! [`ZoteroSource`] reads journal articles from a user or group library and
//! [`ZoteroPublisher`] creates items in it. Both authenticate with the
//! `Zotero-API-Key` header.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::http_client::{HttpTimeouts, build_api_client};
use super::{ProviderError, PublishError, PublishSink, RecordSource};
use crate::config::ZoteroConfig;
use crate::record::{Record, SourceKind, SourceMetadata, ZoteroMetadata, author_from_parts};

const SOURCE_NAME: &str = "zotero";
const API_VERSION: &str = "3";
const JOURNAL_ARTICLE: &str = "journalArticle";
const PDF_CONTENT_TYPE: &str = "application/pdf";

// ==================== Zotero API types ====================

#[derive(Debug, Deserialize)]
pub(crate) struct ZoteroItem {
    pub key: String,
    #[serde(default)]
    pub meta: ZoteroItemMeta,
    pub data: ZoteroItemData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ZoteroItemMeta {
    #[serde(default)]
    pub num_children: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ZoteroItemData {
    #[serde(default)]
    pub item_type: String,
    pub title: Option<String>,
    #[serde(default)]
    pub creators: Vec<ZoteroCreator>,
    pub abstract_note: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    pub publication_title: Option<String>,
    pub date: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    #[serde(default)]
    pub tags: Vec<ZoteroTag>,
    pub content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ZoteroCreator {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct ZoteroTag {
    pub tag: String,
}

/// Created-item payload sent to `POST /items`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewItem {
    pub item_type: &'static str,
    pub title: String,
    pub creators: Vec<NewCreator>,
    pub abstract_note: String,
    pub url: String,
    pub tags: Vec<ZoteroTag>,
    pub collections: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewCreator {
    pub creator_type: &'static str,
    pub name: String,
}

/// Write response; `failed` maps payload index to the reason.
#[derive(Debug, Deserialize)]
pub(crate) struct WriteResponse {
    #[serde(default)]
    pub failed: HashMap<String, Value>,
}

// ==================== Shared API access ====================

#[derive(Clone)]
struct ZoteroApi {
    client: Client,
    library_url: String,
    api_key: String,
}

impl ZoteroApi {
    fn new(config: &ZoteroConfig, timeouts: HttpTimeouts) -> Result<Self, ProviderError> {
        let library_id = required(config.library_id.as_deref(), "library_id")?;
        let api_key = required(config.api_key.as_deref(), "api_key")?;
        let client = build_api_client(SOURCE_NAME, timeouts)?;

        Ok(Self {
            client,
            library_url: format!(
                "{}/{}/{}",
                config.base_url.trim_end_matches('/'),
                config.library_type.path_segment(),
                urlencoding::encode(library_id)
            ),
            api_key: api_key.to_string(),
        })
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.authorized(self.client.get(url))
    }

    fn post(&self, url: &str) -> RequestBuilder {
        self.authorized(self.client.post(url))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Zotero-API-Key", &self.api_key)
            .header("Zotero-API-Version", API_VERSION)
    }

    async fn list(&self, url: &str) -> Result<Vec<ZoteroItem>, ProviderError> {
        debug!(api_url = %url, "calling Zotero API");

        let response = self
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::http(SOURCE_NAME, url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::status(SOURCE_NAME, url, status.as_u16()));
        }

        response
            .json::<Vec<ZoteroItem>>()
            .await
            .map_err(|e| ProviderError::parse(SOURCE_NAME, e))
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, ProviderError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ProviderError::config(SOURCE_NAME, format!("missing {field}")))
}

// ==================== ZoteroSource ====================

/// Collects journal articles from a Zotero library.
pub struct ZoteroSource {
    api: ZoteroApi,
    collection_key: Option<String>,
    limit: u32,
}

impl ZoteroSource {
    /// Creates an adapter from its configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] when the library id or API key is
    /// missing, or [`ProviderError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &ZoteroConfig, timeouts: HttpTimeouts) -> Result<Self, ProviderError> {
        Ok(Self {
            api: ZoteroApi::new(config, timeouts)?,
            collection_key: config
                .collection_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
            limit: config.limit,
        })
    }

    fn top_items_url(&self) -> String {
        match &self.collection_key {
            Some(key) => format!(
                "{}/collections/{}/items/top?format=json&limit={}",
                self.api.library_url,
                urlencoding::encode(key),
                self.limit
            ),
            None => format!(
                "{}/items/top?format=json&limit={}",
                self.api.library_url, self.limit
            ),
        }
    }

    /// Returns the first PDF attachment URL among the item's children.
    ///
    /// Failure to list children is not fatal; the item's own URL is used instead.
    async fn attachment_url(&self, item_key: &str) -> Option<String> {
        let url = format!(
            "{}/items/{}/children?format=json",
            self.api.library_url,
            urlencoding::encode(item_key)
        );
        match self.api.list(&url).await {
            Ok(children) => pdf_attachment_url(&children),
            Err(error) => {
                warn!(item = item_key, error = %error, "could not list Zotero attachments");
                None
            }
        }
    }
}

impl std::fmt::Debug for ZoteroSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoteroSource")
            .field("library_url", &self.api.library_url)
            .field("collection_key", &self.collection_key)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RecordSource for ZoteroSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Zotero
    }

    #[instrument(skip(self), fields(source = SOURCE_NAME, collection = ?self.collection_key))]
    async fn fetch(&self) -> Result<Vec<Record>, ProviderError> {
        let items = self.api.list(&self.top_items_url()).await?;
        let listed = items.len();

        let mut records = Vec::new();
        for item in items {
            if item.data.item_type != JOURNAL_ARTICLE {
                debug!(key = %item.key, item_type = %item.data.item_type, "skipping non-article item");
                continue;
            }
            let attachment = if item.meta.num_children > 0 {
                self.attachment_url(&item.key).await
            } else {
                None
            };
            if let Some(record) = item_to_record(item, attachment) {
                records.push(record);
            }
        }

        info!(listed, articles = records.len(), "Zotero library collected");
        Ok(records)
    }
}

// ==================== ZoteroPublisher ====================

/// Creates library items for newly stored records.
pub struct ZoteroPublisher {
    api: ZoteroApi,
    base_tags: Vec<String>,
    collection_key: Option<String>,
}

impl ZoteroPublisher {
    /// Creates a publisher from the Zotero configuration section.
    ///
    /// # Errors
    ///
    /// Same as [`ZoteroSource::new`].
    pub fn new(config: &ZoteroConfig, timeouts: HttpTimeouts) -> Result<Self, ProviderError> {
        Ok(Self {
            api: ZoteroApi::new(config, timeouts)?,
            base_tags: config.publish_tags.clone(),
            collection_key: config
                .collection_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
        })
    }

    fn payload(&self, record: &Record) -> NewItem {
        let mut tags: Vec<ZoteroTag> = self
            .base_tags
            .iter()
            .map(|tag| ZoteroTag { tag: tag.clone() })
            .collect();
        if let Some(category) = record.source_metadata.primary_category() {
            tags.push(ZoteroTag {
                tag: category.to_string(),
            });
        }

        NewItem {
            item_type: JOURNAL_ARTICLE,
            title: record.title.clone(),
            creators: record
                .authors
                .iter()
                .map(|name| NewCreator {
                    creator_type: "author",
                    name: name.clone(),
                })
                .collect(),
            abstract_note: record.abstract_text.clone().unwrap_or_default(),
            url: record.url.clone().unwrap_or_default(),
            tags,
            collections: self.collection_key.iter().cloned().collect(),
        }
    }
}

impl std::fmt::Debug for ZoteroPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoteroPublisher")
            .field("library_url", &self.api.library_url)
            .field("base_tags", &self.base_tags)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PublishSink for ZoteroPublisher {
    fn kind(&self) -> SourceKind {
        SourceKind::Zotero
    }

    #[instrument(skip(self, record), fields(sink = SOURCE_NAME, identity = %record.identity))]
    async fn publish(&self, record: &Record) -> Result<(), PublishError> {
        let url = format!("{}/items", self.api.library_url);
        let response = self
            .api
            .post(&url)
            .json(&[self.payload(record)])
            .send()
            .await
            .map_err(|e| PublishError::http(&record.title, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::status(&record.title, status.as_u16()));
        }

        let body: WriteResponse = response
            .json()
            .await
            .map_err(|e| PublishError::parse(&record.title, e))?;

        if let Some(reason) = body.failed.values().next() {
            return Err(PublishError::rejected(&record.title, failure_reason(reason)));
        }

        debug!("record published");
        Ok(())
    }
}

// ==================== Mapping helpers ====================

/// Maps a journal article to a record; items without a title are skipped.
pub(crate) fn item_to_record(item: ZoteroItem, attachment_url: Option<String>) -> Option<Record> {
    let data = item.data;
    let Some(title) = data.title.filter(|title| !title.trim().is_empty()) else {
        debug!(key = %item.key, "skipping Zotero item without title");
        return None;
    };

    let authors = data
        .creators
        .iter()
        .filter_map(|c| {
            author_from_parts(c.name.as_deref(), c.first_name.as_deref(), c.last_name.as_deref())
        })
        .collect();

    let metadata = SourceMetadata::Zotero(ZoteroMetadata {
        external_key: Some(item.key),
        volume: non_blank(data.volume),
        issue: non_blank(data.issue),
        pages: non_blank(data.pages),
        tags: data
            .tags
            .into_iter()
            .map(|t| t.tag)
            .filter(|tag| !tag.trim().is_empty())
            .collect(),
    });

    Some(
        Record::collected(&title, authors, metadata)
            .with_abstract(data.abstract_note)
            .with_url(attachment_url.or(data.url))
            .with_doi(data.doi)
            .with_journal(data.publication_title)
            .with_publication_date(data.date.as_deref()),
    )
}

fn pdf_attachment_url(children: &[ZoteroItem]) -> Option<String> {
    children
        .iter()
        .filter(|child| child.data.content_type.as_deref() == Some(PDF_CONTENT_TYPE))
        .find_map(|child| non_blank(child.data.url.clone()))
}

fn failure_reason(value: &Value) -> String {
    match (value.get("code"), value.get("message").and_then(Value::as_str)) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (None, Some(message)) => message.to_string(),
        _ => value.to_string(),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
