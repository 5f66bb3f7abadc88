//! External bibliographic providers.
//!
//! Two read sources ([`ArxivSource`], [`ZoteroSource`]) turn provider responses
//! into [`Record`]s, and one write sink ([`ZoteroPublisher`]) pushes newly stored
//! records back to a Zotero library.
//!
//! # Object Safety
//!
//! Both traits use `async_trait` so the pipeline can hold them as
//! `Box<dyn RecordSource>` / `Arc<dyn PublishSink>`.

mod arxiv;
mod error;
pub mod http_client;
mod zotero;

pub use arxiv::ArxivSource;
pub use error::{ProviderError, PublishError};
pub use zotero::{ZoteroPublisher, ZoteroSource};

use async_trait::async_trait;

use crate::record::{Record, SourceKind};

/// A provider records are collected from.
///
/// Each adapter is built from its own configuration section, so `fetch`
/// takes nothing at call time.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Short name used in logs and reports (e.g. "arxiv").
    fn name(&self) -> &'static str;

    /// Provenance of every record this source yields.
    fn kind(&self) -> SourceKind;

    /// Collects the current result set.
    async fn fetch(&self) -> Result<Vec<Record>, ProviderError>;
}

/// A provider newly stored records are written back to.
#[async_trait]
pub trait PublishSink: Send + Sync {
    /// Provenance owned by the sink; records of this kind are not published back.
    fn kind(&self) -> SourceKind;

    /// Creates one item for `record` in the external library.
    async fn publish(&self, record: &Record) -> Result<(), PublishError>;
}
