//! HTTP client for retrieving artifacts.
//!
//! [`HttpClient`] performs one GET per artifact and streams the body verbatim to
//! disk. Bytes go to a `.part` sibling first and are renamed into place only
//! after the stream completed, so a final artifact path never holds a partial body.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, PARTIAL_SUFFIX, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::provider::http_client::{HttpTimeouts, build_http_client};
use crate::user_agent;

/// Retrieves one artifact into a destination file.
///
/// The fetcher depends on this seam rather than on [`HttpClient`] so callers can
/// substitute an instrumented client.
#[async_trait]
pub trait ArtifactClient: Send + Sync {
    /// GETs `url` and writes the body to `dest`, returning bytes written.
    ///
    /// Only HTTP 200 counts as success.
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<u64, DownloadError>;
}

/// HTTP client for artifact downloads with streaming support.
///
/// Create once and reuse for a whole batch to take advantage of connection pooling.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with default timeouts (10s connect, 5min total).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] if the client cannot be built.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeouts in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] if the client cannot be built.
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, DownloadError> {
        let client = build_http_client(
            "artifact",
            &user_agent::default_download_user_agent(),
            HttpTimeouts {
                connect_timeout_secs,
                read_timeout_secs,
            },
        )?;
        Ok(Self { client })
    }

    /// Downloads `url` to exactly `dest`.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidUrl`] for malformed or non-http(s) URLs
    /// - [`DownloadError::HttpStatus`] for any status other than 200
    /// - [`DownloadError::Network`] / [`DownloadError::Timeout`] for transport failures
    /// - [`DownloadError::Io`] when the file cannot be written or moved into place
    #[instrument(skip(self), fields(url = %url, dest = %dest.display()))]
    pub async fn download_to_file(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            debug!(status = status.as_u16(), "artifact request not OK");
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let partial = partial_path(dest);
        let mut file = File::create(&partial)
            .await
            .map_err(|e| DownloadError::io(&partial, e))?;

        let bytes = match stream_to_file(&mut file, response, url, &partial).await {
            Ok(bytes) => bytes,
            Err(error) => {
                drop(file);
                remove_partial(&partial).await;
                return Err(error);
            }
        };
        drop(file);

        if let Err(error) = tokio::fs::rename(&partial, dest).await {
            remove_partial(&partial).await;
            return Err(DownloadError::io(dest, error));
        }

        info!(bytes, "artifact saved");
        Ok(bytes)
    }
}

#[async_trait]
impl ArtifactClient for HttpClient {
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        self.download_to_file(url, dest).await
    }
}

/// Returns the in-progress sibling of `dest` (`42.pdf` → `42.pdf.part`).
pub(crate) fn partial_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest.file_name().map(OsString::from).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

async fn remove_partial(partial: &Path) {
    if let Err(error) = tokio::fs::remove_file(partial).await {
        debug!(path = %partial.display(), error = %error, "could not remove partial artifact");
    }
}

/// Streams the response body to `file`, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
