//! Error types for provider adapters.

use thiserror::Error;

use super::http_client::ClientBuildError;

/// A read source could not deliver its records.
///
/// The pipeline treats every variant the same way: the source contributes
/// nothing to the run and the other sources proceed.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request never produced a response.
    #[error("{source_name}: request to {url} failed: {error}")]
    Http {
        source_name: &'static str,
        url: String,
        #[source]
        error: reqwest::Error,
    },

    /// The provider answered with a non-success status.
    #[error("{source_name}: {url} returned HTTP {status}")]
    Status {
        source_name: &'static str,
        url: String,
        status: u16,
    },

    /// The response body could not be decoded.
    #[error("{source_name}: unexpected response format: {reason}")]
    Parse {
        source_name: &'static str,
        reason: String,
    },

    /// The adapter is missing a setting it needs.
    #[error("{source_name}: {reason}")]
    Config {
        source_name: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Client(#[from] ClientBuildError),
}

impl ProviderError {
    pub fn http(source_name: &'static str, url: impl Into<String>, error: reqwest::Error) -> Self {
        Self::Http {
            source_name,
            url: url.into(),
            error,
        }
    }

    pub fn status(source_name: &'static str, url: impl Into<String>, status: u16) -> Self {
        Self::Status {
            source_name,
            url: url.into(),
            status,
        }
    }

    pub fn parse(source_name: &'static str, reason: impl ToString) -> Self {
        Self::Parse {
            source_name,
            reason: reason.to_string(),
        }
    }

    pub fn config(source_name: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            source_name,
            reason: reason.into(),
        }
    }

    /// Returns the HTTP status for status failures.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A record could not be written to the external library.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish request for '{title}' failed: {error}")]
    Http {
        title: String,
        #[source]
        error: reqwest::Error,
    },

    #[error("publish of '{title}' returned HTTP {status}")]
    Status { title: String, status: u16 },

    /// The provider accepted the request but reported the item as failed.
    #[error("publish of '{title}' rejected: {reason}")]
    Rejected { title: String, reason: String },

    #[error("publish response for '{title}' could not be read: {reason}")]
    Parse { title: String, reason: String },
}

impl PublishError {
    pub fn http(title: impl Into<String>, error: reqwest::Error) -> Self {
        Self::Http {
            title: title.into(),
            error,
        }
    }

    pub fn status(title: impl Into<String>, status: u16) -> Self {
        Self::Status {
            title: title.into(),
            status,
        }
    }

    pub fn rejected(title: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            title: title.into(),
            reason: reason.into(),
        }
    }

    pub fn parse(title: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            title: title.into(),
            reason: reason.to_string(),
        }
    }
}
