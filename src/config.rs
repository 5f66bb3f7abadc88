//! Pipeline configuration.
//!
//! A [`PipelineConfig`] is built once (TOML file, then environment overrides,
//! then CLI overrides applied by the binary) and passed by value to the
//! constructors that need it. Nothing reads settings from global state.
//!
//! ```toml
//! database_path = "paper_collection.db"
//! artifact_dir = "papers/pdf"
//! fetch_concurrency = 5
//!
//! [arxiv]
//! query_terms = ["cat:cs.AI", "cat:cs.LG"]
//! max_results = 50
//!
//! [zotero]
//! library_id = "123456"
//! collection_key = "ABCD2345"
//! ```

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::db::{DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_MAX_CONNECTIONS, DatabaseOptions};
use crate::download::DEFAULT_CONCURRENCY;
use crate::download::constants::READ_TIMEOUT_SECS;
use crate::provider::http_client::{
    DEFAULT_API_TIMEOUT_SECS, DEFAULT_CONNECT_TIMEOUT_SECS, HttpTimeouts,
};

/// Directory name under the user config dir.
const CONFIG_DIR_NAME: &str = "paper-collector";

/// Config file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// arXiv queries collected when none are configured.
pub const DEFAULT_QUERY_TERMS: [&str; 4] = ["cat:cs.AI", "cat:cs.LG", "cat:cs.NE", "cat:stat.ML"];

/// Environment variable overriding `zotero.library_id`.
pub const ENV_ZOTERO_LIBRARY_ID: &str = "ZOTERO_LIBRARY_ID";

/// Environment variable overriding `zotero.api_key`.
pub const ENV_ZOTERO_API_KEY: &str = "ZOTERO_API_KEY";

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value for `{field}`: {value}. Expected range: {expected}")]
    Invalid {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, value: impl ToString, expected: &'static str) -> Self {
        Self::Invalid {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

/// arXiv sort criterion; results always come newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArxivSortOrder {
    #[default]
    SubmittedDate,
    LastUpdatedDate,
    Relevance,
}

impl ArxivSortOrder {
    /// Returns the `sortBy` value the arXiv API expects.
    #[must_use]
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::SubmittedDate => "submittedDate",
            Self::LastUpdatedDate => "lastUpdatedDate",
            Self::Relevance => "relevance",
        }
    }
}

/// `[arxiv]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArxivConfig {
    pub enabled: bool,
    /// Search queries, one result set each (e.g. `cat:cs.AI`).
    pub query_terms: Vec<String>,
    /// Maximum entries read per query term.
    pub max_results: usize,
    pub sort_order: ArxivSortOrder,
    /// Entries requested per API call.
    pub page_size: usize,
    /// Pause between consecutive API calls.
    pub request_delay_ms: u64,
    pub base_url: String,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            query_terms: DEFAULT_QUERY_TERMS.iter().map(ToString::to_string).collect(),
            max_results: 100,
            sort_order: ArxivSortOrder::default(),
            page_size: 100,
            request_delay_ms: 3000,
            base_url: "https://export.arxiv.org/api/query".to_string(),
        }
    }
}

/// Zotero library kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryType {
    #[default]
    User,
    Group,
}

impl LibraryType {
    /// Returns the URL path segment for this library kind.
    #[must_use]
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Group => "groups",
        }
    }
}

/// `[zotero]` section.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZoteroConfig {
    pub enabled: bool,
    pub library_id: Option<String>,
    pub library_type: LibraryType,
    pub api_key: Option<String>,
    /// Restrict collection to one collection's top-level items.
    pub collection_key: Option<String>,
    /// Items per listing request (the API caps this at 100).
    pub limit: u32,
    pub base_url: String,
    /// Publish newly stored records from other sources back to the library.
    pub publish: bool,
    /// Tags attached to every published item.
    pub publish_tags: Vec<String>,
}

impl Default for ZoteroConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            library_id: None,
            library_type: LibraryType::default(),
            api_key: None,
            collection_key: None,
            limit: 100,
            base_url: "https://api.zotero.org".to_string(),
            publish: true,
            publish_tags: vec!["AI Research".to_string()],
        }
    }
}

impl ZoteroConfig {
    /// True when enabled and both library id and API key are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        self.enabled && present(&self.library_id) && present(&self.api_key)
    }
}

impl std::fmt::Debug for ZoteroConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoteroConfig")
            .field("enabled", &self.enabled)
            .field("library_id", &self.library_id)
            .field("library_type", &self.library_type)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("collection_key", &self.collection_key)
            .field("limit", &self.limit)
            .field("base_url", &self.base_url)
            .field("publish", &self.publish)
            .field("publish_tags", &self.publish_tags)
            .finish()
    }
}

/// `[http]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    /// Total timeout for provider API calls.
    pub api_timeout_secs: u64,
    /// Total timeout for one artifact download.
    pub download_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            download_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

/// `[database]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Everything a pipeline run needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub database_path: PathBuf,
    pub artifact_dir: PathBuf,
    /// Replace stored rows that have no artifact.
    pub force_update: bool,
    /// Simultaneous artifact requests.
    pub fetch_concurrency: usize,
    /// Offer stored rows without an artifact for fetching again.
    pub refetch_missing_artifacts: bool,
    pub arxiv: ArxivConfig,
    pub zotero: ZoteroConfig,
    pub http: HttpConfig,
    pub database: DatabaseConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("paper_collection.db"),
            artifact_dir: PathBuf::from("papers").join("pdf"),
            force_update: false,
            fetch_concurrency: DEFAULT_CONCURRENCY,
            refetch_missing_artifacts: true,
            arxiv: ArxivConfig::default(),
            zotero: ZoteroConfig::default(),
            http: HttpConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

/// A config plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The file that was read, if any.
    pub path: Option<PathBuf>,
    pub config: PipelineConfig,
    pub loaded_from_file: bool,
}

impl PipelineConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys.
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Loads configuration from `explicit`, else the default location, else defaults.
    ///
    /// Environment overrides are applied and the result is validated.
    /// An explicit path must exist; a missing default file simply means defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or a value is out of range.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
        let candidate = explicit
            .map(Path::to_path_buf)
            .or_else(resolve_default_config_path);

        let (path, mut config, loaded_from_file) = match candidate {
            Some(path) if explicit.is_some() || path.exists() => {
                let config = Self::from_file(&path)?;
                info!(path = %path.display(), "loaded configuration file");
                (Some(path), config, true)
            }
            other => {
                debug!(path = ?other, "no configuration file, using defaults");
                (other, Self::default(), false)
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(LoadedConfig {
            path,
            config,
            loaded_from_file,
        })
    }

    /// Applies `ZOTERO_LIBRARY_ID` / `ZOTERO_API_KEY` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|name| env::var(name).ok());
    }

    /// Applies Zotero credential overrides from `lookup`; blank values are ignored.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(library_id) = non_blank(ENV_ZOTERO_LIBRARY_ID) {
            self.zotero.library_id = Some(library_id);
        }
        if let Some(api_key) = non_blank(ENV_ZOTERO_API_KEY) {
            self.zotero.api_key = Some(api_key);
        }
    }

    /// Validates values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.fetch_concurrency) {
            return Err(ConfigError::invalid(
                "fetch_concurrency",
                self.fetch_concurrency,
                "1..=100",
            ));
        }

        validate_timeout_secs("http.connect_timeout_secs", self.http.connect_timeout_secs)?;
        validate_timeout_secs("http.api_timeout_secs", self.http.api_timeout_secs)?;
        validate_timeout_secs("http.download_timeout_secs", self.http.download_timeout_secs)?;

        if !(1..=20).contains(&self.database.max_connections) {
            return Err(ConfigError::invalid(
                "database.max_connections",
                self.database.max_connections,
                "1..=20",
            ));
        }
        if self.database.busy_timeout_ms > 120_000 {
            return Err(ConfigError::invalid(
                "database.busy_timeout_ms",
                self.database.busy_timeout_ms,
                "0..=120000",
            ));
        }

        if !(1..=2000).contains(&self.arxiv.page_size) {
            return Err(ConfigError::invalid(
                "arxiv.page_size",
                self.arxiv.page_size,
                "1..=2000",
            ));
        }
        if self.arxiv.request_delay_ms > 60_000 {
            return Err(ConfigError::invalid(
                "arxiv.request_delay_ms",
                self.arxiv.request_delay_ms,
                "0..=60000",
            ));
        }

        if !(1..=100).contains(&self.zotero.limit) {
            return Err(ConfigError::invalid("zotero.limit", self.zotero.limit, "1..=100"));
        }

        Ok(())
    }

    /// Pool options for [`Database::with_options`](crate::Database::with_options).
    #[must_use]
    pub fn database_options(&self) -> DatabaseOptions {
        DatabaseOptions {
            max_connections: self.database.max_connections,
            busy_timeout_ms: self.database.busy_timeout_ms,
        }
    }

    /// Timeouts for provider API clients.
    #[must_use]
    pub fn api_timeouts(&self) -> HttpTimeouts {
        HttpTimeouts {
            connect_timeout_secs: self.http.connect_timeout_secs,
            read_timeout_secs: self.http.api_timeout_secs,
        }
    }
}

fn validate_timeout_secs(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if (1..=3600).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, value, "1..=3600"))
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/paper-collector/config.toml`
/// 2. `$HOME/.config/paper-collector/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}
