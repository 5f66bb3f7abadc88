//! Constants for the download module.

/// Default HTTP connect timeout for artifact requests.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Extension of stored artifacts.
pub const ARTIFACT_EXTENSION: &str = "pdf";

/// Suffix appended while an artifact is still being written.
pub const PARTIAL_SUFFIX: &str = "part";
