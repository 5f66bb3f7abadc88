//! Shared User-Agent strings for artifact and provider API HTTP clients.
//!
//! Single source for project URL and UA format so artifact and API traffic
//! stay consistent and easy to update (good citizenship; RFC 9308).

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/paper-collector";

const PRODUCT: &str = "paper-collector";

/// Default User-Agent for artifact requests (identifies the tool).
#[must_use]
pub(crate) fn default_download_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version} (academic-research-tool; +{PROJECT_UA_URL})")
}

/// Default User-Agent for provider API requests (single shared format; no per-provider name).
#[must_use]
pub(crate) fn default_api_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version} (research-tool; +{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version_of(ua: &str) -> Option<&str> {
        ua.strip_prefix("paper-collector/")
            .and_then(|s| s.split(' ').next())
    }

    /// Both UAs must use the same project URL and crate version.
    #[test]
    fn test_shared_format_consistency() {
        let download_ua = default_download_user_agent();
        let api_ua = default_api_user_agent();
        assert!(download_ua.contains(PROJECT_UA_URL));
        assert!(api_ua.contains(PROJECT_UA_URL));
        assert_eq!(version_of(&download_ua), Some(env!("CARGO_PKG_VERSION")));
        assert_eq!(version_of(&api_ua), Some(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_ua_format_keywords() {
        assert!(default_download_user_agent().contains("academic-research-tool"));
        assert!(default_api_user_agent().contains("(research-tool;"));
    }
}
