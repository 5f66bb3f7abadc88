//! Field normalization shared by every provider adapter.
//!
//! Identity, author and date rules live here so that dedup, lookup and
//! persistence all agree on them.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

/// Placeholder author used when a source gives no usable creator.
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"\s+"));

/// Compiles a regex at static init; panics on invalid pattern.
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Collapses whitespace runs (including newlines from feed markup) to single spaces.
#[must_use]
pub fn collapse_whitespace(value: &str) -> String {
    WHITESPACE_RE.replace_all(value.trim(), " ").into_owned()
}

/// Computes the natural key for a title: whitespace collapsed, trimmed, lowercased.
///
/// Two records whose titles normalize to the same string are the same paper,
/// regardless of which source produced them.
#[must_use]
pub fn normalize_identity(title: &str) -> String {
    collapse_whitespace(title).to_lowercase()
}

/// Builds a display name from a structured creator entry.
///
/// Prefers a single `name` field, otherwise synthesizes `"Last, First"`
/// (or whichever half is present). Returns `None` when nothing usable remains.
#[must_use]
pub fn author_from_parts(
    name: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> Option<String> {
    let clean = |value: Option<&str>| {
        value
            .map(collapse_whitespace)
            .filter(|value| !value.is_empty())
    };

    if let Some(name) = clean(name) {
        return Some(name);
    }

    match (clean(last_name), clean(first_name)) {
        (Some(last), Some(first)) => Some(format!("{last}, {first}")),
        (Some(last), None) => Some(last),
        (None, Some(first)) => Some(first),
        (None, None) => None,
    }
}

/// Trims names, drops blank ones and falls back to [`UNKNOWN_AUTHOR`] when the list ends up empty.
#[must_use]
pub fn finalize_authors<I>(authors: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let authors: Vec<String> = authors
        .into_iter()
        .map(|author| author.trim().to_string())
        .filter(|author| !author.is_empty())
        .collect();

    if authors.is_empty() {
        vec![UNKNOWN_AUTHOR.to_string()]
    } else {
        authors
    }
}

/// Parses a publication date, trying RFC 3339, `YYYY-MM-DD`, `YYYY-MM` and `YYYY` in order.
#[must_use]
pub fn try_parse_publication_date(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_year_month(value))
        .or_else(|| parse_year(value))?;

    date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc())
}

/// Parses a publication date, defaulting to the current time when nothing matches.
///
/// The fallback is a heuristic: a record with an unknown date is stamped with its
/// collection time rather than rejected.
#[must_use]
pub fn parse_publication_date(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(try_parse_publication_date)
        .unwrap_or_else(Utc::now)
}

fn parse_year_month(value: &str) -> Option<NaiveDate> {
    let (year, month) = value.split_once('-')?;
    if year.len() != 4 || month.is_empty() || month.len() > 2 {
        return None;
    }
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
}

fn parse_year(value: &str) -> Option<NaiveDate> {
    if value.len() != 4 || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    NaiveDate::from_ymd_opt(value.parse().ok()?, 1, 1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Datelike;

    use super::*;

    #[test]
    fn test_normalize_identity_collapses_whitespace_and_case() {
        assert_eq!(
            normalize_identity("  Attention   Is\nAll You  Need "),
            "attention is all you need"
        );
        assert_eq!(
            normalize_identity("Attention is all you need"),
            normalize_identity("ATTENTION IS ALL YOU NEED")
        );
    }

    #[test]
    fn test_author_from_parts_prefers_name() {
        let author = author_from_parts(Some("OpenAI Team"), Some("Ada"), Some("Lovelace"));
        assert_eq!(author.as_deref(), Some("OpenAI Team"));
    }

    #[test]
    fn test_author_from_parts_synthesizes_last_first() {
        let author = author_from_parts(None, Some("Ada"), Some("Lovelace"));
        assert_eq!(author.as_deref(), Some("Lovelace, Ada"));

        let only_last = author_from_parts(Some("  "), None, Some("Lovelace"));
        assert_eq!(only_last.as_deref(), Some("Lovelace"));

        assert!(author_from_parts(None, Some(""), None).is_none());
    }

    #[test]
    fn test_finalize_authors_falls_back_to_unknown() {
        assert_eq!(
            finalize_authors(vec![" ".to_string(), String::new()]),
            vec![UNKNOWN_AUTHOR.to_string()]
        );
        assert_eq!(
            finalize_authors(vec![" Ada  Lovelace ".to_string()]),
            vec!["Ada  Lovelace".to_string()]
        );
    }

    #[test]
    fn test_try_parse_publication_date_format_order() {
        let full = try_parse_publication_date("2023-07-14").unwrap();
        assert_eq!((full.year(), full.month(), full.day()), (2023, 7, 14));

        let month = try_parse_publication_date("2023-07").unwrap();
        assert_eq!((month.year(), month.month(), month.day()), (2023, 7, 1));

        let year = try_parse_publication_date("2023").unwrap();
        assert_eq!((year.year(), year.month(), year.day()), (2023, 1, 1));

        let rfc = try_parse_publication_date("2024-01-15T18:59:59Z").unwrap();
        assert_eq!((rfc.year(), rfc.month(), rfc.day()), (2024, 1, 15));
    }

    #[test]
    fn test_try_parse_publication_date_rejects_free_text() {
        assert!(try_parse_publication_date("Spring 2021").is_none());
        assert!(try_parse_publication_date("2023-13").is_none());
        assert!(try_parse_publication_date("").is_none());
    }

    #[test]
    fn test_parse_publication_date_defaults_to_now() {
        let before = Utc::now();
        let parsed = parse_publication_date(Some("not a date"));
        assert!(parsed >= before);

        let missing = parse_publication_date(None);
        assert!(missing >= before);
    }
}
