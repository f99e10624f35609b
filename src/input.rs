//! URL extraction and submission-time URL checks.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace};
use url::Url;

use crate::download::ValidationError;

/// Longest URL accepted.
pub const MAX_URL_LENGTH: usize = 2000;

/// Matches http:// and https:// URLs up to whitespace or common delimiters.
#[allow(clippy::expect_used)]
static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'\]]+"#).expect("URL regex is valid"));

/// Finds every valid http(s) URL in `input`, de-duplicated, in order.
///
/// ```
/// use mediadl_core::input::extract_urls;
///
/// let urls = extract_urls("see https://youtu.be/abc123, and https://youtu.be/abc123.");
/// assert_eq!(urls, vec!["https://youtu.be/abc123".to_string()]);
/// ```
#[tracing::instrument(skip(input), fields(input_len = input.len()))]
#[must_use]
pub fn extract_urls(input: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for found in URL_PATTERN.find_iter(input) {
        let cleaned = clean_url_trailing(found.as_str());
        trace!(url = %cleaned, "found URL candidate");
        match validate_url(cleaned) {
            Ok(_) => {
                if !out.iter().any(|u| u == cleaned) {
                    out.push(cleaned.to_string());
                }
            }
            Err(e) => debug!(url = %cleaned, error = %e, "skipping invalid URL"),
        }
    }
    out
}

/// Strips sentence punctuation and unbalanced closing brackets.
fn clean_url_trailing(url: &str) -> &str {
    let mut result = url;
    while let Some(last) = result.chars().last() {
        match last {
            '.' | ',' | ';' | ':' | '!' | '?' => {
                result = &result[..result.len() - 1];
            }
            ')' | ']' => {
                let open = if last == ')' { '(' } else { '[' };
                let open_count = result.chars().filter(|&c| c == open).count();
                let close_count = result.chars().filter(|&c| c == last).count();
                if close_count > open_count {
                    result = &result[..result.len() - 1];
                } else {
                    break;
                }
            }
            _ => break,
        }
    }
    result
}

/// Parses an http(s) URL with a host.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidUrl`] for anything else, or
/// [`ValidationError::SearchPage`] for search-result pages.
pub fn validate_url(raw: &str) -> Result<Url, ValidationError> {
    let invalid = || ValidationError::InvalidUrl {
        url: raw.to_string(),
    };
    let raw = raw.trim();
    if raw.is_empty() || raw.len() > MAX_URL_LENGTH {
        return Err(invalid());
    }
    let parsed = Url::parse(raw).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid());
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid());
    }
    if is_search_url(&parsed) {
        return Err(ValidationError::SearchPage {
            url: raw.to_string(),
        });
    }
    Ok(parsed)
}

/// True for search-result pages, which list media rather than being media.
#[must_use]
pub fn is_search_url(url: &Url) -> bool {
    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let path = url.path().trim_end_matches('/');
    let has_query = |key: &str| url.query_pairs().any(|(k, _)| k == key);
    match host {
        "youtube.com" | "m.youtube.com" => path == "/results" && has_query("search_query"),
        "music.youtube.com" => path == "/search" && has_query("q"),
        _ => false,
    }
}

/// Lowercased host without a leading `www.`.
#[must_use]
pub fn host_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}
