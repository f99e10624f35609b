//! Subfolder template rendering.
//!
//! Supports `{field}` and `%(field)s` tokens. Every path segment of the
//! rendered result is stripped of characters illegal in file names; empty,
//! `.` and `..` segments are dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::metadata::MediaMetadata;

/// Placeholder for tokens with no metadata value.
const MISSING: &str = "NA";

#[allow(clippy::expect_used)]
static PERCENT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%\(([^)]+)\)s").expect("percent token regex is valid"));

#[allow(clippy::expect_used)]
static BRACE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("brace token regex is valid"));

#[allow(clippy::expect_used)]
static ILLEGAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"|?*\x00-\x1f]"#).expect("illegal char regex is valid"));

/// Renders `pattern` against metadata and appends the result to `base`.
///
/// Returns `base` unchanged when nothing survives sanitizing.
#[must_use]
pub fn resolve_subfolder(base: &Path, pattern: &str, metadata: &MediaMetadata) -> PathBuf {
    let tokens = token_table(metadata);
    let lookup = |caps: &Captures<'_>| {
        tokens
            .get(&caps[1])
            .cloned()
            .unwrap_or_else(|| MISSING.to_string())
    };

    let rendered = PERCENT_TOKEN.replace_all(pattern, &lookup);
    let rendered = BRACE_TOKEN.replace_all(&rendered, &lookup);

    let mut path = base.to_path_buf();
    for segment in sanitize_segments(&rendered) {
        path.push(segment);
    }
    path
}

/// Splits on either slash and sanitizes each segment.
fn sanitize_segments(rendered: &str) -> Vec<String> {
    rendered
        .replace('\\', "/")
        .split('/')
        .map(|part| ILLEGAL_CHARS.replace_all(part, "").trim().to_string())
        .filter(|part| !part.is_empty() && part != "." && part != "..")
        .collect()
}

/// String form of every metadata field plus derived date/playlist tokens.
fn token_table(metadata: &MediaMetadata) -> HashMap<String, String> {
    let mut table: HashMap<String, String> = metadata
        .iter()
        .map(|(key, value)| (key.clone(), token_text(value)))
        .collect();

    if table.get("playlist").is_none_or(|v| v == MISSING) {
        if let Some(title) = metadata.get_str("playlist_title") {
            table.insert("playlist".to_string(), title);
        }
    }

    let date = metadata.get_str("upload_date").unwrap_or_default();
    let (year, month, day) = if date.len() == 8 && date.bytes().all(|b| b.is_ascii_digit()) {
        (&date[..4], &date[4..6], &date[6..8])
    } else {
        (MISSING, MISSING, MISSING)
    };
    table.insert("upload_year".to_string(), year.to_string());
    table.insert("upload_month".to_string(), month.to_string());
    table.insert("upload_day".to_string(), day.to_string());

    table
}

fn token_text(value: &Value) -> String {
    match value {
        Value::Null => MISSING.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(token_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn meta(json: &str) -> MediaMetadata {
        MediaMetadata::from_json_str(json).unwrap()
    }

    #[test]
    fn test_brace_and_percent_tokens_render() {
        let m = meta(r#"{"uploader":"Chan","title":"Clip"}"#);
        let path = resolve_subfolder(Path::new("/base"), "{uploader}/%(title)s", &m);
        assert_eq!(path, PathBuf::from("/base/Chan/Clip"));
    }

    #[test]
    fn test_date_tokens_derive_from_upload_date() {
        let m = meta(r#"{"upload_date":"20240315"}"#);
        let path = resolve_subfolder(
            Path::new("/base"),
            "{upload_year} - {upload_month}/{upload_day}",
            &m,
        );
        assert_eq!(path, PathBuf::from("/base/2024 - 03/15"));
    }

    #[test]
    fn test_missing_tokens_render_na() {
        let m = meta(r#"{}"#);
        let path = resolve_subfolder(Path::new("/base"), "{album}/{upload_year}", &m);
        assert_eq!(path, PathBuf::from("/base/NA/NA"));
    }

    #[test]
    fn test_playlist_falls_back_to_playlist_title() {
        let m = meta(r#"{"playlist_title":"Mix"}"#);
        let path = resolve_subfolder(Path::new("/base"), "{playlist}", &m);
        assert_eq!(path, PathBuf::from("/base/Mix"));
    }

    #[test]
    fn test_illegal_characters_and_traversal_are_stripped() {
        let m = meta(r#"{"title":"a:b?c","uploader":".."}"#);
        let path = resolve_subfolder(Path::new("/base"), "{uploader}/{title}//", &m);
        assert_eq!(path, PathBuf::from("/base/abc"));
    }

    #[test]
    fn test_segments_split_on_rendered_separators() {
        let m = meta(r#"{"album":"A/B"}"#);
        let path = resolve_subfolder(Path::new("/base"), "{album}", &m);
        assert_eq!(path, PathBuf::from("/base/A/B"));
    }
}
