//! Fan-out of playlist URLs into one submission per entry.
//!
//! The tool lists a playlist without resolving its items
//! (`--flat-playlist --dump-single-json`). A document without `entries` is a
//! single item; any failure to list falls back to the original URL.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct FlatDocument {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    playlist_title: Option<String>,
    #[serde(default)]
    entries: Option<Vec<FlatEntry>>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
}

/// A listed playlist: its title and the entry URLs in playlist order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistExpansion {
    pub title: Option<String>,
    pub entries: Vec<String>,
}

impl PlaylistExpansion {
    /// Parses a flat listing. `None` when the document is not a playlist or
    /// lists no usable entry.
    #[must_use]
    pub fn from_flat_json(raw: &str) -> Option<Self> {
        let doc: FlatDocument = serde_json::from_str(raw.trim()).ok()?;
        let entries: Vec<String> = doc
            .entries?
            .into_iter()
            .filter_map(|e| e.url.or(e.webpage_url))
            .map(|u| u.trim().to_string())
            .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
            .collect();
        if entries.is_empty() {
            return None;
        }
        let title = doc
            .title
            .or(doc.playlist_title)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Some(Self { title, entries })
    }
}
