//! Post-download media metadata.
//!
//! The downloader writes an `.info.json` sidecar next to each media file with
//! an open-ended set of fields. Sorting rules may reference any of them, so the
//! snapshot keeps the raw JSON object and exposes typed accessors for the
//! fields this crate interprets itself.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

/// Suffix the downloader uses for metadata sidecars.
pub const INFO_JSON_SUFFIX: &str = ".info.json";

/// Metadata keys whose non-empty presence marks a playlist item.
const PLAYLIST_KEYS: &[&str] = &["playlist", "playlist_title", "playlist_id", "playlist_index"];

/// Best-known metadata for one download.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMetadata {
    fields: Map<String, Value>,
}

impl MediaMetadata {
    /// Empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an already parsed JSON object.
    #[must_use]
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Parses a JSON document; anything but an object yields `None`.
    #[must_use]
    pub fn from_json_str(raw: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(Value::Object(fields)) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Reads a sidecar file, returning `None` when it is missing or malformed.
    #[must_use]
    pub fn read_sidecar(path: &Path) -> Option<Self> {
        let raw = fs::read_to_string(path).ok()?;
        let parsed = Self::from_json_str(&raw);
        if parsed.is_none() {
            debug!(path = %path.display(), "metadata sidecar is not a JSON object");
        }
        parsed
    }

    /// Raw field access.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    /// Inserts or replaces a field.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// True when no fields are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over all fields.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// String view of a scalar field.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Numeric view of a field (numbers and numeric strings).
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn title(&self) -> Option<String> {
        self.get_str("title")
    }

    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.get_str("id")
    }

    /// Uploader, falling back to channel.
    #[must_use]
    pub fn uploader(&self) -> Option<String> {
        self.get_str("uploader").or_else(|| self.get_str("channel"))
    }

    #[must_use]
    pub fn duration(&self) -> Option<f64> {
        self.get_f64("duration")
    }

    #[must_use]
    pub fn height(&self) -> Option<u32> {
        self.get_f64("height")
            .filter(|h| h.is_finite() && *h >= 0.0)
            .map(|h| h.round() as u32)
    }

    #[must_use]
    pub fn album(&self) -> Option<String> {
        self.get_str("album")
    }

    /// True when any playlist key carries a real value.
    #[must_use]
    pub fn is_playlist_item(&self) -> bool {
        PLAYLIST_KEYS.iter().any(|key| {
            self.get_str(key)
                .is_some_and(|v| !v.trim().is_empty() && v != "NA")
        })
    }

    /// Fills every field absent here from `other`.
    pub fn merge_missing_from(&mut self, other: &Self) {
        for (key, value) in &other.fields {
            if self.get(key).is_none() && !value.is_null() {
                self.fields.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Path of the `.info.json` sidecar belonging to `media`.
///
/// `Title [id].mp4` → `Title [id].info.json`.
#[must_use]
pub fn sidecar_path_for(media: &Path) -> PathBuf {
    let stem = media
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    media.with_file_name(format!("{stem}{INFO_JSON_SUFFIX}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_read_typed_fields() {
        let meta = MediaMetadata::from_json_str(
            r#"{"title":"Clip","id":"abc","duration":"700","height":480,"channel":"Chan"}"#,
        )
        .unwrap();
        assert_eq!(meta.title().as_deref(), Some("Clip"));
        assert_eq!(meta.duration(), Some(700.0));
        assert_eq!(meta.height(), Some(480));
        assert_eq!(meta.uploader().as_deref(), Some("Chan"));
    }

    #[test]
    fn test_non_object_json_is_rejected() {
        assert!(MediaMetadata::from_json_str("[1,2]").is_none());
        assert!(MediaMetadata::from_json_str("nope").is_none());
    }

    #[test]
    fn test_playlist_detection_ignores_na() {
        let mut meta = MediaMetadata::new();
        meta.set("playlist", "NA");
        assert!(!meta.is_playlist_item());
        meta.set("playlist_index", 3);
        assert!(meta.is_playlist_item());
    }

    #[test]
    fn test_merge_missing_keeps_existing_values() {
        let mut fresh = MediaMetadata::new();
        fresh.set("title", "New");
        let mut old = MediaMetadata::new();
        old.set("title", "Old");
        old.set("album", "LP");

        fresh.merge_missing_from(&old);

        assert_eq!(fresh.title().as_deref(), Some("New"));
        assert_eq!(fresh.album().as_deref(), Some("LP"));
    }

    #[test]
    fn test_sidecar_path_for_media() {
        let path = sidecar_path_for(Path::new("/tmp/Song [x1].mp3"));
        assert_eq!(path, PathBuf::from("/tmp/Song [x1].info.json"));
    }
}
