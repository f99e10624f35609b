//! Error types for the download module.
//!
//! [`ValidationError`] covers everything rejected before a process exists;
//! [`DownloadError`] covers failures to prepare or spawn one.

use std::path::PathBuf;

use thiserror::Error;

/// A request rejected at submission time. Never occupies a queue slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Not an http(s) URL.
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// A search-results page rather than a media page.
    #[error("search result pages cannot be downloaded: {url}")]
    SearchPage { url: String },

    /// The downloader does not support this source.
    #[error("unsupported source {url}: {reason}")]
    Unsupported { url: String, reason: String },

    /// Audio-only and metadata-only were both requested.
    #[error("audio-only and metadata-only cannot be combined")]
    ConflictingModes,

    #[error("invalid rate limit '{0}': expected e.g. 500K, 2M, 1G")]
    InvalidRateLimit(String),

    #[error("invalid output template '{0}': must be non-empty and contain %(ext)s")]
    InvalidOutputTemplate(String),

    #[error("invalid video quality '{0}': expected `best` or a height like `720p`")]
    InvalidQuality(String),

    #[error("invalid audio quality '{0}': expected `best`, 0-10 or a bitrate like `192k`")]
    InvalidAudioQuality(String),

    /// Arguments could not be prepared (e.g. unwritable scratch directory).
    #[error("cannot prepare download for {url}: {reason}")]
    Preparation { url: String, reason: String },
}

/// Errors that can occur preparing or launching a download process.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request options did not validate.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The scratch directory is missing and cannot be created or written.
    #[error("output directory is not writable: {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tool binary could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on or killing the child failed.
    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages_name_the_value() {
        let err = ValidationError::InvalidRateLimit("fast".to_string());
        assert!(err.to_string().contains("fast"));
        let err = ValidationError::SearchPage {
            url: "https://www.youtube.com/results?search_query=x".to_string(),
        };
        assert!(err.to_string().contains("search"));
    }

    #[test]
    fn test_download_error_wraps_validation_transparently() {
        let err: DownloadError = ValidationError::ConflictingModes.into();
        assert_eq!(
            err.to_string(),
            "audio-only and metadata-only cannot be combined"
        );
    }

    #[test]
    fn test_spawn_error_names_program() {
        let err = DownloadError::Spawn {
            program: "yt-dlp".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("yt-dlp"));
    }
}
