//! Error types for the extractor index.
//!
//! The scheduler itself never fails a submission with an error value: every
//! rejection becomes a [`QueueEvent`](super::QueueEvent). Only index
//! maintenance, which the CLI can run directly, reports errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::download::DownloadError;

/// Errors from loading, saving or rebuilding the extractor index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to read extractor index {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "extractor index {path} is malformed: {source}\n  Suggestion: Run `mediadl index rebuild`"
    )]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write extractor index {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize extractor index: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The downloader could not be run.
    #[error(transparent)]
    Launch(#[from] DownloadError),

    /// The downloader ran but did not list its extractors.
    #[error(
        "extractor listing failed (exit {code:?}): {stderr}\n  Suggestion: Check that the downloader binary is installed and up to date"
    )]
    Listing { code: Option<i32>, stderr: String },
}
