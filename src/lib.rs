//! Media download queue core library.
//!
//! This library drives an external downloader tool (`yt-dlp`, or `gallery-dl`
//! for image sites) through a bounded queue, turns its output into progress
//! updates, and files finished downloads according to user sorting rules.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`queue`] - Admission, bounded concurrency and the observer event stream
//! - [`download`] - Tool arguments, process spawning and one task's lifecycle
//! - [`progress`] - Tool output parsing and progress coalescing
//! - [`relocate`] - Locating finished files and moving them to their destination
//! - [`sorting`] - Sorting rules, subfolder templates and the rules file
//! - [`archive`] - Completed-URL ledger backed by `SQLite`
//! - [`failure`] - Classification of tool diagnostics into user-facing messages
//! - [`config`] - Application settings file
//! - [`input`] - URL extraction and submission-time URL checks
//! - [`metadata`] - Media metadata documents and sidecars
//! - [`db`] - Database connection and schema management

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod config;
pub mod db;
pub mod download;
pub mod failure;
pub mod input;
pub mod metadata;
pub mod progress;
pub mod queue;
pub mod relocate;
pub mod sorting;

// Re-export commonly used types
pub use archive::{ArchiveError, ArchiveRepository, ArchiveStore, normalize_url};
pub use config::{AppConfig, ConfigError, DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
pub use db::{Database, DbError};
pub use download::{
    CancelHandle, DownloadError, DownloadOptions, DownloadRequest, DownloadTask, Invocation,
    PlaylistMode, ProcessLauncher, ProcessOutput, RunningProcess, TaskId, TaskOutcome,
    TokioLauncher, ToolKind, ValidationError, VideoQuality, build_tool_args,
};
pub use failure::{FailureDescriptor, FailureKind, classify_failure, classify_message};
pub use input::{extract_urls, validate_url};
pub use metadata::MediaMetadata;
pub use progress::{Phase, ProgressCoalescer, ProgressParser, ProgressUpdate};
pub use queue::{
    IndexError, PlaylistExpansion, QueueEvent, QueueScheduler, QueueSnapshot, RunSummary,
    SubmitOutcome,
};
pub use relocate::{FileRelocator, RelocationJob, RelocationReport, RelocationSettings};
pub use sorting::{DownloadType, RuleStore, RulesError, SortingRule};
