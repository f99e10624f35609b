//! The download queue.
//!
//! Submissions pass through admission (URL shape, archive, then one of three
//! support checks) before becoming [`DownloadTask`](crate::download::DownloadTask)s.
//! At most `max_concurrency` tasks run at once; the rest wait in FIFO order.
//!
//! # Overview
//!
//! - [`QueueScheduler`] - submission, cancellation, concurrency bound
//! - [`QueueEvent`] - everything observers hear about
//! - [`RunSummary`] - lossless tallies of settled outcomes
//! - [`PlaylistExpansion`] - playlist URLs listed into their entries
//! - [`ExtractorIndex`] - cached list of supported sites
//! - [`IndexError`] - index maintenance errors
//!
//! # Example
//!
//! ```ignore
//! use mediadl_core::queue::{QueueEvent, QueueScheduler};
//!
//! let scheduler = QueueScheduler::new(config, launcher, archive, relocator);
//! let mut events = scheduler.subscribe();
//! scheduler.submit("https://youtu.be/abc", DownloadOptions::default()).await;
//! while let Ok(event) = events.recv().await {
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! ```

mod error;
mod event;
mod extractor_index;
mod playlist;
mod scheduler;
mod summary;
mod validation;

pub use error::IndexError;
pub use event::{QueueEvent, QueueSnapshot, SubmitOutcome};
pub use extractor_index::{ExtractorEntry, ExtractorIndex, INDEX_FILE_NAME};
pub use playlist::PlaylistExpansion;
pub use scheduler::{QueueScheduler, clamp_concurrency};
pub use summary::RunSummary;
pub use validation::{AdmissionTier, choose_tool, is_fast_track, is_gallery_host};
