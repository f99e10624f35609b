//! Observer-facing types: events, submission outcomes and snapshots.

use std::path::PathBuf;

use crate::download::{TaskId, ValidationError};
use crate::failure::FailureKind;
use crate::progress::ProgressUpdate;

/// Everything the scheduler reports, in the order it happens per task.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// A task object now exists; `queued` when it went to the pending list.
    TaskAdded {
        id: TaskId,
        url: String,
        queued: bool,
    },
    /// The task's process is about to be spawned.
    TaskStarted { id: TaskId, url: String },
    Progress { id: TaskId, update: ProgressUpdate },
    /// Pre-fetched metadata arrived.
    MetadataResolved {
        id: TaskId,
        title: Option<String>,
    },
    /// The process succeeded and relocation finished (whatever it moved).
    Finished {
        id: TaskId,
        url: String,
        final_path: PathBuf,
        moved: usize,
    },
    Failed {
        id: TaskId,
        url: String,
        kind: FailureKind,
        /// Classified, user-facing text.
        message: String,
    },
    Cancelled {
        id: TaskId,
        url: String,
        /// Never made progress; a retry starts from scratch.
        retryable: bool,
    },
    /// Already in the archive; nothing was queued.
    DuplicateDetected { url: String },
    /// Rejected before any queue slot was used.
    ValidationFailed { url: String, error: ValidationError },
    /// A "best" video request came back at or below 480p.
    LowQualityWarning { id: TaskId, url: String, height: u32 },
}

impl QueueEvent {
    /// Task this event belongs to, if any.
    #[must_use]
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::TaskAdded { id, .. }
            | Self::TaskStarted { id, .. }
            | Self::Progress { id, .. }
            | Self::MetadataResolved { id, .. }
            | Self::Finished { id, .. }
            | Self::Failed { id, .. }
            | Self::Cancelled { id, .. }
            | Self::LowQualityWarning { id, .. } => Some(*id),
            Self::DuplicateDetected { .. } | Self::ValidationFailed { .. } => None,
        }
    }

    /// True for events after which the task (or URL) is settled.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished { .. }
                | Self::Failed { .. }
                | Self::Cancelled { .. }
                | Self::DuplicateDetected { .. }
                | Self::ValidationFailed { .. }
        )
    }
}

/// Immediate answer to [`submit`](super::QueueScheduler::submit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A task was created; `started` when it got a slot right away.
    Admitted { id: TaskId, started: bool },
    /// A background probe decides; a later event reports the result.
    Probing,
    /// Archived before and no re-download override.
    Duplicate,
    Rejected(ValidationError),
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueSnapshot {
    pub running: Vec<TaskId>,
    /// FIFO order.
    pub pending: Vec<TaskId>,
    pub max_concurrency: usize,
}
