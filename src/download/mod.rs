//! Download execution: request options, tool arguments, child processes and
//! the task that ties them together.
//!
//! Submission-time checks live in [`DownloadOptions::validate`]; everything
//! after that is a [`DownloadTask`] driving one external process through a
//! [`ProcessLauncher`].

mod args;
mod error;
mod options;
mod process;
mod task;

pub use args::{ToolKind, build_tool_args};
pub use error::{DownloadError, ValidationError};
pub use options::{DownloadOptions, PlaylistMode, VideoQuality, normalize_rate_limit};
pub use process::{Invocation, ProcessLauncher, ProcessOutput, RunningProcess, TokioLauncher};
pub use task::{CancelHandle, DownloadRequest, DownloadTask, TaskId, TaskOutcome};
