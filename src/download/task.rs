//! One download: a child process, its cancellation flag and its parser.
//!
//! The cancellation flag is the only state shared with the outside world.
//! Everything else (parser state, output tail) is owned by the running task.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};

use super::options::DownloadOptions;
use super::process::{Invocation, ProcessLauncher};
use crate::progress::{ProgressParser, ProgressUpdate};

/// Lines of output kept for failure diagnostics.
const TAIL_LINES: usize = 40;

/// Process-unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A URL plus the options it was submitted with. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub options: DownloadOptions,
}

impl DownloadRequest {
    #[must_use]
    pub fn new(url: impl Into<String>, options: DownloadOptions) -> Self {
        Self {
            url: url.into(),
            options,
        }
    }
}

/// Shared, set-once cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl CancelHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation and wakes the read loop.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.wake.notified().await;
        }
    }
}

/// Terminal result of [`DownloadTask::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Exit code zero; files the tool reported writing.
    Completed { files: Vec<PathBuf> },
    /// Nonzero exit or spawn failure with the combined output tail.
    Failed { code: Option<i32>, diagnostic: String },
    /// Stopped by the caller. `retryable` when no progress was ever seen.
    Cancelled { retryable: bool },
}

/// A single download execution unit.
#[derive(Debug)]
pub struct DownloadTask {
    id: TaskId,
    request: DownloadRequest,
    invocation: Invocation,
    cancel: CancelHandle,
}

impl DownloadTask {
    #[must_use]
    pub fn new(id: TaskId, request: DownloadRequest, invocation: Invocation) -> Self {
        Self {
            id,
            request,
            invocation,
            cancel: CancelHandle::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.request.url
    }

    #[must_use]
    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }

    #[must_use]
    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Handle the owner keeps to cancel this task later.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Spawns the process and consumes its output until exit or cancellation.
    ///
    /// Every parsed update is handed to `on_progress` in line order.
    #[instrument(skip_all, fields(task = %self.id, url = %self.request.url))]
    pub async fn run<F>(self, launcher: &dyn ProcessLauncher, mut on_progress: F) -> TaskOutcome
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        if self.cancel.is_cancelled() {
            return TaskOutcome::Cancelled { retryable: true };
        }

        let mut process = match launcher.launch(&self.invocation).await {
            Ok(process) => process,
            Err(e) => {
                warn!(error = %e, "failed to launch downloader");
                return TaskOutcome::Failed {
                    code: None,
                    diagnostic: e.to_string(),
                };
            }
        };
        info!(program = %self.invocation.program_name(), "download started");

        let mut parser = ProgressParser::new();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);

        loop {
            if self.cancel.is_cancelled() {
                if let Err(e) = process.kill().await {
                    warn!(error = %e, "failed to kill cancelled process");
                }
                let _ = process.wait().await;
                let retryable = !parser.saw_progress();
                info!(retryable, "download cancelled");
                return TaskOutcome::Cancelled { retryable };
            }

            tokio::select! {
                () = self.cancel.cancelled() => {}
                line = process.next_line() => {
                    let Some(line) = line else { break };
                    if tail.len() == TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.clone());
                    if let Some(update) = parser.feed(&line) {
                        on_progress(update);
                    }
                }
            }
        }

        let exit = process.wait().await;
        if self.cancel.is_cancelled() {
            return TaskOutcome::Cancelled {
                retryable: !parser.saw_progress(),
            };
        }

        match exit {
            Ok(Some(0)) => {
                let files = parser.reported_files().to_vec();
                debug!(files = files.len(), "download process exited cleanly");
                TaskOutcome::Completed { files }
            }
            Ok(code) => {
                warn!(?code, "download process failed");
                TaskOutcome::Failed {
                    code,
                    diagnostic: tail.into_iter().collect::<Vec<_>>().join("\n"),
                }
            }
            Err(e) => TaskOutcome::Failed {
                code: None,
                diagnostic: e.to_string(),
            },
        }
    }
}
