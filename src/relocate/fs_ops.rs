//! Filesystem primitives used by the relocator.
//!
//! Every rename, copy and delete the relocator performs goes through a
//! [`FileOps`] value so tests can inject failures and so the operations can be
//! logged by wrapping them in [`LoggingFileOps`].

use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

/// Filesystem operations the relocator needs.
pub trait FileOps: Send + Sync {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn remove_dir(&self, path: &Path) -> io::Result<()>;
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// Direct `std::fs` calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileOps;

impl FileOps for StdFileOps {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}

/// Decorator that logs each operation and its result at debug level.
#[derive(Debug, Clone, Default)]
pub struct LoggingFileOps<O> {
    inner: O,
}

impl<O: FileOps> LoggingFileOps<O> {
    pub fn new(inner: O) -> Self {
        Self { inner }
    }
}

impl<O: FileOps> FileOps for LoggingFileOps<O> {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let result = self.inner.rename(from, to);
        debug!(op = "rename", from = %from.display(), to = %to.display(), ok = result.is_ok(), "file op");
        result
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let result = self.inner.copy(from, to);
        debug!(op = "copy", from = %from.display(), to = %to.display(), ok = result.is_ok(), "file op");
        result
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let result = self.inner.remove_file(path);
        debug!(op = "remove_file", path = %path.display(), ok = result.is_ok(), "file op");
        result
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        let result = self.inner.remove_dir(path);
        debug!(op = "remove_dir", path = %path.display(), ok = result.is_ok(), "file op");
        result
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let result = self.inner.create_dir_all(path);
        debug!(op = "create_dir_all", path = %path.display(), ok = result.is_ok(), "file op");
        result
    }
}

/// Bounded linear backoff for moves that hit a locked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRetry {
    pub attempts: u32,
    pub step: Duration,
}

impl Default for MoveRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            step: Duration::from_millis(500),
        }
    }
}

/// Result of one move attempt sequence.
#[derive(Debug)]
pub enum MoveResult {
    Moved,
    /// The source disappeared before it could be moved.
    Vanished,
    Failed(io::Error),
}

/// Another process holds the file open.
fn is_in_use(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::ResourceBusy | io::ErrorKind::ExecutableFileBusy
    ) {
        return true;
    }
    // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
    cfg!(windows) && matches!(err.raw_os_error(), Some(32 | 33))
}

/// Renames `from` to `to`, copying across filesystems and retrying while the
/// source is locked.
pub fn move_with_retry(ops: &dyn FileOps, from: &Path, to: &Path, retry: MoveRetry) -> MoveResult {
    let attempts = retry.attempts.max(1);
    for attempt in 1..=attempts {
        let err = match move_once(ops, from, to) {
            Ok(()) => return MoveResult::Moved,
            Err(e) => e,
        };
        if err.kind() == io::ErrorKind::NotFound && !from.exists() {
            warn!(path = %from.display(), "source vanished before move");
            return MoveResult::Vanished;
        }
        if !is_in_use(&err) || attempt == attempts {
            return MoveResult::Failed(err);
        }
        let delay = retry.step * attempt;
        debug!(path = %from.display(), attempt, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "file in use; retrying move");
        thread::sleep(delay);
    }
    MoveResult::Failed(io::Error::other("move attempts exhausted"))
}

fn move_once(ops: &dyn FileOps, from: &Path, to: &Path) -> io::Result<()> {
    match ops.rename(from, to) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            ops.copy(from, to)?;
            if let Err(e) = ops.remove_file(from) {
                warn!(path = %from.display(), error = %e, "copied across devices but could not remove source");
            }
            Ok(())
        }
        other => other,
    }
}
