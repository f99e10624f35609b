//! Child-process seam for the external tools.
//!
//! [`ProcessLauncher`] is the only place a process is created, so the
//! scheduler and tasks can be driven by a scripted launcher in tests.
//! [`TokioLauncher`] spawns real children with stdout and stderr merged into a
//! single line stream.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace};

use super::error::DownloadError;

/// Lines buffered between the pipe readers and the consumer.
const LINE_CHANNEL_CAPACITY: usize = 512;

/// `[program, ...args, url]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub url: String,
}

impl Invocation {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, url: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            url: url.into(),
        }
    }

    /// Arguments after the program, URL last. An empty URL is omitted.
    #[must_use]
    pub fn argv(&self) -> Vec<OsString> {
        self.args
            .iter()
            .map(OsString::from)
            .chain((!self.url.is_empty()).then(|| OsString::from(&self.url)))
            .collect()
    }

    /// True when `flag` appears among the arguments.
    #[must_use]
    pub fn has_arg(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    /// Program name for logs and errors.
    #[must_use]
    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// Captured result of a run-to-completion invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A spawned child whose merged output is consumed line by line.
#[async_trait]
pub trait RunningProcess: Send {
    /// Next output line without its terminator; `None` once both pipes close.
    ///
    /// Must be cancel-safe: dropping the future loses no line.
    async fn next_line(&mut self) -> Option<String>;

    /// Terminates the child.
    async fn kill(&mut self) -> Result<(), DownloadError>;

    /// Waits for exit and returns the code (`None` when killed by a signal).
    async fn wait(&mut self) -> Result<Option<i32>, DownloadError>;
}

/// Process factory.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Spawns a streaming child.
    async fn launch(&self, invocation: &Invocation)
    -> Result<Box<dyn RunningProcess>, DownloadError>;

    /// Runs to completion, capturing both pipes.
    async fn output(&self, invocation: &Invocation) -> Result<ProcessOutput, DownloadError>;
}

/// Launcher backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLauncher;

impl TokioLauncher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn command(invocation: &Invocation) -> Command {
        let mut cmd = tokio_command(&invocation.program);
        cmd.args(invocation.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    #[instrument(skip(self, invocation), fields(program = %invocation.program.display(), url = %invocation.url))]
    async fn launch(
        &self,
        invocation: &Invocation,
    ) -> Result<Box<dyn RunningProcess>, DownloadError> {
        let mut child = Self::command(invocation)
            .spawn()
            .map_err(|source| DownloadError::Spawn {
                program: invocation.program_name(),
                source,
            })?;
        debug!(pid = ?child.id(), "child spawned");

        let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx));
        }
        Ok(Box::new(TokioProcess { child, lines: rx }))
    }

    #[instrument(skip(self, invocation), fields(program = %invocation.program.display(), url = %invocation.url))]
    async fn output(&self, invocation: &Invocation) -> Result<ProcessOutput, DownloadError> {
        let output = Self::command(invocation)
            .output()
            .await
            .map_err(|source| DownloadError::Spawn {
                program: invocation.program_name(),
                source,
            })?;
        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

struct TokioProcess {
    child: Child,
    lines: mpsc::Receiver<String>,
}

#[async_trait]
impl RunningProcess for TokioProcess {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    async fn kill(&mut self) -> Result<(), DownloadError> {
        match self.child.kill().await {
            Ok(()) => Ok(()),
            // Already exited.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn wait(&mut self) -> Result<Option<i32>, DownloadError> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }
}

/// Splits a pipe on `\n` (and trailing `\r`), decoding lossily.
async fn forward_lines<R>(pipe: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(['\n', '\r']);
                // Progress redraws without --newline arrive as \r-separated chunks.
                for part in line.split('\r').filter(|p| !p.is_empty()) {
                    trace!(line = %part, "tool output");
                    if tx.send(part.to_string()).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "output pipe read failed");
                break;
            }
        }
    }
}

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Creates a `tokio::process::Command` that opens no console window on Windows.
fn tokio_command(program: impl AsRef<std::ffi::OsStr>) -> Command {
    #[allow(unused_mut)]
    let mut cmd = Command::new(program);
    #[cfg(windows)]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}
