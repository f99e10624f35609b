//! CLI entry point for mediadl.

use std::process::ExitCode;

mod app;
mod cli;
mod commands;
mod output;

/// Outcome the process exits with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every submitted download completed (or there was nothing to do).
    Success,
    /// At least one download failed, was cancelled or was rejected.
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match app::runtime::run_mediadl().await {
        Ok(exit) => exit.into(),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::from(1)
        }
    }
}
