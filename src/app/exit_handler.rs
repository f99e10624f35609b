//! Exit code logic for the mediadl process.
//!
//! Single responsibility: map the scheduler's run tallies to the process exit outcome.

use crate::ProcessExit;
use mediadl_core::RunSummary;

/// Success only when nothing failed, was cancelled or was rejected.
/// Archive duplicates are skips, not failures.
pub(crate) fn determine_exit_outcome(summary: &RunSummary, interrupted: bool) -> ProcessExit {
    if interrupted || summary.has_problems() {
        ProcessExit::Failure
    } else {
        ProcessExit::Success
    }
}
