//! Outcome tallies kept by the scheduler itself.
//!
//! Observers may lag on the broadcast stream and miss events; these counts
//! are recorded at emit time and never dropped.

use std::path::PathBuf;

use super::event::QueueEvent;

/// Tallies of everything that settled during a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub rejected: usize,
    pub duplicates: usize,
    pub low_quality: usize,
    /// `(url, final path)` of each completed download.
    pub finished: Vec<(String, PathBuf)>,
    /// `(url, message)` of each failure or rejection.
    pub problems: Vec<(String, String)>,
}

impl RunSummary {
    /// Folds one event into the tallies. Non-terminal events are ignored.
    pub fn record(&mut self, event: &QueueEvent) {
        match event {
            QueueEvent::Finished {
                url, final_path, ..
            } => {
                self.completed += 1;
                self.finished.push((url.clone(), final_path.clone()));
            }
            QueueEvent::Failed { url, message, .. } => {
                self.failed += 1;
                self.problems.push((url.clone(), message.clone()));
            }
            QueueEvent::Cancelled { .. } => self.cancelled += 1,
            QueueEvent::ValidationFailed { url, error } => {
                self.rejected += 1;
                self.problems.push((url.clone(), error.to_string()));
            }
            QueueEvent::DuplicateDetected { .. } => self.duplicates += 1,
            QueueEvent::LowQualityWarning { .. } => self.low_quality += 1,
            QueueEvent::TaskAdded { .. }
            | QueueEvent::TaskStarted { .. }
            | QueueEvent::Progress { .. }
            | QueueEvent::MetadataResolved { .. } => {}
        }
    }

    /// True when anything failed, was cancelled or was rejected.
    #[must_use]
    pub fn has_problems(&self) -> bool {
        self.failed > 0 || self.cancelled > 0 || self.rejected > 0
    }
}
