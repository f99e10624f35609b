//! Rate limiting for progress updates headed to a UI.

use std::time::{Duration, Instant};

use super::parser::{Phase, ProgressUpdate};

/// Default minimum spacing between delivered updates.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(150);

/// Drops near-identical or too-frequent updates for one task.
///
/// The first update, phase changes and a 100% reading always pass.
#[derive(Debug)]
pub struct ProgressCoalescer {
    min_interval: Duration,
    last_sent: Option<(Instant, ProgressUpdate)>,
}

impl Default for ProgressCoalescer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

impl ProgressCoalescer {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: None,
        }
    }

    /// Returns true when `update` should be delivered now.
    pub fn admit(&mut self, update: &ProgressUpdate) -> bool {
        self.admit_at(update, Instant::now())
    }

    /// [`admit`](Self::admit) with an explicit clock, for tests.
    pub fn admit_at(&mut self, update: &ProgressUpdate, now: Instant) -> bool {
        let deliver = match &self.last_sent {
            None => true,
            Some((_, last)) if last == update => false,
            Some((_, last)) if last.phase != update.phase => true,
            Some(_) if update.percent.is_some_and(|p| p >= 100.0) => true,
            Some(_) if update.phase == Phase::Postprocessing => false,
            Some((at, _)) => now.saturating_duration_since(*at) >= self.min_interval,
        };
        if deliver {
            self.last_sent = Some((now, update.clone()));
        }
        deliver
    }
}
