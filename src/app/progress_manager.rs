//! Progress UI for download runs: one bar per task, fed by the queue's event stream.

use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use mediadl_core::{QueueEvent, TaskId};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Renders bars for live tasks. A no-op when bars are disabled.
struct BarBoard {
    multi: Option<MultiProgress>,
    bars: HashMap<TaskId, ProgressBar>,
}

impl BarBoard {
    fn new(enabled: bool) -> Self {
        Self {
            multi: enabled.then(MultiProgress::new),
            bars: HashMap::new(),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template("{prefix:>4} [{bar:30}] {pos:>3}% {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }

    fn add(&mut self, id: TaskId, url: &str, queued: bool) {
        let Some(multi) = &self.multi else {
            return;
        };
        let bar = multi.add(ProgressBar::new(100));
        bar.set_style(Self::style());
        bar.set_prefix(id.to_string());
        bar.set_message(if queued {
            format!("queued {url}")
        } else {
            url.to_string()
        });
        bar.enable_steady_tick(Duration::from_millis(200));
        self.bars.insert(id, bar);
    }

    fn apply(&mut self, event: &QueueEvent) {
        match event {
            QueueEvent::TaskAdded { id, url, queued } => self.add(*id, url, *queued),
            QueueEvent::TaskStarted { id, url } => {
                if let Some(bar) = self.bars.get(id) {
                    bar.set_message(url.clone());
                }
            }
            QueueEvent::Progress { id, update } => {
                if let Some(bar) = self.bars.get(id) {
                    if let Some(percent) = update.percent {
                        bar.set_position(percent_position(percent));
                    }
                    bar.set_message(update.text.clone());
                }
            }
            QueueEvent::MetadataResolved {
                id,
                title: Some(title),
            } => {
                if let Some(bar) = self.bars.get(id) {
                    bar.set_prefix(format!("{id} {title}"));
                }
            }
            QueueEvent::Finished { id, final_path, .. } => {
                if let Some(bar) = self.bars.remove(id) {
                    bar.set_position(100);
                    bar.finish_with_message(format!("done → {}", final_path.display()));
                }
            }
            QueueEvent::Failed { id, message, .. } => {
                if let Some(bar) = self.bars.remove(id) {
                    bar.abandon_with_message(format!("failed: {message}"));
                }
            }
            QueueEvent::Cancelled { id, .. } => {
                if let Some(bar) = self.bars.remove(id) {
                    bar.abandon_with_message("cancelled");
                }
            }
            _ => {}
        }
    }

    fn clear(&mut self) {
        for (_, bar) in self.bars.drain() {
            bar.finish_and_clear();
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent_position(percent: f64) -> u64 {
    percent.clamp(0.0, 100.0).round() as u64
}

/// Logs what the bars do not show.
fn log_event(event: &QueueEvent) {
    match event {
        QueueEvent::Finished {
            id,
            url,
            final_path,
            moved,
        } => info!(task = %id, url = %url, path = %final_path.display(), moved, "Download finished"),
        QueueEvent::Failed { id, url, message, .. } => {
            warn!(task = %id, url = %url, "Download failed: {message}");
        }
        QueueEvent::Cancelled { id, url, .. } => info!(task = %id, url = %url, "Download cancelled"),
        QueueEvent::DuplicateDetected { url } => {
            info!(url = %url, "Already downloaded; use --force to download again");
        }
        QueueEvent::ValidationFailed { url, error } => warn!(url = %url, "Rejected: {error}"),
        QueueEvent::LowQualityWarning { id, url, height } => warn!(
            task = %id,
            url = %url,
            height,
            "Best quality was requested but only {height}p was available"
        ),
        _ => {}
    }
}

/// Consumes events until `stop` flips, then drains what is already queued.
/// Returns how many events were shown. Display only: the run's tallies come
/// from [`QueueScheduler::summary`](mediadl_core::QueueScheduler::summary).
pub(crate) fn spawn_event_reporter(
    mut events: broadcast::Receiver<QueueEvent>,
    use_bars: bool,
    mut stop: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<u64> {
    tokio::spawn(async move {
        let mut board = BarBoard::new(use_bars);
        let mut shown = 0_u64;
        loop {
            tokio::select! {
                biased;
                received = events.recv() => match received {
                    Ok(event) => {
                        board.apply(&event);
                        log_event(&event);
                        shown += 1;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "progress display fell behind; some events were dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        board.clear();
        shown
    })
}
