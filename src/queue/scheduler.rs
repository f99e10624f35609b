//! Admission, bounded concurrency and task lifecycle.
//!
//! One `std::sync::Mutex` guards the running set, the FIFO pending list and
//! the concurrency bound. It is only held for bookkeeping and never across an
//! `.await`. Everything slow (probes, processes, relocation) runs on its own
//! tokio task and reports back through the broadcast event stream.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use super::error::IndexError;
use super::event::{QueueEvent, QueueSnapshot, SubmitOutcome};
use super::extractor_index::ExtractorIndex;
use super::playlist::PlaylistExpansion;
use super::summary::RunSummary;
use super::validation::{AdmissionTier, choose_tool, is_fast_track};
use crate::archive::ArchiveRepository;
use crate::config::{AppConfig, MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::download::{
    CancelHandle, DownloadOptions, DownloadRequest, DownloadTask, Invocation, ProcessLauncher,
    PlaylistMode, TaskId, TaskOutcome, ToolKind, ValidationError, VideoQuality, build_tool_args,
};
use crate::failure::{classify_failure, classify_message};
use crate::input::{host_of, validate_url};
use crate::metadata::MediaMetadata;
use crate::progress::ProgressCoalescer;
use crate::relocate::{FileRelocator, RelocationJob, RelocationReport};
use crate::sorting::DownloadType;

/// Events buffered per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 1024;

/// Height at or below which a "best" video download is flagged.
const LOW_QUALITY_HEIGHT: u32 = 480;

/// A task waiting for a slot, with what it needs once started.
struct QueuedTask {
    task: DownloadTask,
    tool: ToolKind,
    scratch_dir: PathBuf,
}

struct RunningEntry {
    id: TaskId,
    cancel: CancelHandle,
}

struct QueueState {
    running: Vec<RunningEntry>,
    pending: VecDeque<QueuedTask>,
    max_concurrency: usize,
    /// Probes still deciding whether to admit.
    probing: usize,
    /// Bumped by `cancel_all`; a probe started under an older value is
    /// cancelled instead of admitted.
    cancel_generation: u64,
}

struct Inner {
    config: AppConfig,
    launcher: Arc<dyn ProcessLauncher>,
    archive: Arc<dyn ArchiveRepository>,
    relocator: Arc<FileRelocator>,
    index: RwLock<ExtractorIndex>,
    state: Mutex<QueueState>,
    events: broadcast::Sender<QueueEvent>,
    /// Probes in flight plus tasks not yet fully settled.
    outstanding: watch::Sender<usize>,
    next_id: AtomicU64,
    /// URL → originally submitted request, for retry.
    requests: DashMap<String, DownloadRequest>,
    /// URL → where the finished download ended up.
    resolved_paths: DashMap<String, PathBuf>,
    metadata: DashMap<TaskId, MediaMetadata>,
    summary: Mutex<RunSummary>,
}

/// The download queue. Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct QueueScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for QueueScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueScheduler")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

/// Clamps a requested bound into the supported range.
#[must_use]
pub fn clamp_concurrency(n: usize) -> usize {
    n.clamp(usize::from(MIN_CONCURRENCY), usize::from(MAX_CONCURRENCY))
}

impl QueueScheduler {
    /// Builds a scheduler. The extractor index is read from the state
    /// directory; an unreadable index is treated as empty.
    pub fn new(
        config: AppConfig,
        launcher: Arc<dyn ProcessLauncher>,
        archive: Arc<dyn ArchiveRepository>,
        relocator: Arc<FileRelocator>,
    ) -> Self {
        let index = ExtractorIndex::load(&config.extractor_index_path()).unwrap_or_else(|e| {
            warn!(error = %e, "ignoring unreadable extractor index");
            ExtractorIndex::default()
        });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (outstanding, _) = watch::channel(0);
        let max_concurrency = clamp_concurrency(usize::from(config.max_concurrency));
        Self {
            inner: Arc::new(Inner {
                config,
                launcher,
                archive,
                relocator,
                index: RwLock::new(index),
                state: Mutex::new(QueueState {
                    running: Vec::new(),
                    pending: VecDeque::new(),
                    max_concurrency,
                    probing: 0,
                    cancel_generation: 0,
                }),
                events,
                outstanding,
                next_id: AtomicU64::new(0),
                requests: DashMap::new(),
                resolved_paths: DashMap::new(),
                metadata: DashMap::new(),
                summary: Mutex::new(RunSummary::default()),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// New receiver for every subsequent event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Validates and admits a URL.
    ///
    /// Checks run in order: URL shape and options, the archive (unless
    /// `options.redownload`), then the admission tiers. Fast-track and index
    /// hits are admitted immediately; everything else is probed in the
    /// background and reported through events.
    #[instrument(skip(self, options), fields(url = %url.trim()))]
    pub async fn submit(&self, url: &str, options: DownloadOptions) -> SubmitOutcome {
        let url = url.trim().to_string();
        let checked = validate_url(&url).and_then(|parsed| options.validate().map(|()| parsed));
        let parsed = match checked {
            Ok(parsed) => parsed,
            Err(error) => {
                self.inner.reject(&url, error.clone());
                return SubmitOutcome::Rejected(error);
            }
        };

        if !options.redownload && self.inner.archive.is_archived(&url).await {
            info!("already downloaded; waiting for an explicit re-download");
            self.inner
                .emit(QueueEvent::DuplicateDetected { url: url.clone() });
            return SubmitOutcome::Duplicate;
        }

        let request = DownloadRequest::new(url.clone(), options);
        self.inner.requests.insert(url.clone(), request.clone());

        let tool = choose_tool(&parsed, &request.options);
        let tier = if tool == ToolKind::Gallery {
            AdmissionTier::Probe
        } else if is_fast_track(&url) {
            AdmissionTier::FastTrack
        } else if self.inner.index_supports(&host_of(&parsed)) {
            AdmissionTier::Index
        } else {
            AdmissionTier::Probe
        };
        debug!(?tier, ?tool, "admission tier chosen");

        match tier {
            AdmissionTier::Probe => {
                self.inner.spawn_probe(request, tool);
                SubmitOutcome::Probing
            }
            AdmissionTier::FastTrack | AdmissionTier::Index => {
                match self.inner.admit(request, tool) {
                    Ok((id, started)) => SubmitOutcome::Admitted { id, started },
                    Err(error) => SubmitOutcome::Rejected(error),
                }
            }
        }
    }

    /// Resubmits `url` with its original options and the archive check off.
    /// `None` when the URL was never submitted.
    pub async fn retry(&self, url: &str) -> Option<SubmitOutcome> {
        let request = self.inner.requests.get(url.trim()).map(|r| r.clone())?;
        Some(
            self.submit(&request.url, request.options.with_redownload())
                .await,
        )
    }

    /// Submits `url`, first listing it as a playlist when the playlist mode
    /// is `Ask` and the media tool would handle it.
    ///
    /// Each entry is submitted on its own as a single item, carrying the
    /// playlist title for album backfill and rule playlist context. When the
    /// listing fails or finds no entries, `url` itself is submitted.
    pub async fn submit_expanded(&self, url: &str, options: DownloadOptions) -> Vec<SubmitOutcome> {
        let url = url.trim();
        let Some(expansion) = self.inner.expand_playlist(url, &options).await else {
            return vec![self.submit(url, options).await];
        };
        info!(url = %url, entries = expansion.entries.len(), "expanded playlist");
        let mut outcomes = Vec::with_capacity(expansion.entries.len());
        for entry in &expansion.entries {
            let entry_options = DownloadOptions {
                playlist_mode: PlaylistMode::Single,
                playlist_title: options
                    .playlist_title
                    .clone()
                    .or_else(|| expansion.title.clone()),
                ..options.clone()
            };
            outcomes.push(self.submit(entry, entry_options).await);
        }
        outcomes
    }

    /// Starts pending tasks while slots are free.
    pub fn promote_pending(&self) {
        self.inner.promote_pending();
    }

    /// Sets the bound (clamped to 1..=8) and promotes immediately.
    /// Running tasks are never stopped by a lower bound.
    pub fn set_concurrency_limit(&self, n: usize) -> usize {
        let applied = clamp_concurrency(n);
        self.inner.lock_state().max_concurrency = applied;
        info!(limit = applied, "concurrency limit changed");
        self.inner.promote_pending();
        applied
    }

    /// Cancels a pending or running task. False when the id is unknown.
    ///
    /// A pending task is dropped from the queue and reported as a retryable
    /// cancellation; a running one is signalled and reports when its process
    /// has been stopped.
    pub fn cancel(&self, id: TaskId) -> bool {
        let removed = {
            let mut state = self.inner.lock_state();
            if let Some(pos) = state.pending.iter().position(|q| q.task.id() == id) {
                state.pending.remove(pos)
            } else if let Some(entry) = state.running.iter().find(|e| e.id == id) {
                entry.cancel.cancel();
                return true;
            } else {
                return false;
            }
        };
        if let Some(queued) = removed {
            self.inner.cancel_pending(&queued);
        }
        true
    }

    /// Cancels everything: probes in flight, pending tasks, then running ones.
    ///
    /// A probe that finishes afterwards reports a retryable cancellation and
    /// never admits its URL.
    pub fn cancel_all(&self) -> usize {
        let (pending, running, probing): (Vec<QueuedTask>, Vec<CancelHandle>, usize) = {
            let mut state = self.inner.lock_state();
            state.cancel_generation += 1;
            let pending = state.pending.drain(..).collect();
            let running = state.running.iter().map(|e| e.cancel.clone()).collect();
            (pending, running, state.probing)
        };
        let count = pending.len() + running.len() + probing;
        for queued in &pending {
            self.inner.cancel_pending(queued);
        }
        for handle in running {
            handle.cancel();
        }
        info!(count, "cancelled all tasks");
        count
    }

    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.lock_state();
        QueueSnapshot {
            running: state.running.iter().map(|e| e.id).collect(),
            pending: state.pending.iter().map(|q| q.task.id()).collect(),
            max_concurrency: state.max_concurrency,
        }
    }

    /// Where the finished download of `url` ended up.
    #[must_use]
    pub fn resolved_path(&self, url: &str) -> Option<PathBuf> {
        self.inner.resolved_paths.get(url.trim()).map(|p| p.clone())
    }

    /// Options `url` was originally submitted with.
    #[must_use]
    pub fn request_for(&self, url: &str) -> Option<DownloadRequest> {
        self.inner.requests.get(url.trim()).map(|r| r.clone())
    }

    /// Best-known metadata of an active task.
    #[must_use]
    pub fn metadata(&self, id: TaskId) -> Option<MediaMetadata> {
        self.inner.metadata.get(&id).map(|m| m.clone())
    }

    /// Everything settled so far. Recorded as events are emitted, so it is
    /// complete even when a subscriber lagged.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        self.inner
            .summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolves once no probe or task is outstanding.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Rebuilds the extractor index now and swaps it in.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when the listing or the save fails; the old
    /// index stays in place.
    pub async fn refresh_index(&self) -> Result<usize, IndexError> {
        self.inner.refresh_index().await
    }

    /// Rebuilds the index in the background when it is empty or stale.
    /// Returns true when a rebuild was started.
    pub fn spawn_index_refresh_if_stale(&self) -> bool {
        if self.inner.index_usable() {
            return false;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = inner.refresh_index().await {
                warn!(error = %e, "background extractor index rebuild failed");
            }
        });
        true
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: QueueEvent) {
        self.summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&event);
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn reject(&self, url: &str, error: ValidationError) {
        warn!(url = %url, error = %error, "submission rejected");
        self.emit(QueueEvent::ValidationFailed {
            url: url.to_string(),
            error,
        });
    }

    fn outstanding_add(&self) {
        self.outstanding.send_modify(|n| *n += 1);
    }

    fn outstanding_done(&self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }

    fn index_max_age(&self) -> Duration {
        Duration::from_secs(self.config.index_max_age_hours.saturating_mul(3600))
    }

    fn index_usable(&self) -> bool {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_usable(SystemTime::now(), self.index_max_age())
    }

    /// Empty or stale index answers "unknown", never "unsupported".
    fn index_supports(&self, host: &str) -> bool {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        index.is_usable(SystemTime::now(), self.index_max_age()) && index.supports_host(host)
    }

    async fn refresh_index(&self) -> Result<usize, IndexError> {
        let rebuilt = ExtractorIndex::rebuild(
            self.launcher.as_ref(),
            &self.config.ytdlp_path,
            &self.config.extractor_index_path(),
        )
        .await?;
        let count = rebuilt.entries.len();
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = rebuilt;
        Ok(count)
    }

    fn cookies_args(&self, options: &DownloadOptions, tool: ToolKind) -> Vec<String> {
        let configured = match tool {
            ToolKind::Media => self.config.cookies_from_browser.as_ref(),
            ToolKind::Gallery => self.config.gallery_cookies_from_browser.as_ref(),
        };
        options
            .cookies_from_browser
            .as_ref()
            .or(configured)
            .map(|browser| vec!["--cookies-from-browser".to_string(), browser.clone()])
            .unwrap_or_default()
    }

    fn program(&self, tool: ToolKind) -> PathBuf {
        match tool {
            ToolKind::Media => self.config.ytdlp_path.clone(),
            ToolKind::Gallery => self.config.gallery_dl_path.clone(),
        }
    }

    /// Lightweight "would this download?" run.
    fn probe_invocation(&self, request: &DownloadRequest, tool: ToolKind) -> Invocation {
        let mut args: Vec<String> = match tool {
            ToolKind::Media => [
                "--simulate",
                "--no-warnings",
                "--flat-playlist",
                "--playlist-items",
                "1",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            ToolKind::Gallery => vec!["--simulate".to_string()],
        };
        args.extend(self.cookies_args(&request.options, tool));
        Invocation::new(self.program(tool), args, &request.url)
    }

    fn spawn_probe(self: &Arc<Self>, request: DownloadRequest, tool: ToolKind) {
        self.outstanding_add();
        let generation = {
            let mut state = self.lock_state();
            state.probing += 1;
            state.cancel_generation
        };
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let invocation = inner.probe_invocation(&request, tool);
            let verdict = match inner.launcher.output(&invocation).await {
                Ok(output) if output.success() => Ok(()),
                Ok(output) => Err(classify_message(&format!(
                    "{}\n{}",
                    output.stdout, output.stderr
                ))),
                Err(e) => Err(e.to_string()),
            };
            let cancelled = {
                let mut state = inner.lock_state();
                state.probing = state.probing.saturating_sub(1);
                state.cancel_generation != generation
            };
            match verdict {
                _ if cancelled => {
                    let id = inner.allocate_id();
                    info!(task = %id, url = %request.url, "cancelled while probing");
                    inner.emit(QueueEvent::Cancelled {
                        id,
                        url: request.url.clone(),
                        retryable: true,
                    });
                }
                Ok(()) => {
                    debug!(url = %request.url, "probe confirmed support");
                    // Rejection is already reported by `admit`.
                    let _ = inner.admit(request, tool);
                }
                Err(reason) => {
                    let url = request.url.clone();
                    inner.reject(&url, ValidationError::Unsupported { url: url.clone(), reason });
                }
            }
            inner.outstanding_done();
        });
    }

    fn allocate_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Lists `url` as a playlist. `None` when expansion does not apply or
    /// the listing finds no entries.
    async fn expand_playlist(
        &self,
        url: &str,
        options: &DownloadOptions,
    ) -> Option<PlaylistExpansion> {
        if options.playlist_mode != PlaylistMode::Ask || options.validate().is_err() {
            return None;
        }
        let parsed = validate_url(url).ok()?;
        if choose_tool(&parsed, options) != ToolKind::Media {
            return None;
        }
        let mut args: Vec<String> = ["--flat-playlist", "--dump-single-json", "--no-warnings"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        args.extend(self.cookies_args(options, ToolKind::Media));
        let invocation = Invocation::new(self.program(ToolKind::Media), args, url);
        match self.launcher.output(&invocation).await {
            Ok(output) if output.success() => PlaylistExpansion::from_flat_json(&output.stdout),
            Ok(output) => {
                debug!(url = %url, code = ?output.code, "playlist listing failed; submitting as is");
                None
            }
            Err(e) => {
                warn!(url = %url, error = %e, "playlist listing could not run; submitting as is");
                None
            }
        }
    }

    fn task_scratch_dir(&self, id: TaskId) -> PathBuf {
        self.config.scratch_dir().join(format!("task-{}", id.0))
    }

    /// Creates the task and hands it to `enqueue_or_start`.
    fn admit(
        self: &Arc<Self>,
        request: DownloadRequest,
        tool: ToolKind,
    ) -> Result<(TaskId, bool), ValidationError> {
        let id = self.allocate_id();
        let scratch_dir = self.task_scratch_dir(id);
        let args = match build_tool_args(&request.options, &self.config, &scratch_dir, tool) {
            Ok(args) => args,
            Err(e) => {
                let error = ValidationError::Preparation {
                    url: request.url.clone(),
                    reason: e.to_string(),
                };
                self.reject(&request.url, error.clone());
                return Err(error);
            }
        };
        let invocation = Invocation::new(self.program(tool), args, &request.url);
        let prefetch = tool == ToolKind::Media;
        let task = DownloadTask::new(id, request.clone(), invocation);

        self.outstanding_add();
        let started = self.enqueue_or_start(QueuedTask {
            task,
            tool,
            scratch_dir,
        });
        if prefetch {
            self.spawn_metadata_prefetch(id, &request);
        }
        Ok((id, started))
    }

    /// Starts the task if a slot is free, else appends it to the FIFO.
    /// Observers always hear about the task first.
    fn enqueue_or_start(self: &Arc<Self>, queued: QueuedTask) -> bool {
        let id = queued.task.id();
        let url = queued.task.url().to_string();
        let to_start = {
            let mut state = self.lock_state();
            if state.running.len() < state.max_concurrency {
                state.running.push(RunningEntry {
                    id,
                    cancel: queued.task.cancel_handle(),
                });
                Some(queued)
            } else {
                state.pending.push_back(queued);
                None
            }
        };
        let started = to_start.is_some();
        info!(task = %id, url = %url, queued = !started, "task added");
        self.emit(QueueEvent::TaskAdded {
            id,
            url,
            queued: !started,
        });
        if let Some(queued) = to_start {
            self.spawn_task(queued);
        }
        started
    }

    fn promote_pending(self: &Arc<Self>) {
        let ready: Vec<QueuedTask> = {
            let mut state = self.lock_state();
            let mut ready = Vec::new();
            while state.running.len() < state.max_concurrency {
                let Some(queued) = state.pending.pop_front() else {
                    break;
                };
                state.running.push(RunningEntry {
                    id: queued.task.id(),
                    cancel: queued.task.cancel_handle(),
                });
                ready.push(queued);
            }
            ready
        };
        for queued in ready {
            debug!(task = %queued.task.id(), "promoting pending task");
            self.spawn_task(queued);
        }
    }

    fn cancel_pending(&self, queued: &QueuedTask) {
        let id = queued.task.id();
        info!(task = %id, "pending task cancelled");
        self.emit(QueueEvent::Cancelled {
            id,
            url: queued.task.url().to_string(),
            retryable: true,
        });
        self.metadata.remove(&id);
        self.outstanding_done();
    }

    fn spawn_task(self: &Arc<Self>, queued: QueuedTask) {
        let QueuedTask {
            task,
            tool,
            scratch_dir,
        } = queued;
        let id = task.id();
        self.emit(QueueEvent::TaskStarted {
            id,
            url: task.url().to_string(),
        });
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let request = task.request().clone();
            let events = inner.events.clone();
            let mut coalescer = ProgressCoalescer::default();
            let outcome = task
                .run(inner.launcher.as_ref(), move |update| {
                    if coalescer.admit(&update) {
                        let _ = events.send(QueueEvent::Progress { id, update });
                    }
                })
                .await;
            inner.complete(id, &request, tool, scratch_dir, outcome).await;
        });
    }

    /// Frees the slot, promotes, then settles the outcome.
    async fn complete(
        self: &Arc<Self>,
        id: TaskId,
        request: &DownloadRequest,
        tool: ToolKind,
        scratch_dir: PathBuf,
        outcome: TaskOutcome,
    ) {
        self.lock_state().running.retain(|e| e.id != id);
        self.promote_pending();

        match outcome {
            TaskOutcome::Completed { files } => {
                self.finish_success(id, request, tool, scratch_dir, files)
                    .await;
            }
            TaskOutcome::Failed { code, diagnostic } => {
                let kind = classify_failure(&diagnostic).kind;
                let mut message = classify_message(&diagnostic);
                if let Some(code) = code.filter(|_| diagnostic.trim().is_empty()) {
                    message = format!("{message} (exit code {code})");
                }
                warn!(task = %id, ?code, kind = kind.label(), "download failed");
                self.emit(QueueEvent::Failed {
                    id,
                    url: request.url.clone(),
                    kind,
                    message,
                });
            }
            TaskOutcome::Cancelled { retryable } => {
                self.emit(QueueEvent::Cancelled {
                    id,
                    url: request.url.clone(),
                    retryable,
                });
            }
        }
        self.metadata.remove(&id);
        self.outstanding_done();
    }

    async fn finish_success(
        &self,
        id: TaskId,
        request: &DownloadRequest,
        tool: ToolKind,
        scratch_dir: PathBuf,
        files: Vec<PathBuf>,
    ) {
        let options = &request.options;
        let download_type = options.download_type(tool == ToolKind::Gallery);
        let job = RelocationJob {
            url: request.url.clone(),
            reported_files: files,
            scratch_dir,
            default_target: self.config.completed_dir.clone(),
            metadata: self.metadata.get(&id).map(|m| m.clone()).unwrap_or_default(),
            download_type,
            playlist_title: options.playlist_title.clone(),
            keep_subtitle_files: options.keep_subtitle_files,
            remove_empty_scratch: true,
        };
        let relocator = Arc::clone(&self.relocator);
        let report: Option<RelocationReport> =
            match tokio::task::spawn_blocking(move || relocator.relocate(&job)).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(task = %id, error = %e, "relocation task did not finish");
                    None
                }
            };

        self.archive.mark_archived(&request.url).await;

        let (final_path, moved) = match &report {
            Some(report) => {
                self.resolved_paths
                    .insert(request.url.clone(), report.final_path.clone());
                (report.final_path.clone(), report.moved.len())
            }
            None => (self.config.completed_dir.clone(), 0),
        };

        if download_type == DownloadType::Video
            && options.effective_video_quality(&self.config) == VideoQuality::Best
        {
            let height = report.as_ref().and_then(|r| r.metadata.height());
            if let Some(height) = height.filter(|h| (1..=LOW_QUALITY_HEIGHT).contains(h)) {
                warn!(task = %id, height, "best-quality request produced low resolution");
                self.emit(QueueEvent::LowQualityWarning {
                    id,
                    url: request.url.clone(),
                    height,
                });
            }
        }

        info!(task = %id, path = %final_path.display(), moved, "download finished");
        self.emit(QueueEvent::Finished {
            id,
            url: request.url.clone(),
            final_path,
            moved,
        });
    }

    fn spawn_metadata_prefetch(self: &Arc<Self>, id: TaskId, request: &DownloadRequest) {
        let mut args: Vec<String> = [
            "--dump-single-json",
            "--skip-download",
            "--no-playlist",
            "--no-warnings",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
        args.extend(self.cookies_args(&request.options, ToolKind::Media));
        let invocation = Invocation::new(self.program(ToolKind::Media), args, &request.url);
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let output = match inner.launcher.output(&invocation).await {
                Ok(output) if output.success() => output,
                Ok(output) => {
                    debug!(task = %id, code = ?output.code, "metadata prefetch failed");
                    return;
                }
                Err(e) => {
                    debug!(task = %id, error = %e, "metadata prefetch could not run");
                    return;
                }
            };
            let Some(metadata) = MediaMetadata::from_json_str(&output.stdout) else {
                debug!(task = %id, "metadata prefetch returned no JSON object");
                return;
            };
            let title = metadata.title();
            inner.metadata.insert(id, metadata);
            // The task may have settled meanwhile; its cleanup already ran.
            if !inner.is_active(id) {
                inner.metadata.remove(&id);
                return;
            }
            inner.emit(QueueEvent::MetadataResolved { id, title });
        });
    }

    fn is_active(&self, id: TaskId) -> bool {
        let state = self.lock_state();
        state.running.iter().any(|e| e.id == id) || state.pending.iter().any(|q| q.task.id() == id)
    }
}
