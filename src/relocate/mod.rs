//! Moves finished downloads out of scratch space.
//!
//! [`FileRelocator::relocate`] is synchronous and polls the filesystem, so the
//! scheduler runs it on the blocking pool. Nothing in here fails the download:
//! every problem is logged and the report says what actually moved.

mod fs_ops;
mod locate;
mod probe;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::metadata::{MediaMetadata, sidecar_path_for};
use crate::sorting::{DownloadType, RuleStore};

pub use fs_ops::{FileOps, LoggingFileOps, MoveResult, MoveRetry, StdFileOps, move_with_retry};
pub use locate::{
    bracketed_id, candidate_paths, discover_outputs, first_existing, is_info_sidecar, is_subtitle, is_transient,
    recover_by_tokens, recovery_tokens, subtitle_siblings, unique_destination, wait_until_stable,
};
pub use probe::{FfprobeTagProbe, NoTagProbe, TagProbe};

/// Timing knobs for the stability wait and move retries.
#[derive(Debug, Clone)]
pub struct RelocationSettings {
    pub stability_timeout: Duration,
    pub poll_interval: Duration,
    pub move_retry: MoveRetry,
    /// Extra root for candidate paths and recovery; usually the process cwd.
    pub working_dir: Option<PathBuf>,
}

impl Default for RelocationSettings {
    fn default() -> Self {
        Self {
            stability_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            move_retry: MoveRetry::default(),
            working_dir: std::env::current_dir().ok(),
        }
    }
}

/// Everything the relocator needs to know about one finished task.
#[derive(Debug, Clone)]
pub struct RelocationJob {
    pub url: String,
    /// Paths the tool reported writing. Empty means "look in the scratch dir".
    pub reported_files: Vec<PathBuf>,
    pub scratch_dir: PathBuf,
    /// Where files go when no sorting rule matches.
    pub default_target: PathBuf,
    /// In-memory snapshot; the sidecar wins where both have a field.
    pub metadata: MediaMetadata,
    pub download_type: DownloadType,
    pub playlist_title: Option<String>,
    pub keep_subtitle_files: bool,
    /// Remove `scratch_dir` afterwards if it ended up empty.
    pub remove_empty_scratch: bool,
}

/// What a relocation did.
#[derive(Debug, Clone, PartialEq)]
pub struct RelocationReport {
    /// First moved file, else the target directory.
    pub final_path: PathBuf,
    pub target_dir: PathBuf,
    pub moved: Vec<PathBuf>,
    /// Metadata after sidecar merge and backfill.
    pub metadata: MediaMetadata,
}

/// Routes and moves finished files.
pub struct FileRelocator {
    rules: Arc<RuleStore>,
    ops: Arc<dyn FileOps>,
    probe: Arc<dyn TagProbe>,
    settings: RelocationSettings,
}

impl std::fmt::Debug for FileRelocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRelocator")
            .field("rules", &self.rules.path())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl FileRelocator {
    /// Relocator with logged `std::fs` operations and no tag probe.
    #[must_use]
    pub fn new(rules: Arc<RuleStore>) -> Self {
        Self {
            rules,
            ops: Arc::new(LoggingFileOps::new(StdFileOps)),
            probe: Arc::new(NoTagProbe),
            settings: RelocationSettings::default(),
        }
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn TagProbe>) -> Self {
        self.probe = probe;
        self
    }

    #[must_use]
    pub fn with_file_ops(mut self, ops: Arc<dyn FileOps>) -> Self {
        self.ops = ops;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: RelocationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Moves the job's files to their rule-selected (or default) directory.
    #[instrument(skip_all, fields(url = %job.url))]
    pub fn relocate(&self, job: &RelocationJob) -> RelocationReport {
        let metadata_only = job.download_type == DownloadType::Metadata;
        let sources = self.resolve_sources(job);
        debug!(count = sources.len(), "resolved source files");

        let metadata = self.resolve_metadata(job, &sources);
        let target_dir = self.resolve_target(job, &metadata);

        let mut moved = Vec::new();
        for source in &sources {
            if !wait_until_stable(
                source,
                self.settings.stability_timeout,
                self.settings.poll_interval,
            ) {
                debug!(path = %source.display(), "file did not settle; moving anyway");
            }
            let dest = unique_destination(&target_dir, source);
            if dest == *source {
                moved.push(dest);
                continue;
            }
            match move_with_retry(self.ops.as_ref(), source, &dest, self.settings.move_retry) {
                MoveResult::Moved => {
                    info!(from = %source.display(), to = %dest.display(), "moved download");
                    moved.push(dest);
                }
                MoveResult::Vanished => continue,
                MoveResult::Failed(e) => {
                    warn!(path = %source.display(), error = %e, "failed to move download; leaving it in place");
                    continue;
                }
            }
            if !metadata_only {
                self.clean_up_after(source, &target_dir, job);
            }
        }

        if job.remove_empty_scratch {
            if let Err(e) = self.ops.remove_dir(&job.scratch_dir) {
                debug!(path = %job.scratch_dir.display(), error = %e, "scratch directory kept");
            }
        }

        let final_path = moved.first().cloned().unwrap_or_else(|| target_dir.clone());
        if moved.is_empty() {
            warn!(target = %target_dir.display(), "relocation moved no files");
        }
        RelocationReport {
            final_path,
            target_dir,
            moved,
            metadata,
        }
    }

    fn resolve_sources(&self, job: &RelocationJob) -> Vec<PathBuf> {
        if job.reported_files.is_empty() {
            return discover_outputs(&job.scratch_dir, job.download_type);
        }

        let cwd = self.settings.working_dir.as_deref();
        let mut roots: Vec<&Path> = vec![&job.scratch_dir, &job.default_target];
        roots.extend(cwd);

        let mut sources: Vec<PathBuf> = Vec::new();
        for reported in &job.reported_files {
            if is_transient(reported) {
                continue;
            }
            let candidates =
                candidate_paths(reported, &job.scratch_dir, &job.default_target, cwd);
            let found = first_existing(&candidates).or_else(|| {
                let mut tokens = recovery_tokens(
                    job.metadata.id().as_deref(),
                    job.metadata.title().as_deref(),
                );
                if let Some(id) = bracketed_id(reported) {
                    let id = id.to_lowercase();
                    if !tokens.contains(&id) {
                        tokens.insert(0, id);
                    }
                }
                recover_by_tokens(&roots, &tokens)
            });
            match found {
                Some(path) if !sources.contains(&path) => sources.push(path),
                Some(_) => {}
                None => warn!(path = %reported.display(), "reported file not found"),
            }
        }
        sources
    }

    fn resolve_metadata(&self, job: &RelocationJob, sources: &[PathBuf]) -> MediaMetadata {
        let sidecar = sources.iter().find_map(|s| {
            if is_info_sidecar(s) {
                MediaMetadata::read_sidecar(s)
            } else {
                MediaMetadata::read_sidecar(&sidecar_path_for(s))
            }
        });
        let mut metadata = sidecar.unwrap_or_default();
        metadata.merge_missing_from(&job.metadata);

        if metadata.album().is_none() {
            let probed = sources
                .iter()
                .filter(|s| !is_info_sidecar(s))
                .find_map(|s| self.probe.album(s));
            let fallback = probed.or_else(|| {
                job.playlist_title
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
            });
            if let Some(album) = fallback {
                debug!(album = %album, "backfilled album");
                metadata.set("album", album);
            }
        }
        metadata
    }

    fn resolve_target(&self, job: &RelocationJob, metadata: &MediaMetadata) -> PathBuf {
        let is_playlist = metadata.is_playlist_item() || job.playlist_title.is_some();
        if let Some(dir) = self.rules.evaluate(metadata, job.download_type, is_playlist) {
            match self.ops.create_dir_all(&dir) {
                Ok(()) => return dir,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "cannot create rule target; using default");
                }
            }
        }
        if let Err(e) = self.ops.create_dir_all(&job.default_target) {
            warn!(path = %job.default_target.display(), error = %e, "cannot create default target");
        }
        job.default_target.clone()
    }

    /// Deletes the metadata sidecar and deals with subtitle siblings.
    fn clean_up_after(&self, source: &Path, target_dir: &Path, job: &RelocationJob) {
        let sidecar = sidecar_path_for(source);
        if sidecar.is_file() {
            if let Err(e) = self.ops.remove_file(&sidecar) {
                warn!(path = %sidecar.display(), error = %e, "failed to remove metadata sidecar");
            }
        }

        let Some(stem) = source.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            return;
        };
        let mut dirs: Vec<&Path> = vec![&job.scratch_dir];
        if let Some(parent) = source.parent() {
            if parent != job.scratch_dir {
                dirs.push(parent);
            }
        }
        for dir in dirs {
            for subtitle in subtitle_siblings(dir, &stem) {
                if job.keep_subtitle_files {
                    let dest = unique_destination(target_dir, &subtitle);
                    if let MoveResult::Failed(e) =
                        move_with_retry(self.ops.as_ref(), &subtitle, &dest, self.settings.move_retry)
                    {
                        warn!(path = %subtitle.display(), error = %e, "failed to move subtitle file");
                    }
                } else if let Err(e) = self.ops.remove_file(&subtitle) {
                    warn!(path = %subtitle.display(), error = %e, "failed to remove subtitle file");
                }
            }
        }
    }
}
