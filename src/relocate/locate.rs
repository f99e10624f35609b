//! Finding produced files and choosing where they land.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::metadata::INFO_JSON_SUFFIX;
use crate::progress::{DestinationKind, TRANSIENT_SUFFIXES};
use crate::sorting::DownloadType;

/// Deepest level searched below each recovery root.
const RECOVERY_MAX_DEPTH: usize = 4;

/// Characters of the title used as a recovery token.
const TITLE_TOKEN_CHARS: usize = 24;

/// Shortest token worth matching against file names.
const MIN_TOKEN_CHARS: usize = 3;

/// True for files the tool is still writing (`.part`, `.ytdl`, ...).
#[must_use]
pub fn is_transient(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| TRANSIENT_SUFFIXES.contains(&ext.as_str()))
}

/// True for `.info.json` sidecars.
#[must_use]
pub fn is_info_sidecar(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|n| n.ends_with(INFO_JSON_SUFFIX))
}

/// True for subtitle files (`.vtt`, `.srt`, ...).
#[must_use]
pub fn is_subtitle(path: &Path) -> bool {
    DestinationKind::classify(&path.to_string_lossy()) == DestinationKind::Subtitle
}

/// Places a reported path may actually be, most likely first.
#[must_use]
pub fn candidate_paths(
    reported: &Path,
    scratch_dir: &Path,
    target_dir: &Path,
    cwd: Option<&Path>,
) -> Vec<PathBuf> {
    let mut out = vec![reported.to_path_buf()];
    if reported.is_relative() {
        out.push(scratch_dir.join(reported));
    }
    if let Some(name) = reported.file_name() {
        out.push(scratch_dir.join(name));
        out.push(target_dir.join(name));
    }
    if let Some(cwd) = cwd {
        if reported.is_relative() {
            out.push(cwd.join(reported));
        }
    }
    if let Ok(absolute) = std::path::absolute(reported) {
        out.push(absolute);
    }
    let mut seen = Vec::with_capacity(out.len());
    for path in out {
        if !seen.contains(&path) {
            seen.push(path);
        }
    }
    seen
}

/// First candidate that exists as a regular file.
#[must_use]
pub fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

/// Lowercased identifying tokens: media id and a truncated title.
#[must_use]
pub fn recovery_tokens(id: Option<&str>, title: Option<&str>) -> Vec<String> {
    let mut tokens = Vec::new();
    if let Some(id) = id.map(str::trim).filter(|s| s.chars().count() >= MIN_TOKEN_CHARS) {
        tokens.push(id.to_lowercase());
    }
    if let Some(title) = title.map(str::trim) {
        let truncated: String = title.chars().take(TITLE_TOKEN_CHARS).collect();
        let truncated = truncated.trim().to_lowercase();
        if truncated.chars().count() >= MIN_TOKEN_CHARS && !tokens.contains(&truncated) {
            tokens.push(truncated);
        }
    }
    tokens
}

/// Searches each root for a media file whose name contains any token.
///
/// Roots are searched in order and entries in name order, so the same
/// listing always yields the same file.
#[must_use]
pub fn recover_by_tokens(roots: &[&Path], tokens: &[String]) -> Option<PathBuf> {
    if tokens.is_empty() {
        return None;
    }
    for root in roots {
        if !root.is_dir() {
            continue;
        }
        let walker = WalkDir::new(root)
            .max_depth(RECOVERY_MAX_DEPTH)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file());
        for entry in walker {
            let path = entry.path();
            if is_transient(path) || is_info_sidecar(path) || is_subtitle(path) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if tokens.iter().any(|t| name.contains(t.as_str())) {
                debug!(path = %path.display(), "recovered file by token search");
                return Some(path.to_path_buf());
            }
        }
    }
    None
}

/// Finished outputs below a per-task scratch directory, in name order.
///
/// Media files for video and audio, metadata sidecars for metadata-only runs,
/// and every non-sidecar file for gallery runs (images count as auxiliary
/// output elsewhere).
#[must_use]
pub fn discover_outputs(dir: &Path, download_type: DownloadType) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .max_depth(RECOVERY_MAX_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| !is_transient(p))
        .filter(|p| match download_type {
            DownloadType::Metadata => is_info_sidecar(p),
            DownloadType::Gallery => !is_info_sidecar(p),
            DownloadType::Video | DownloadType::Audio => {
                DestinationKind::classify(&p.to_string_lossy()) == DestinationKind::Media
            }
        })
        .collect()
}

/// The last `[...]` group of a file name, which the default template fills
/// with the media id.
#[must_use]
pub fn bracketed_id(path: &Path) -> Option<String> {
    let name = path.file_stem()?.to_string_lossy();
    let open = name.rfind('[')?;
    let close = name[open..].find(']')? + open;
    let id = name[open + 1..close].trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// Polls size and mtime until two consecutive reads agree or `timeout` passes.
///
/// Returns true when the file settled, false on timeout or if it vanished.
pub fn wait_until_stable(path: &Path, timeout: Duration, poll: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut previous: Option<(u64, Option<SystemTime>)> = None;
    loop {
        let Ok(meta) = fs::metadata(path) else {
            return false;
        };
        let current = (meta.len(), meta.modified().ok());
        if previous == Some(current) {
            return true;
        }
        trace!(path = %path.display(), size = current.0, "waiting for file to settle");
        previous = Some(current);
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(poll);
    }
}

/// Destination for `source` inside `dir`, never clobbering another file.
///
/// Returns `dir/name` when free or already the same file, else the first free
/// `name (N).ext`.
#[must_use]
pub fn unique_destination(dir: &Path, source: &Path) -> PathBuf {
    let file_name = source
        .file_name()
        .map_or_else(|| "download".to_string(), |n| n.to_string_lossy().into_owned());
    let base = dir.join(&file_name);
    if !base.exists() || same_file(&base, source) {
        return base;
    }

    let (stem, ext) = match file_name.rfind('.') {
        Some(pos) if pos > 0 => (&file_name[..pos], &file_name[pos..]),
        _ => (file_name.as_str(), ""),
    };
    for i in 1..1000 {
        let candidate = dir.join(format!("{stem} ({i}){ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem} ({timestamp}){ext}"))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Subtitle files in `dir` belonging to `stem` (`stem.vtt`, `stem.en.srt`).
#[must_use]
pub fn subtitle_siblings(dir: &Path, stem: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let prefix = format!("{stem}.");
    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_subtitle(p))
        .filter(|p| {
            let file_stem = p
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            file_stem == stem || file_stem.starts_with(&prefix)
        })
        .collect();
    found.sort();
    found
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_transient_and_sidecar_detection() {
        assert!(is_transient(Path::new("a.mp4.part")));
        assert!(is_transient(Path::new("a.ytdl")));
        assert!(!is_transient(Path::new("a.mp4")));
        assert!(is_info_sidecar(Path::new("Clip [x].info.json")));
        assert!(is_subtitle(Path::new("Clip.en.vtt")));
        assert!(!is_subtitle(Path::new("Clip.mp4")));
    }

    #[test]
    fn test_candidates_cover_scratch_and_target() {
        let c = candidate_paths(
            Path::new("clip.mp4"),
            Path::new("/scratch"),
            Path::new("/done"),
            Some(Path::new("/work")),
        );
        assert_eq!(c[0], PathBuf::from("clip.mp4"));
        assert!(c.contains(&PathBuf::from("/scratch/clip.mp4")));
        assert!(c.contains(&PathBuf::from("/done/clip.mp4")));
        assert!(c.contains(&PathBuf::from("/work/clip.mp4")));
    }

    #[test]
    fn test_absolute_report_also_tries_scratch_by_name() {
        let c = candidate_paths(
            Path::new("/elsewhere/clip.mp4"),
            Path::new("/scratch"),
            Path::new("/done"),
            None,
        );
        assert_eq!(c[0], PathBuf::from("/elsewhere/clip.mp4"));
        assert!(c.contains(&PathBuf::from("/scratch/clip.mp4")));
        assert_eq!(c.iter().filter(|p| **p == c[0]).count(), 1);
    }

    #[test]
    fn test_recovery_matches_id_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("sub");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("Some Title [AbC123xyz].mkv"), b"x").unwrap();
        fs::write(nested.join("Some Title [AbC123xyz].mkv.part"), b"x").unwrap();
        fs::write(nested.join("Some Title [AbC123xyz].info.json"), b"{}").unwrap();

        let tokens = recovery_tokens(Some("ABC123XYZ"), None);
        let found = recover_by_tokens(&[dir.path()], &tokens).unwrap();
        assert_eq!(found, nested.join("Some Title [AbC123xyz].mkv"));
    }

    #[test]
    fn test_recovery_tokens_skip_short_values() {
        assert!(recovery_tokens(Some("ab"), Some("  ")).is_empty());
        let tokens = recovery_tokens(None, Some("A Very Long Title That Goes On And On"));
        assert_eq!(tokens, vec!["a very long title that g".to_string()]);
    }

    #[test]
    fn test_unique_destination_appends_counter() {
        let dir = TempDir::new().unwrap();
        let src_dir = TempDir::new().unwrap();
        let source = src_dir.path().join("clip.mp4");
        fs::write(&source, b"new").unwrap();

        assert_eq!(unique_destination(dir.path(), &source), dir.path().join("clip.mp4"));
        fs::write(dir.path().join("clip.mp4"), b"old").unwrap();
        assert_eq!(
            unique_destination(dir.path(), &source),
            dir.path().join("clip (1).mp4")
        );
        fs::write(dir.path().join("clip (1).mp4"), b"old").unwrap();
        assert_eq!(
            unique_destination(dir.path(), &source),
            dir.path().join("clip (2).mp4")
        );
    }

    #[test]
    fn test_unique_destination_same_file_is_kept() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("clip.mp4");
        fs::write(&source, b"x").unwrap();
        assert_eq!(unique_destination(dir.path(), &source), source);
    }

    #[test]
    fn test_discover_outputs_skips_partials_and_sidecars() {
        let dir = TempDir::new().unwrap();
        for name in ["b.mp4", "a.m4a", "a.m4a.part", "a.info.json", "a.en.vtt", "a.jpg"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        assert_eq!(
            discover_outputs(dir.path(), DownloadType::Video),
            vec![dir.path().join("a.m4a"), dir.path().join("b.mp4")]
        );
        assert_eq!(
            discover_outputs(dir.path(), DownloadType::Metadata),
            vec![dir.path().join("a.info.json")]
        );
        assert_eq!(
            discover_outputs(dir.path(), DownloadType::Gallery),
            vec![
                dir.path().join("a.en.vtt"),
                dir.path().join("a.jpg"),
                dir.path().join("a.m4a"),
                dir.path().join("b.mp4"),
            ]
        );
    }

    #[test]
    fn test_bracketed_id_reads_last_group() {
        assert_eq!(
            bracketed_id(Path::new("/s/Title [Chan][01-02-2024][dQw4w9WgXcQ].mp4")).as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(bracketed_id(Path::new("plain.mp4")), None);
    }

    #[test]
    fn test_stable_file_settles_quickly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mp4");
        fs::write(&path, b"done").unwrap();
        assert!(wait_until_stable(
            &path,
            Duration::from_secs(1),
            Duration::from_millis(5)
        ));
        assert!(!wait_until_stable(
            &dir.path().join("missing"),
            Duration::from_millis(10),
            Duration::from_millis(5)
        ));
    }

    /// Appends one byte every `interval`, `writes` times.
    fn spawn_appender(path: PathBuf, writes: usize, interval: Duration) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            for _ in 0..writes {
                let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
                std::io::Write::write_all(&mut file, b"x").unwrap();
                drop(file);
                thread::sleep(interval);
            }
        })
    }

    #[test]
    fn test_growing_file_settles_only_after_writes_stop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("growing.mp4");
        fs::write(&path, b"").unwrap();

        let writer = spawn_appender(path.clone(), 40, Duration::from_millis(5));
        let started = Instant::now();
        let settled = wait_until_stable(&path, Duration::from_secs(5), Duration::from_millis(50));
        let elapsed = started.elapsed();

        assert!(settled);
        assert_eq!(fs::metadata(&path).unwrap().len(), 40);
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(5));
        writer.join().unwrap();
    }

    #[test]
    fn test_file_still_growing_at_deadline_times_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("endless.mp4");
        fs::write(&path, b"").unwrap();

        let writer = spawn_appender(path.clone(), 100, Duration::from_millis(5));
        let started = Instant::now();
        let settled = wait_until_stable(
            &path,
            Duration::from_millis(100),
            Duration::from_millis(20),
        );

        assert!(!settled);
        assert!(started.elapsed() < Duration::from_millis(400));
        writer.join().unwrap();
    }

    #[test]
    fn test_subtitle_siblings_match_stem_and_language_variants() {
        let dir = TempDir::new().unwrap();
        for name in ["Clip.vtt", "Clip.en.srt", "Clipper.vtt", "Clip.mp4", "Other.en.vtt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let found = subtitle_siblings(dir.path(), "Clip");
        assert_eq!(
            found,
            vec![dir.path().join("Clip.en.srt"), dir.path().join("Clip.vtt")]
        );
    }
}
