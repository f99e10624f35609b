//! Line-by-line state machine over the downloader's text output.
//!
//! The tool has no structured progress protocol. Multi-stream downloads
//! (video, audio, subtitles, thumbnails) each print their own `0..100%` run,
//! and early bogus `100%` readings are common. The parser turns that stream
//! into a non-decreasing percent plus a short phase label, and collects the
//! file paths the tool reports writing.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Longest raw line echoed back as phase text.
const MAX_TEXT_CHARS: usize = 80;

/// Fresh percents at or above this before any media destination are spurious.
const SPIKE_THRESHOLD: f64 = 99.9;

/// Label shown while the tool merges, embeds or converts.
pub const POSTPROCESSING_LABEL: &str = "Postprocessing…";

/// Label shown for destination lines before the transfer begins.
pub const PREPARING_LABEL: &str = "Preparing…";

const SUBTITLE_EXTENSIONS: &[&str] = &[
    "vtt", "srt", "ass", "ssa", "lrc", "ttml", "sbv", "dfxp", "srv1", "srv2", "srv3", "json3",
];

const AUXILIARY_EXTENSIONS: &[&str] = &[
    "json",
    "jpg",
    "jpeg",
    "png",
    "webp",
    "gif",
    "description",
    "xml",
    "txt",
    "url",
    "webloc",
    "desktop",
];

/// Suffixes the tool appends to files still being written.
pub const TRANSIENT_SUFFIXES: &[&str] = &["part", "ytdl", "temp", "tmp"];

/// Bracket tags emitted by tool-side postprocessors.
const POSTPROCESSOR_TAGS: &[&str] = &[
    "merger",
    "videoremuxer",
    "videoconvertor",
    "embedsubtitle",
    "embedthumbnail",
    "metadata",
    "modifychapters",
    "sponsorblock",
    "extractaudio",
    "fixupm3u8",
    "fixupm4a",
    "fixupstretched",
    "fixuptimestamp",
    "fixupduration",
    "fixupduplicatemoov",
    "movefiles",
    "thumbnailsconvertor",
    "splitchapters",
    "ffmpeg",
];

/// Free-text phrases that also mark postprocessing.
const POSTPROCESSING_PHRASES: &[&str] = &[
    "merging formats",
    "deleting original file",
    "remuxing",
    "embedding",
    "adding metadata",
    "adding chapters",
    "writing thumbnail",
    "converting thumbnail",
];

/// Prefixes of transport chatter and banner lines.
const NOISE_PREFIXES: &[&str] = &[
    "[https @",
    "[http @",
    "[tcp @",
    "[tls @",
    "[hls @",
    "[AVIOContext @",
    "[mov,mp4",
    "[matroska",
    "Input #",
    "Output #",
    "Stream mapping:",
    "Press [q]",
    "Duration:",
    "Metadata:",
    "Stream #",
];

#[allow(clippy::expect_used)]
static TOTAL_FRAGMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)total fragments:\s*(\d+)").expect("total fragments regex is valid")
});

#[allow(clippy::expect_used)]
static FRAGMENT_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-Frag(\d+)").expect("fragment file regex is valid"));

#[allow(clippy::expect_used)]
static FRAGMENT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-frag\d+(?:\.part)?$").expect("fragment suffix regex is valid")
});

#[allow(clippy::expect_used)]
static FRAGMENT_RATIO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(frag\s+(\d+)\s*/\s*(\d+)\)").expect("fragment ratio regex is valid")
});

#[allow(clippy::expect_used)]
static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3}(?:\.\d+)?)\s*%").expect("percent regex is valid"));

#[allow(clippy::expect_used)]
static DESTINATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Destination:\s*(.+)$").expect("destination regex is valid"));

#[allow(clippy::expect_used)]
static MERGE_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Merging formats into\s+(.+)$").expect("merge target regex is valid")
});

#[allow(clippy::expect_used)]
static ALREADY_DOWNLOADED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[download\]\s+(.+?)\s+has already been downloaded")
        .expect("already downloaded regex is valid")
});

#[allow(clippy::expect_used)]
static MOVE_FILES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\[MoveFiles\]\s+Moving file\s+"(.+?)"\s+to\s+"(.+?)""#)
        .expect("move files regex is valid")
});

#[allow(clippy::expect_used)]
static DELETING_ORIGINAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Deleting original file\s+(.+?)(?:\s+\(pass -k to keep\))?$")
        .expect("deleting original regex is valid")
});

#[allow(clippy::expect_used)]
static BRACKET_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([A-Za-z0-9_:]+)\]").expect("bracket tag regex is valid"));

/// What the stream is currently transferring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestinationKind {
    #[default]
    Unset,
    Media,
    Subtitle,
    Auxiliary,
}

impl DestinationKind {
    /// Classifies a destination path by extension.
    ///
    /// In-progress suffixes are stripped first, so `clip.mp4.part` is media.
    #[must_use]
    pub fn classify(path: &str) -> Self {
        let name = path.trim().trim_matches('"').to_ascii_lowercase();
        let mut stem = match FRAGMENT_SUFFIX.find(&name) {
            Some(m) => &name[..m.start()],
            None => name.as_str(),
        };
        while let Some((rest, ext)) = stem.rsplit_once('.') {
            if TRANSIENT_SUFFIXES.contains(&ext) {
                stem = rest;
            } else {
                break;
            }
        }
        let ext = stem.rsplit_once('.').map_or("", |(_, ext)| ext);
        if SUBTITLE_EXTENSIONS.contains(&ext) {
            Self::Subtitle
        } else if AUXILIARY_EXTENSIONS.contains(&ext) {
            Self::Auxiliary
        } else {
            Self::Media
        }
    }
}

/// Coarse phase attached to each update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Preparing,
    Downloading,
    Postprocessing,
    Other,
}

/// One normalized output of [`ProgressParser::feed`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Monotonic percent, or `None` when the line carried no usable number.
    pub percent: Option<f64>,
    /// Human-readable phase text.
    pub text: String,
    pub phase: Phase,
}

/// Per-task parser state. Owned by exactly one task.
#[derive(Debug)]
pub struct ProgressParser {
    last_percent: f64,
    any_progress: bool,
    destination_kind: DestinationKind,
    saw_primary_destination: bool,
    hls_total_fragments: Option<u64>,
    hls_max_fragment_index: i64,
    postprocessing: bool,
    reported_files: Vec<PathBuf>,
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_percent: 0.0,
            any_progress: false,
            destination_kind: DestinationKind::Unset,
            saw_primary_destination: false,
            hls_total_fragments: None,
            hls_max_fragment_index: -1,
            postprocessing: false,
            reported_files: Vec::new(),
        }
    }

    /// Highest accepted percent so far.
    #[must_use]
    pub fn last_percent(&self) -> f64 {
        self.last_percent
    }

    /// True once any percent has been accepted.
    #[must_use]
    pub fn saw_progress(&self) -> bool {
        self.any_progress
    }

    #[must_use]
    pub fn destination_kind(&self) -> DestinationKind {
        self.destination_kind
    }

    #[must_use]
    pub fn saw_primary_destination(&self) -> bool {
        self.saw_primary_destination
    }

    #[must_use]
    pub fn is_postprocessing(&self) -> bool {
        self.postprocessing
    }

    /// Media files the tool reported writing, de-duplicated, first-seen order.
    #[must_use]
    pub fn reported_files(&self) -> &[PathBuf] {
        &self.reported_files
    }

    /// Consumes one line. Returns `None` for blank and noise lines.
    pub fn feed(&mut self, raw_line: &str) -> Option<ProgressUpdate> {
        let line = raw_line.trim();
        if line.is_empty() {
            return None;
        }

        // 1. fragment total
        if let Some(total) = capture_u64(&TOTAL_FRAGMENTS, line, 1) {
            self.hls_total_fragments = Some(total);
        }

        // 2. fragment index
        let mut fragment_percent = None;
        if let Some(index) = capture_u64(&FRAGMENT_FILE, line, 1) {
            let index = i64::try_from(index).unwrap_or(i64::MAX);
            self.hls_max_fragment_index = self.hls_max_fragment_index.max(index);
            if let Some(total) = self.hls_total_fragments.filter(|t| *t > 0) {
                #[allow(clippy::cast_precision_loss)]
                let pct = (self.hls_max_fragment_index + 1) as f64 / total as f64 * 100.0;
                fragment_percent = Some(pct);
            }
        }

        let explicit_percent = capture_f64(&PERCENT, line, 1);
        let ratio_percent = fragment_ratio(line);

        // 3. noise
        if is_noise(line)
            && explicit_percent.is_none()
            && ratio_percent.is_none()
            && fragment_percent.is_none()
        {
            return None;
        }

        let tag = bracket_tag(line);
        let tag_is_postprocessor = tag
            .as_deref()
            .is_some_and(|t| POSTPROCESSOR_TAGS.contains(&t));

        // 4. destination classification + file tracking
        let mut destination_line = false;
        if let Some(path) = capture_str(&DESTINATION, line, 1) {
            destination_line = true;
            let kind = DestinationKind::classify(&path);
            self.destination_kind = kind;
            if kind == DestinationKind::Media {
                self.saw_primary_destination = true;
                self.track_file(&path);
                if tag.as_deref().is_none_or(|t| t == "download") {
                    self.postprocessing = false;
                }
            }
        }
        if let Some(path) = capture_str(&MERGE_TARGET, line, 1) {
            self.destination_kind = DestinationKind::Media;
            self.saw_primary_destination = true;
            self.track_file(&path);
        }
        if let Some(path) = capture_str(&ALREADY_DOWNLOADED, line, 1) {
            if DestinationKind::classify(&path) == DestinationKind::Media {
                self.saw_primary_destination = true;
                self.track_file(&path);
            }
        }
        if let Some(caps) = MOVE_FILES.captures(line) {
            self.rename_file(&caps[1], &caps[2]);
        }
        if let Some(path) = capture_str(&DELETING_ORIGINAL, line, 1) {
            self.forget_file(&path);
        }

        // 9 (detection). Evaluated before percent so merge lines hold the bar.
        let lower = line.to_lowercase();
        if tag_is_postprocessor || POSTPROCESSING_PHRASES.iter().any(|p| lower.contains(p)) {
            self.postprocessing = true;
        }

        // 5. percent extraction
        let mut candidate = explicit_percent.or(ratio_percent);
        let has_fragment_signal = ratio_percent.is_some() || fragment_percent.is_some();
        if let Some(frag) = fragment_percent {
            if candidate.is_none_or(|c| frag > c) {
                candidate = Some(frag);
            }
        }

        let mut suppressed = false;
        if let Some(pct) = candidate {
            // 6. pre-media spike
            if !has_fragment_signal && !self.saw_primary_destination && pct >= SPIKE_THRESHOLD {
                candidate = None;
                suppressed = true;
            }
            // 7. subtitle / auxiliary transfers
            if matches!(
                self.destination_kind,
                DestinationKind::Subtitle | DestinationKind::Auxiliary
            ) || lower.contains("subtitle")
            {
                candidate = None;
                suppressed = true;
            }
        }

        // 8. monotonic clamp
        let fresh = candidate.map(|pct| {
            let clamped = pct.clamp(0.0, 100.0).max(self.last_percent);
            self.last_percent = clamped;
            self.any_progress = true;
            clamped
        });

        // 10. output
        if self.postprocessing {
            return Some(ProgressUpdate {
                percent: self.any_progress.then_some(self.last_percent),
                text: POSTPROCESSING_LABEL.to_string(),
                phase: Phase::Postprocessing,
            });
        }
        if let Some(pct) = fresh {
            return Some(ProgressUpdate {
                percent: Some(pct),
                text: format!("Downloading: {pct:.1}%"),
                phase: Phase::Downloading,
            });
        }
        if destination_line || suppressed {
            return Some(ProgressUpdate {
                percent: None,
                text: PREPARING_LABEL.to_string(),
                phase: Phase::Preparing,
            });
        }
        Some(ProgressUpdate {
            percent: None,
            text: truncate_chars(line, MAX_TEXT_CHARS),
            phase: Phase::Other,
        })
    }

    fn track_file(&mut self, raw: &str) {
        let path = clean_path(raw);
        if path.as_os_str().is_empty() {
            return;
        }
        if !self.reported_files.contains(&path) {
            self.reported_files.push(path);
        }
    }

    fn rename_file(&mut self, from: &str, to: &str) {
        let from = clean_path(from);
        let to = clean_path(to);
        match self.reported_files.iter().position(|p| *p == from) {
            Some(idx) if !self.reported_files.contains(&to) => self.reported_files[idx] = to,
            Some(idx) => {
                self.reported_files.remove(idx);
            }
            None => self.track_file(&to.to_string_lossy()),
        }
    }

    fn forget_file(&mut self, raw: &str) {
        let path = clean_path(raw);
        self.reported_files.retain(|p| *p != path);
    }
}

fn clean_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim().trim_matches('"').trim_matches('\'').trim();
    Path::new(trimmed).to_path_buf()
}

fn is_noise(line: &str) -> bool {
    if NOISE_PREFIXES.iter().any(|p| line.starts_with(p)) {
        return true;
    }
    let banner = line
        .chars()
        .all(|c| matches!(c, '-' | '=' | '*' | '_' | ' '));
    banner && line.len() >= 3
}

fn bracket_tag(line: &str) -> Option<String> {
    BRACKET_TAG
        .captures(line)
        .map(|caps| caps[1].to_ascii_lowercase())
}

fn fragment_ratio(line: &str) -> Option<f64> {
    let caps = FRAGMENT_RATIO.captures(line)?;
    let done: f64 = caps[1].parse().ok()?;
    let total: f64 = caps[2].parse().ok()?;
    (total > 0.0).then(|| done / total * 100.0)
}

fn capture_str(re: &Regex, line: &str, group: usize) -> Option<String> {
    re.captures(line)
        .and_then(|caps| caps.get(group))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn capture_u64(re: &Regex, line: &str, group: usize) -> Option<u64> {
    capture_str(re, line, group)?.parse().ok()
}

fn capture_f64(re: &Regex, line: &str, group: usize) -> Option<f64> {
    capture_str(re, line, group)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
