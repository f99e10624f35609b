//! Per-request download options.
//!
//! Every recognized option is an explicit field. Unset (`None`) fields fall
//! back to the matching [`AppConfig`] value when arguments are built.
//! [`DownloadOptions::validate`] runs at submission so bad combinations are
//! rejected before anything is queued.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use super::error::ValidationError;
use crate::config::{AppConfig, is_valid_video_quality};
use crate::sorting::DownloadType;

#[allow(clippy::expect_used)]
static RATE_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9]\d*[KMGkmg]?$").expect("rate limit regex is valid"));

#[allow(clippy::expect_used)]
static AUDIO_QUALITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:best|10|[0-9]|[1-9]\d{1,3}k)$").expect("audio quality regex is valid")
});

/// How playlist URLs are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaylistMode {
    /// List the playlist first and queue each entry on its own.
    #[default]
    Ask,
    /// Only the referenced item.
    Single,
    /// Every playlist entry.
    All,
}

impl PlaylistMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::Single => "single",
            Self::All => "all",
        }
    }
}

impl fmt::Display for PlaylistMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaylistMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ask" => Ok(Self::Ask),
            "single" | "ignore" => Ok(Self::Single),
            "all" => Ok(Self::All),
            other => Err(format!("unknown playlist mode: {other}")),
        }
    }
}

/// Requested video quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoQuality {
    Best,
    MaxHeight(u32),
}

impl VideoQuality {
    /// Parses `best` or `<N>p`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let v = raw.trim().to_ascii_lowercase();
        if v == "best" {
            return Some(Self::Best);
        }
        v.strip_suffix('p')
            .and_then(|h| h.parse::<u32>().ok())
            .filter(|h| *h > 0)
            .map(Self::MaxHeight)
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Best => f.write_str("best"),
            Self::MaxHeight(h) => write!(f, "{h}p"),
        }
    }
}

/// Immutable options captured with a request.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DownloadOptions {
    pub audio_only: bool,
    /// Write metadata only, skip the media itself.
    pub metadata_only: bool,
    /// Force (`Some(true)`) or forbid the gallery tool; `None` picks by host.
    pub use_gallery_tool: Option<bool>,
    /// `best` or `<N>p`.
    pub video_quality: Option<String>,
    pub video_ext: Option<String>,
    pub vcodec: Option<String>,
    pub audio_quality: Option<String>,
    pub audio_ext: Option<String>,
    pub acodec: Option<String>,
    pub playlist_mode: PlaylistMode,
    pub rate_limit: Option<String>,
    pub output_template: Option<String>,
    pub cookies_from_browser: Option<String>,
    /// Keep `.vtt`/`.srt` files next to the media after relocation.
    pub keep_subtitle_files: bool,
    /// Skip the archive duplicate check.
    pub redownload: bool,
    /// Playlist title known at submission, used as an album fallback.
    pub playlist_title: Option<String>,
}

impl DownloadOptions {
    /// Checks option combinations and formats.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.audio_only && self.metadata_only {
            return Err(ValidationError::ConflictingModes);
        }
        if let Some(raw) = &self.rate_limit {
            normalize_rate_limit(raw)
                .map_err(|()| ValidationError::InvalidRateLimit(raw.clone()))?;
        }
        if let Some(template) = &self.output_template {
            if template.trim().is_empty() || !template.contains("%(ext)s") {
                return Err(ValidationError::InvalidOutputTemplate(template.clone()));
            }
        }
        if let Some(quality) = &self.video_quality {
            if !is_valid_video_quality(quality) {
                return Err(ValidationError::InvalidQuality(quality.clone()));
            }
        }
        if let Some(quality) = &self.audio_quality {
            if !AUDIO_QUALITY.is_match(quality.trim()) {
                return Err(ValidationError::InvalidAudioQuality(quality.clone()));
            }
        }
        Ok(())
    }

    /// Classification used by sorting rules.
    #[must_use]
    pub fn download_type(&self, uses_gallery_tool: bool) -> DownloadType {
        if self.metadata_only {
            DownloadType::Metadata
        } else if uses_gallery_tool {
            DownloadType::Gallery
        } else if self.audio_only {
            DownloadType::Audio
        } else {
            DownloadType::Video
        }
    }

    /// Quality after falling back to the configured default.
    #[must_use]
    pub fn effective_video_quality(&self, config: &AppConfig) -> VideoQuality {
        self.video_quality
            .as_deref()
            .and_then(VideoQuality::parse)
            .or_else(|| VideoQuality::parse(&config.video_quality))
            .unwrap_or(VideoQuality::Best)
    }

    /// Copy of these options with the archive check disabled.
    #[must_use]
    pub fn with_redownload(&self) -> Self {
        Self {
            redownload: true,
            ..self.clone()
        }
    }
}

/// Normalizes a rate limit for `--limit-rate`.
///
/// `Ok(None)` means unlimited (`""`, `0`, `none`, `unlimited`, `no limit`).
///
/// # Errors
///
/// Returns `Err(())` for anything else that is not `[1-9]\d*[KMG]?`.
#[allow(clippy::result_unit_err)]
pub fn normalize_rate_limit(raw: &str) -> Result<Option<String>, ()> {
    let value = raw.trim();
    if value.is_empty()
        || matches!(
            value.to_ascii_lowercase().as_str(),
            "0" | "none" | "no limit" | "unlimited"
        )
    {
        return Ok(None);
    }
    if RATE_LIMIT.is_match(value) {
        Ok(Some(value.to_ascii_uppercase()))
    } else {
        Err(())
    }
}
