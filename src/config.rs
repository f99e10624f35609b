//! Application configuration.
//!
//! [`AppConfig`] enumerates every recognized setting with its default. The
//! on-disk file uses a flat `key = value` grammar (double-quoted strings,
//! `true`/`false`, integers, `#` comments). Unknown keys and out-of-range
//! values are rejected with the offending line number.

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Output template used when none is configured.
pub const DEFAULT_OUTPUT_TEMPLATE: &str =
    "%(title)s [%(uploader)s][%(release_date>%m-%d-%Y)s][%(id)s].%(ext)s";

/// Concurrency bounds shared by config, CLI and scheduler.
pub const MIN_CONCURRENCY: u8 = 1;
pub const MAX_CONCURRENCY: u8 = 8;
pub const DEFAULT_CONCURRENCY: u8 = 2;

const APP_DIR: &str = "mediadl";

/// Configuration load/validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config syntax on line {line}: expected key = value")]
    Syntax { line: usize },
    #[error("unknown configuration key: '{key}' on line {line}")]
    UnknownKey { key: String, line: usize },
    #[error("invalid `{key}` value on line {line}: {message}")]
    InvalidValue {
        key: String,
        line: usize,
        message: String,
    },
    #[error("invalid config value for `{key}`: {value}. Expected {expected}")]
    OutOfRange {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// How the downloader may shape file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilenameMode {
    /// Tool default; Windows-safe names on Windows hosts.
    #[default]
    Default,
    Windows,
    Restrict,
}

impl FilenameMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Windows => "windows",
            Self::Restrict => "restrict",
        }
    }
}

/// Every recognized setting.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Default destination for finished files.
    pub completed_dir: PathBuf,
    /// Where the tool writes in-progress files; defaults under `completed_dir`.
    pub scratch_dir: Option<PathBuf>,
    /// Archive database, sorting rules and extractor index live here.
    pub state_dir: PathBuf,
    pub max_concurrency: u8,
    pub ytdlp_path: PathBuf,
    pub gallery_dl_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// `best` or `<N>p`.
    pub video_quality: String,
    pub video_ext: String,
    pub vcodec: String,
    /// Audio codec preference for the audio half of a video download.
    pub video_acodec: String,
    pub audio_quality: String,
    pub audio_ext: String,
    pub acodec: String,
    pub sponsorblock: bool,
    pub filename_mode: FilenameMode,
    pub cookies_from_browser: Option<String>,
    pub gallery_cookies_from_browser: Option<String>,
    pub output_template: String,
    pub embed_chapters: bool,
    pub subtitles_write: bool,
    pub subtitles_write_auto: bool,
    pub subtitles_embed: bool,
    pub subtitles_langs: String,
    pub subtitles_format: Option<String>,
    pub rate_limit: Option<String>,
    pub js_runtime_path: Option<PathBuf>,
    /// Extractor index older than this is rebuilt at startup.
    pub index_max_age_hours: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let completed_dir = default_completed_dir();
        Self {
            completed_dir,
            scratch_dir: None,
            state_dir: default_state_dir(),
            max_concurrency: DEFAULT_CONCURRENCY,
            ytdlp_path: PathBuf::from("yt-dlp"),
            gallery_dl_path: PathBuf::from("gallery-dl"),
            ffprobe_path: PathBuf::from("ffprobe"),
            video_quality: "best".to_string(),
            video_ext: "mp4".to_string(),
            vcodec: "h264".to_string(),
            video_acodec: String::new(),
            audio_quality: "best".to_string(),
            audio_ext: "opus".to_string(),
            acodec: "opus".to_string(),
            sponsorblock: true,
            filename_mode: FilenameMode::Default,
            cookies_from_browser: None,
            gallery_cookies_from_browser: None,
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
            embed_chapters: true,
            subtitles_write: false,
            subtitles_write_auto: false,
            subtitles_embed: false,
            subtitles_langs: "en".to_string(),
            subtitles_format: None,
            rate_limit: None,
            js_runtime_path: None,
            index_max_age_hours: 24 * 7,
        }
    }
}

impl AppConfig {
    /// Effective scratch directory.
    #[must_use]
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| self.completed_dir.join(".mediadl-tmp"))
    }

    #[must_use]
    pub fn archive_db_path(&self) -> PathBuf {
        self.state_dir.join("archive.db")
    }

    #[must_use]
    pub fn rules_path(&self) -> PathBuf {
        self.state_dir.join(crate::sorting::RULES_FILE_NAME)
    }

    #[must_use]
    pub fn extractor_index_path(&self) -> PathBuf {
        self.state_dir.join(crate::queue::INDEX_FILE_NAME)
    }

    /// Validates ranges that the parser alone cannot check.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.max_concurrency) {
            return Err(ConfigError::OutOfRange {
                key: "max_concurrency",
                value: self.max_concurrency.to_string(),
                expected: "range 1..=8",
            });
        }
        if !is_valid_video_quality(&self.video_quality) {
            return Err(ConfigError::OutOfRange {
                key: "video_quality",
                value: self.video_quality.clone(),
                expected: "`best` or a height like `1080p`",
            });
        }
        if !self.output_template.contains("%(ext)s") {
            return Err(ConfigError::OutOfRange {
                key: "output_template",
                value: self.output_template.clone(),
                expected: "a template containing %(ext)s",
            });
        }
        if self.index_max_age_hours == 0 {
            return Err(ConfigError::OutOfRange {
                key: "index_max_age_hours",
                value: "0".to_string(),
                expected: "a positive number of hours",
            });
        }
        Ok(())
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is unreadable or invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "config file missing; using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::parse(&raw)?;
        debug!(path = %path.display(), "config loaded");
        Ok(cfg)
    }

    /// Parses config text on top of defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for syntax errors, unknown keys or bad values.
    #[allow(clippy::too_many_lines)]
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        for (line_index, raw_line) in raw.lines().enumerate() {
            let line_no = line_index + 1;
            let line = strip_inline_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            let Some((raw_key, raw_value)) = line.split_once('=') else {
                return Err(ConfigError::Syntax { line: line_no });
            };
            let key = raw_key.trim();
            let value = raw_value.trim();
            let invalid = |message: String| ConfigError::InvalidValue {
                key: key.to_string(),
                line: line_no,
                message,
            };

            match key {
                "completed_dir" => cfg.completed_dir = parse_path(value).map_err(invalid)?,
                "scratch_dir" => cfg.scratch_dir = parse_optional_path(value).map_err(invalid)?,
                "state_dir" => cfg.state_dir = parse_path(value).map_err(invalid)?,
                "max_concurrency" => cfg.max_concurrency = parse_integer_u8(value).map_err(invalid)?,
                "ytdlp_path" => cfg.ytdlp_path = parse_path(value).map_err(invalid)?,
                "gallery_dl_path" => cfg.gallery_dl_path = parse_path(value).map_err(invalid)?,
                "ffprobe_path" => cfg.ffprobe_path = parse_path(value).map_err(invalid)?,
                "video_quality" => cfg.video_quality = parse_string_literal(value).map_err(invalid)?,
                "video_ext" => cfg.video_ext = parse_string_literal(value).map_err(invalid)?,
                "vcodec" => cfg.vcodec = parse_string_literal(value).map_err(invalid)?,
                "video_acodec" => cfg.video_acodec = parse_string_literal(value).map_err(invalid)?,
                "audio_quality" => cfg.audio_quality = parse_string_literal(value).map_err(invalid)?,
                "audio_ext" => cfg.audio_ext = parse_string_literal(value).map_err(invalid)?,
                "acodec" => cfg.acodec = parse_string_literal(value).map_err(invalid)?,
                "sponsorblock" => cfg.sponsorblock = parse_boolean(value).map_err(invalid)?,
                "filename_mode" => {
                    let parsed = parse_string_literal(value).map_err(invalid)?;
                    cfg.filename_mode = parse_filename_mode(&parsed).map_err(invalid)?;
                }
                "cookies_from_browser" => {
                    cfg.cookies_from_browser = parse_optional_string(value).map_err(invalid)?;
                }
                "gallery_cookies_from_browser" => {
                    cfg.gallery_cookies_from_browser =
                        parse_optional_string(value).map_err(invalid)?;
                }
                "output_template" => {
                    cfg.output_template = parse_string_literal(value).map_err(invalid)?;
                }
                "embed_chapters" => cfg.embed_chapters = parse_boolean(value).map_err(invalid)?,
                "subtitles_write" => cfg.subtitles_write = parse_boolean(value).map_err(invalid)?,
                "subtitles_write_auto" => {
                    cfg.subtitles_write_auto = parse_boolean(value).map_err(invalid)?;
                }
                "subtitles_embed" => cfg.subtitles_embed = parse_boolean(value).map_err(invalid)?,
                "subtitles_langs" => {
                    cfg.subtitles_langs = parse_string_literal(value).map_err(invalid)?;
                }
                "subtitles_format" => {
                    cfg.subtitles_format = parse_optional_string(value).map_err(invalid)?;
                }
                "rate_limit" => cfg.rate_limit = parse_optional_string(value).map_err(invalid)?,
                "js_runtime_path" => {
                    cfg.js_runtime_path = parse_optional_path(value).map_err(invalid)?;
                }
                "index_max_age_hours" => {
                    cfg.index_max_age_hours = parse_integer_u64(value).map_err(invalid)?;
                }
                unknown => {
                    return Err(ConfigError::UnknownKey {
                        key: unknown.to_string(),
                        line: line_no,
                    });
                }
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

impl fmt::Display for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(value: Option<&T>) -> String {
            value.map_or_else(|| "\"\"".to_string(), |v| format!("\"{v}\""))
        }
        writeln!(f, "completed_dir = \"{}\"", self.completed_dir.display())?;
        writeln!(f, "scratch_dir = \"{}\"", self.scratch_dir().display())?;
        writeln!(f, "state_dir = \"{}\"", self.state_dir.display())?;
        writeln!(f, "max_concurrency = {}", self.max_concurrency)?;
        writeln!(f, "ytdlp_path = \"{}\"", self.ytdlp_path.display())?;
        writeln!(f, "gallery_dl_path = \"{}\"", self.gallery_dl_path.display())?;
        writeln!(f, "ffprobe_path = \"{}\"", self.ffprobe_path.display())?;
        writeln!(f, "video_quality = \"{}\"", self.video_quality)?;
        writeln!(f, "video_ext = \"{}\"", self.video_ext)?;
        writeln!(f, "vcodec = \"{}\"", self.vcodec)?;
        writeln!(f, "video_acodec = \"{}\"", self.video_acodec)?;
        writeln!(f, "audio_quality = \"{}\"", self.audio_quality)?;
        writeln!(f, "audio_ext = \"{}\"", self.audio_ext)?;
        writeln!(f, "acodec = \"{}\"", self.acodec)?;
        writeln!(f, "sponsorblock = {}", self.sponsorblock)?;
        writeln!(f, "filename_mode = \"{}\"", self.filename_mode.as_str())?;
        writeln!(f, "cookies_from_browser = {}", opt(self.cookies_from_browser.as_ref()))?;
        writeln!(
            f,
            "gallery_cookies_from_browser = {}",
            opt(self.gallery_cookies_from_browser.as_ref())
        )?;
        writeln!(f, "output_template = \"{}\"", self.output_template)?;
        writeln!(f, "embed_chapters = {}", self.embed_chapters)?;
        writeln!(f, "subtitles_write = {}", self.subtitles_write)?;
        writeln!(f, "subtitles_write_auto = {}", self.subtitles_write_auto)?;
        writeln!(f, "subtitles_embed = {}", self.subtitles_embed)?;
        writeln!(f, "subtitles_langs = \"{}\"", self.subtitles_langs)?;
        writeln!(f, "subtitles_format = {}", opt(self.subtitles_format.as_ref()))?;
        writeln!(f, "rate_limit = {}", opt(self.rate_limit.as_ref()))?;
        writeln!(
            f,
            "js_runtime_path = {}",
            opt(self.js_runtime_path.as_ref().map(|p| p.display()).as_ref())
        )?;
        write!(f, "index_max_age_hours = {}", self.index_max_age_hours)
    }
}

/// True for `best` or `<N>p` with a positive height.
#[must_use]
pub fn is_valid_video_quality(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    if v == "best" {
        return true;
    }
    v.strip_suffix('p')
        .and_then(|h| h.parse::<u32>().ok())
        .is_some_and(|h| h > 0)
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/mediadl/config.toml`
/// 2. `$HOME/.config/mediadl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join("config.toml"));
    }
    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml"),
    )
}

fn default_state_dir() -> PathBuf {
    if let Some(xdg_data_home) = env_var_non_empty_os("XDG_DATA_HOME") {
        return PathBuf::from(xdg_data_home).join(APP_DIR);
    }
    match env_var_non_empty_os("HOME") {
        Some(home) => PathBuf::from(home).join(".local").join("share").join(APP_DIR),
        None => PathBuf::from(".mediadl"),
    }
}

fn default_completed_dir() -> PathBuf {
    match env_var_non_empty_os("HOME") {
        Some(home) => PathBuf::from(home).join("Downloads"),
        None => PathBuf::from("downloads"),
    }
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String, String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        return Err("expected double-quoted string".to_string());
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

/// Quoted string, where `""` and `"none"` mean unset.
fn parse_optional_string(raw_value: &str) -> Result<Option<String>, String> {
    let parsed = parse_string_literal(raw_value)?;
    let trimmed = parsed.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

fn parse_path(raw_value: &str) -> Result<PathBuf, String> {
    let parsed = parse_string_literal(raw_value)?;
    if parsed.trim().is_empty() {
        return Err("expected a non-empty path".to_string());
    }
    Ok(PathBuf::from(parsed))
}

fn parse_optional_path(raw_value: &str) -> Result<Option<PathBuf>, String> {
    Ok(parse_optional_string(raw_value)?.map(PathBuf::from))
}

fn parse_integer_u8(raw_value: &str) -> Result<u8, String> {
    let token = raw_value.trim();
    if token.is_empty() {
        return Err("expected integer value".to_string());
    }
    let value = token.parse::<u16>().map_err(|e| e.to_string())?;
    u8::try_from(value).map_err(|_| "integer value out of range for u8".to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64, String> {
    let token = raw_value.trim();
    if token.is_empty() {
        return Err("expected integer value".to_string());
    }
    let value = token.parse::<i128>().map_err(|e| e.to_string())?;
    if value < 0 {
        return Err("expected non-negative integer".to_string());
    }
    u64::try_from(value).map_err(|_| "integer value out of range for u64".to_string())
}

fn parse_boolean(raw_value: &str) -> Result<bool, String> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err("expected 'true' or 'false'".to_string()),
    }
}

fn parse_filename_mode(value: &str) -> Result<FilenameMode, String> {
    match value {
        "default" => Ok(FilenameMode::Default),
        "windows" => Ok(FilenameMode::Windows),
        "restrict" => Ok(FilenameMode::Restrict),
        _ => Err("expected one of: default, windows, restrict".to_string()),
    }
}
