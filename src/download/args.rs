//! Command-line construction for the downloader tools.
//!
//! A pure mapping from options and config to a flag list. Callers treat the
//! result opaquely; only its effect on the tool's output matters to them.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use super::error::DownloadError;
use super::options::{DownloadOptions, PlaylistMode, VideoQuality, normalize_rate_limit};
use crate::config::{AppConfig, FilenameMode};

/// SponsorBlock categories removed from videos.
const SPONSORBLOCK_CATEGORIES: &str =
    "sponsor,intro,outro,selfpromo,interaction,preview,music_offtopic";

/// Metadata fields whose fancy quotes are flattened to `'`.
const QUOTE_FIELDS: &[&str] = &[
    "title",
    "album",
    "artist",
    "playlist_title",
    "chapter",
    "chapter_title",
];

const QUOTE_CHARS: &[&str] = &["\"", "“", "”", "‘", "’"];

/// Which external program runs a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// The general media downloader.
    Media,
    /// The image-gallery downloader.
    Gallery,
}

/// Builds the argument list (without program and URL).
///
/// The scratch directory is created and probed for writability first.
///
/// # Errors
///
/// Returns [`DownloadError::OutputDir`] when `scratch_dir` is unusable.
pub fn build_tool_args(
    options: &DownloadOptions,
    config: &AppConfig,
    scratch_dir: &Path,
    tool: ToolKind,
) -> Result<Vec<String>, DownloadError> {
    ensure_writable(scratch_dir)?;

    let mut args: Vec<String> = Vec::new();
    let push = |args: &mut Vec<String>, items: &[&str]| {
        args.extend(items.iter().map(|s| (*s).to_string()));
    };

    if tool == ToolKind::Gallery {
        args.push("-d".to_string());
        args.push(scratch_dir.display().to_string());
        let cookies = options
            .cookies_from_browser
            .as_ref()
            .or(config.gallery_cookies_from_browser.as_ref());
        if let Some(browser) = cookies {
            push(&mut args, &["--cookies-from-browser", browser.as_str()]);
        }
        return Ok(args);
    }

    let template = options
        .output_template
        .as_deref()
        .unwrap_or(&config.output_template);
    let output = scratch_dir.join(template).display().to_string().replace('\\', "/");
    push(&mut args, &["-o", output.as_str()]);

    push(&mut args, &["--newline", "--encoding", "utf-8", "--ignore-errors"]);

    if options.metadata_only {
        push(&mut args, &["--skip-download", "--write-info-json"]);
    } else if options.audio_only {
        push_audio_format(&mut args, options, config);
    } else {
        push_video_format(&mut args, options, config);
    }

    match options.playlist_mode {
        PlaylistMode::Single => args.push("--no-playlist".to_string()),
        PlaylistMode::All => args.push("--yes-playlist".to_string()),
        PlaylistMode::Ask => {}
    }

    if config.sponsorblock && !options.metadata_only {
        push(&mut args, &["--sponsorblock-remove", SPONSORBLOCK_CATEGORIES]);
    }

    match config.filename_mode {
        FilenameMode::Windows => args.push("--windows-filenames".to_string()),
        FilenameMode::Restrict => args.push("--restrict-filenames".to_string()),
        FilenameMode::Default if cfg!(windows) => args.push("--windows-filenames".to_string()),
        FilenameMode::Default => {}
    }

    push(&mut args, &["--replace-in-metadata", "title", r"\|", "-"]);
    push(&mut args, &["--replace-in-metadata", "title", "｜", "-"]);
    push(&mut args, &["--replace-in-metadata", "title", r"\?", ""]);
    push(&mut args, &["--replace-in-metadata", "title", ":", " -"]);
    for field in QUOTE_FIELDS {
        for quote in QUOTE_CHARS {
            push(&mut args, &["--replace-in-metadata", *field, *quote, "'"]);
        }
    }

    if !args.iter().any(|a| a == "--write-info-json") {
        args.push("--write-info-json".to_string());
    }

    push(&mut args, &["--parse-metadata", r"%(upload_date|)s:(?P<meta_date>\d{8})"]);
    push(&mut args, &["--parse-metadata", r"%(release_year|)s:(?P<meta_date>\d{4})"]);
    push(&mut args, &["--parse-metadata", r"%(release_date|)s:(?P<meta_date>\d{8})"]);

    if config.embed_chapters && !options.metadata_only {
        args.push("--embed-chapters".to_string());
    }

    if !options.audio_only && !options.metadata_only {
        push_subtitles(&mut args, config);
    }

    let raw_rate = options.rate_limit.as_ref().or(config.rate_limit.as_ref());
    if let Some(raw) = raw_rate {
        match normalize_rate_limit(raw) {
            Ok(Some(rate)) => push(&mut args, &["--limit-rate", rate.as_str()]),
            Ok(None) => {}
            Err(()) => warn!(rate_limit = %raw, "ignoring invalid rate limit"),
        }
    }

    let cookies = options
        .cookies_from_browser
        .as_ref()
        .or(config.cookies_from_browser.as_ref());
    if let Some(browser) = cookies {
        push(&mut args, &["--cookies-from-browser", browser.as_str()]);
    }

    if let Some(runtime) = &config.js_runtime_path {
        if runtime.exists() {
            let name = runtime
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let name = name.split('.').next().unwrap_or_default();
            let spec = format!("{name}:{}", runtime.display());
            push(&mut args, &["--js-runtimes", spec.as_str()]);
        } else {
            warn!(path = %runtime.display(), "configured JavaScript runtime not found");
        }
    }

    debug!(count = args.len(), "built tool arguments");
    Ok(args)
}

fn push_audio_format(args: &mut Vec<String>, options: &DownloadOptions, config: &AppConfig) {
    let codec = options.acodec.as_deref().unwrap_or(&config.acodec);
    let format = if codec.is_empty() {
        "bestaudio/best".to_string()
    } else {
        format!("bestaudio[acodec~={codec}]/bestaudio/best")
    };
    args.extend(["-f".to_string(), format, "--extract-audio".to_string()]);

    let ext = options.audio_ext.as_deref().unwrap_or(&config.audio_ext);
    let ext = if ext.is_empty() { "mp3" } else { ext };
    args.extend(["--audio-format".to_string(), ext.to_string()]);

    let quality = options
        .audio_quality
        .as_deref()
        .unwrap_or(&config.audio_quality);
    if !quality.is_empty() && !quality.eq_ignore_ascii_case("best") {
        let value = quality.trim_end_matches(['k', 'K']);
        args.extend(["--audio-quality".to_string(), value.to_string()]);
    }
    args.extend(["--embed-metadata".to_string(), "--embed-thumbnail".to_string()]);
}

fn push_video_format(args: &mut Vec<String>, options: &DownloadOptions, config: &AppConfig) {
    let mut video = String::from("bestvideo");
    if let VideoQuality::MaxHeight(height) = options.effective_video_quality(config) {
        video.push_str(&format!("[height<={height}]"));
    }
    let vcodec = options.vcodec.as_deref().unwrap_or(&config.vcodec);
    if !vcodec.is_empty() {
        video.push_str(&format!("[vcodec~={vcodec}]"));
    }
    let ext = options.video_ext.as_deref().unwrap_or(&config.video_ext);
    if !ext.is_empty() {
        video.push_str(&format!("[ext={ext}]"));
    }

    let mut audio = String::from("bestaudio");
    if !config.video_acodec.is_empty() {
        audio.push_str(&format!("[acodec~={}]", config.video_acodec));
    }

    args.extend(["-f".to_string(), format!("{video}+{audio}/best")]);
    if !ext.is_empty() {
        args.extend(["--merge-output-format".to_string(), ext.to_string()]);
    }
    args.extend(["--embed-metadata".to_string(), "--embed-thumbnail".to_string()]);
}

fn push_subtitles(args: &mut Vec<String>, config: &AppConfig) {
    if config.subtitles_write {
        args.push("--write-subs".to_string());
    }
    if config.subtitles_write_auto {
        args.push("--write-auto-subs".to_string());
    }
    let any = config.subtitles_write || config.subtitles_write_auto || config.subtitles_embed;
    if any && !config.subtitles_langs.trim().is_empty() {
        args.extend(["--sub-langs".to_string(), config.subtitles_langs.trim().to_string()]);
    }
    if config.subtitles_embed {
        args.push("--embed-subs".to_string());
    }
    if let Some(format) = config.subtitles_format.as_ref().filter(|_| any) {
        args.extend(["--convert-subs".to_string(), format.clone()]);
    }
}

fn ensure_writable(dir: &Path) -> Result<(), DownloadError> {
    let io_err = |source| DownloadError::OutputDir {
        path: dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(io_err)?;
    let probe = dir.join(".write-test");
    let result = fs::write(&probe, b"test");
    let _ = fs::remove_file(&probe);
    result.map_err(io_err)
}
