//! Embedded-tag probing for metadata backfill.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde_json::Value;
use tracing::debug;

/// Reads tags embedded in a media file.
pub trait TagProbe: Send + Sync {
    /// The album tag, if the file carries one.
    fn album(&self, media: &Path) -> Option<String>;
}

/// Probe that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTagProbe;

impl TagProbe for NoTagProbe {
    fn album(&self, _media: &Path) -> Option<String> {
        None
    }
}

/// Reads container tags with `ffprobe -show_format`.
#[derive(Debug, Clone)]
pub struct FfprobeTagProbe {
    program: PathBuf,
}

impl FfprobeTagProbe {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl TagProbe for FfprobeTagProbe {
    fn album(&self, media: &Path) -> Option<String> {
        let output = Command::new(&self.program)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(media)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();
        let output = match output {
            Ok(o) if o.status.success() => o,
            Ok(o) => {
                debug!(path = %media.display(), code = ?o.status.code(), "ffprobe failed");
                return None;
            }
            Err(e) => {
                debug!(error = %e, program = %self.program.display(), "ffprobe unavailable");
                return None;
            }
        };
        album_from_probe_json(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Extracts `format.tags.album` (any key case) from ffprobe JSON.
fn album_from_probe_json(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let tags = value.get("format")?.get("tags")?.as_object()?;
    tags.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("album"))
        .and_then(|(_, v)| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
