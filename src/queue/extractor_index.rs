//! Hostname index of sources the downloader supports.
//!
//! Built from the tool's extractor listing and cached as JSON in the state
//! directory. A lookup only ever answers "supported" or "unknown": a miss, an
//! empty index and a stale index all fall through to a probe.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::error::IndexError;
use crate::download::{Invocation, ProcessLauncher};

/// File name of the cached index inside the state directory.
pub const INDEX_FILE_NAME: &str = "extractor_index.json";

/// Extractor names that do not identify a host.
const NON_HOST_NAMES: &[&str] = &["generic", "html5", "embed", "playlist", "search", "live"];

/// Shortest name usable as a host token without a dot.
const MIN_NAME_TOKEN: usize = 4;

/// One extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorEntry {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Lowercase host fragments matched as substrings of a query host.
    #[serde(default)]
    pub hosts: Vec<String>,
}

/// `{generated, entries}` as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractorIndex {
    /// Build time, seconds since the epoch.
    #[serde(default, deserialize_with = "epoch_seconds")]
    pub generated: u64,
    #[serde(default)]
    pub entries: Vec<ExtractorEntry>,
}

impl ExtractorIndex {
    /// Reads the index at `path`. A missing file is an empty index.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(IndexError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&raw).map_err(|source| IndexError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the index atomically (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Write`] or [`IndexError::Serialize`].
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let json = serde_json::to_string_pretty(self).map_err(IndexError::Serialize)?;
        let write_err = |source| IndexError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(write_err)?;
        fs::rename(&tmp, path).map_err(write_err)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.hosts.is_empty())
    }

    /// Older than `max_age` relative to `now`.
    #[must_use]
    pub fn is_stale(&self, now: SystemTime, max_age: Duration) -> bool {
        let now = now.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
        now.saturating_sub(self.generated) > max_age.as_secs()
    }

    /// Whether the index can answer lookups at all.
    #[must_use]
    pub fn is_usable(&self, now: SystemTime, max_age: Duration) -> bool {
        !self.is_empty() && !self.is_stale(now, max_age)
    }

    /// Case-insensitive substring match of any host fragment against `host`
    /// (leading `www.` ignored).
    #[must_use]
    pub fn supports_host(&self, host: &str) -> bool {
        let host = host.trim().to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        if host.is_empty() {
            return false;
        }
        self.entries
            .iter()
            .flat_map(|e| e.hosts.iter())
            .any(|fragment| !fragment.is_empty() && host.contains(fragment.as_str()))
    }

    /// Parses `--list-extractors` output (one extractor name per line).
    #[must_use]
    pub fn from_listing(stdout: &str, generated: u64) -> Self {
        let mut entries: Vec<ExtractorEntry> = Vec::new();
        for line in stdout.lines() {
            let name = line.trim();
            if name.is_empty() || name.starts_with('[') || entries.iter().any(|e| e.name == name) {
                continue;
            }
            let description = name.split_once(' ').map(|(_, rest)| rest.trim().to_string());
            let name = name.split_whitespace().next().unwrap_or(name).to_string();
            let hosts = hosts_for_name(&name);
            entries.push(ExtractorEntry {
                name,
                description: description.filter(|d| !d.is_empty()),
                hosts,
            });
        }
        Self { generated, entries }
    }

    /// Rebuilds from the downloader's listing and saves to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when the tool fails or the file cannot be written.
    #[instrument(skip(launcher), fields(program = %program.display(), path = %path.display()))]
    pub async fn rebuild(
        launcher: &dyn ProcessLauncher,
        program: &Path,
        path: &Path,
    ) -> Result<Self, IndexError> {
        let invocation = Invocation::new(program, vec!["--list-extractors".to_string()], "");
        let output = launcher.output(&invocation).await?;
        if !output.success() {
            return Err(IndexError::Listing {
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        let generated = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        let index = Self::from_listing(&output.stdout, generated);
        index.save(path)?;
        info!(entries = index.entries.len(), "extractor index rebuilt");
        Ok(index)
    }
}

/// Accepts integer or fractional epoch seconds.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn epoch_seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        })
        .unwrap_or(0))
}

/// Host fragments derivable from an extractor name.
///
/// `youtube:tab` → `youtube`; `bbc.co.uk` → `bbc.co.uk`; generic names → none.
fn hosts_for_name(name: &str) -> Vec<String> {
    let base = name
        .split(':')
        .next()
        .unwrap_or(name)
        .trim()
        .to_ascii_lowercase();
    if base.contains('.') {
        return vec![base];
    }
    let token: String = base.chars().filter(char::is_ascii_alphanumeric).collect();
    if token.len() < MIN_NAME_TOKEN || NON_HOST_NAMES.contains(&token.as_str()) {
        debug!(name = %name, "extractor name yields no host token");
        return Vec::new();
    }
    vec![token]
}
