//! Rule-based destination routing for finished downloads.
//!
//! Rules live in a JSON array file that is rewritten wholesale on every
//! mutation and re-read before every routing decision, so edits made by
//! another process are picked up without a restart. Evaluation walks the
//! rules in stored order; the first full match wins.
//!
//! # Example
//!
//! ```no_run
//! use mediadl_core::sorting::{Condition, DownloadType, Operator, RuleDraft, RuleScope, RuleStore};
//! use mediadl_core::MediaMetadata;
//! use std::path::PathBuf;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RuleStore::new("sorting_rules.json");
//! store.add(RuleDraft {
//!     name: "Long videos".to_string(),
//!     target_path: PathBuf::from("/media/long"),
//!     subfolder_pattern: Some("{uploader}".to_string()),
//!     download_type: RuleScope::Video,
//!     conditions: vec![Condition::new("duration", Operator::GreaterThan, vec!["600".into()])],
//! })?;
//!
//! let meta = MediaMetadata::from_json_str(r#"{"duration": 700, "uploader": "Chan"}"#).unwrap();
//! let dest = store.evaluate(&meta, DownloadType::Video, false);
//! assert_eq!(dest, Some(PathBuf::from("/media/long/Chan")));
//! # Ok(())
//! # }
//! ```

mod rule;
mod template;

pub use rule::{
    Condition, DownloadType, Operator, RuleDraft, RuleScope, SortingRule,
    normalize_subfolder_pattern,
};
pub use template::resolve_subfolder;

use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::metadata::MediaMetadata;

/// Default rules file name inside the state directory.
pub const RULES_FILE_NAME: &str = "sorting_rules.json";

/// Errors from reading or writing the rules file.
#[derive(Debug, Error)]
pub enum RulesError {
    /// Filesystem failure.
    #[error("rules file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file exists but is not a valid rule array.
    #[error("rules file {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Serialization failure while saving.
    #[error("failed to serialize rules: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Direction for [`RuleStore::move_rule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// Returns the destination for the first rule matching the download.
///
/// Empty metadata never routes.
#[must_use]
pub fn evaluate_rules(
    rules: &[SortingRule],
    metadata: &MediaMetadata,
    download_type: DownloadType,
    is_playlist: bool,
) -> Option<PathBuf> {
    if metadata.is_empty() {
        return None;
    }
    let rule = rules
        .iter()
        .find(|rule| rule.matches(metadata, download_type, is_playlist))?;
    info!(rule = %rule.name, rule_id = %rule.id, "sorting rule matched");
    Some(final_path(rule, metadata))
}

fn final_path(rule: &SortingRule, metadata: &MediaMetadata) -> PathBuf {
    if rule.date_subfolders == Some(true)
        && metadata
            .get_str("upload_date")
            .is_none_or(|date| date.len() != 8)
    {
        return rule.target_path.clone();
    }
    match rule.effective_subfolder() {
        Some(pattern) => resolve_subfolder(&rule.target_path, &pattern, metadata),
        None => rule.target_path.clone(),
    }
}

/// File-backed, lock-protected rule collection.
///
/// Every operation re-reads the file; mutations hold the lock across
/// read-modify-write so concurrent relocation jobs and edits never interleave.
#[derive(Debug)]
pub struct RuleStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RuleStore {
    /// Creates a store over `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Strict load: missing file is an empty set, anything else unreadable is an error.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError`] on I/O or parse failure.
    pub fn load(&self) -> Result<Vec<SortingRule>, RulesError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_file()
    }

    /// Lenient load used for routing: failures yield an empty rule set.
    #[must_use]
    pub fn rules(&self) -> Vec<SortingRule> {
        match self.load() {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "failed to load sorting rules; using none");
                Vec::new()
            }
        }
    }

    /// Loads the rules fresh and evaluates them.
    #[must_use]
    #[instrument(skip(self, metadata), fields(path = %self.path.display()))]
    pub fn evaluate(
        &self,
        metadata: &MediaMetadata,
        download_type: DownloadType,
        is_playlist: bool,
    ) -> Option<PathBuf> {
        let rules = self.rules();
        debug!(count = rules.len(), "evaluating sorting rules");
        evaluate_rules(&rules, metadata, download_type, is_playlist)
    }

    /// Appends a rule with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError`] if the file cannot be read or written.
    pub fn add(&self, draft: RuleDraft) -> Result<SortingRule, RulesError> {
        self.mutate(|rules| {
            let rule = SortingRule::from_draft(Uuid::new_v4().to_string(), draft);
            rules.push(rule.clone());
            (true, rule)
        })
    }

    /// Replaces the editable fields of rule `id`. Returns false when absent.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError`] if the file cannot be read or written.
    pub fn update(&self, id: &str, draft: RuleDraft) -> Result<bool, RulesError> {
        self.mutate(|rules| match rules.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                rule.apply(draft);
                (true, true)
            }
            None => (false, false),
        })
    }

    /// Removes rule `id`. Returns false when absent.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError`] if the file cannot be read or written.
    pub fn delete(&self, id: &str) -> Result<bool, RulesError> {
        self.mutate(|rules| {
            let before = rules.len();
            rules.retain(|r| r.id != id);
            let removed = rules.len() != before;
            (removed, removed)
        })
    }

    /// Swaps rule `id` with its neighbour. Returns false when nothing moved.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError`] if the file cannot be read or written.
    pub fn move_rule(&self, id: &str, direction: MoveDirection) -> Result<bool, RulesError> {
        self.mutate(|rules| {
            let Some(index) = rules.iter().position(|r| r.id == id) else {
                return (false, false);
            };
            let target = match direction {
                MoveDirection::Up if index > 0 => index - 1,
                MoveDirection::Down if index + 1 < rules.len() => index + 1,
                _ => return (false, false),
            };
            rules.swap(index, target);
            (true, true)
        })
    }

    /// Read-modify-write under the lock; `f` returns `(changed, result)`.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Vec<SortingRule>) -> (bool, T),
    ) -> Result<T, RulesError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut rules = self.read_file()?;
        let (changed, result) = f(&mut rules);
        if changed {
            self.write_file(&rules)?;
        }
        Ok(result)
    }

    fn read_file(&self) -> Result<Vec<SortingRule>, RulesError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(RulesError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|source| RulesError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Writes to a sibling temp file and renames it over the target.
    fn write_file(&self, rules: &[SortingRule]) -> Result<(), RulesError> {
        let io_err = |source| RulesError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let file = fs::File::create(&tmp).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        if let Err(e) = serde_json::to_writer_pretty(&mut writer, rules) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        writer.flush().map_err(io_err)?;
        drop(writer);

        fs::rename(&tmp, &self.path).map_err(io_err)?;
        debug!(path = %self.path.display(), count = rules.len(), "sorting rules saved");
        Ok(())
    }
}
