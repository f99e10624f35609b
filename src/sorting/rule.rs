//! Persisted sorting-rule model and condition evaluation.
//!
//! The on-disk shape is a JSON array of rule objects. Older files may carry
//! single-filter fields (`uploaders`, `filter_field`/`filter_operator`/
//! `filter_values`, `audio_only`, `date_subfolders`); those are still honored
//! when evaluating and are dropped the next time the rule is updated.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::metadata::MediaMetadata;

/// Metadata fields compared numerically by `greater_than`/`less_than`/`equals`.
const NUMERIC_FIELDS: &[&str] = &[
    "duration",
    "height",
    "width",
    "fps",
    "filesize",
    "filesize_approx",
    "view_count",
    "like_count",
    "comment_count",
    "abr",
    "vbr",
    "tbr",
];

/// Classification of a finished download used for rule filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadType {
    Video,
    Audio,
    Gallery,
    Metadata,
}

impl DownloadType {
    /// Returns the persisted/display name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "Video",
            Self::Audio => "Audio",
            Self::Gallery => "Gallery",
            Self::Metadata => "Metadata",
        }
    }
}

impl fmt::Display for DownloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which downloads a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuleScope {
    #[default]
    All,
    Video,
    Audio,
    Gallery,
    #[serde(rename = "Video Playlist")]
    VideoPlaylist,
    #[serde(rename = "Audio Playlist")]
    AudioPlaylist,
    /// A type name this version does not know; never matches.
    #[serde(other)]
    Unknown,
}

impl RuleScope {
    /// True when a rule with this scope applies to the given download.
    #[must_use]
    pub fn applies_to(self, download_type: DownloadType, is_playlist: bool) -> bool {
        match self {
            Self::All => true,
            Self::Video => download_type == DownloadType::Video,
            Self::Audio => download_type == DownloadType::Audio,
            Self::Gallery => download_type == DownloadType::Gallery,
            Self::VideoPlaylist => download_type == DownloadType::Video && is_playlist,
            Self::AudioPlaylist => download_type == DownloadType::Audio && is_playlist,
            Self::Unknown => false,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Video => "Video",
            Self::Audio => "Audio",
            Self::Gallery => "Gallery",
            Self::VideoPlaylist => "Video Playlist",
            Self::AudioPlaylist => "Audio Playlist",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RuleScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "gallery" => Ok(Self::Gallery),
            "video playlist" | "video-playlist" => Ok(Self::VideoPlaylist),
            "audio playlist" | "audio-playlist" => Ok(Self::AudioPlaylist),
            other => Err(format!("unknown rule type: {other}")),
        }
    }
}

/// Comparison applied by a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[default]
    IsOneOf,
    Contains,
    Equals,
    GreaterThan,
    LessThan,
    /// Unrecognized operator name; never matches.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::IsOneOf => "is_one_of",
            Self::Contains => "contains",
            Self::Equals => "equals",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::Unknown => "unknown",
        })
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "is_one_of" => Ok(Self::IsOneOf),
            "contains" => Ok(Self::Contains),
            "equals" => Ok(Self::Equals),
            "greater_than" => Ok(Self::GreaterThan),
            "less_than" => Ok(Self::LessThan),
            other => Err(format!("unknown operator: {other}")),
        }
    }
}

/// One `field operator values` test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default = "default_field")]
    pub field: String,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub values: Vec<String>,
}

fn default_field() -> String {
    "uploader".to_string()
}

impl Condition {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, values: Vec<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            values,
        }
    }

    /// Evaluates this condition against metadata.
    ///
    /// A condition without values never matches. Numeric operators on
    /// non-numeric input fail closed.
    #[must_use]
    pub fn matches(&self, metadata: &MediaMetadata) -> bool {
        let wanted: Vec<String> = self
            .values
            .iter()
            .map(|v| v.trim().to_lowercase())
            .collect();
        if wanted.is_empty() {
            return false;
        }

        let value = match metadata.get(&self.field) {
            Some(v) => v,
            None if self.field == "uploader" => match metadata.get("channel") {
                Some(v) => v,
                None => return false,
            },
            None => return false,
        };

        if NUMERIC_FIELDS.contains(&self.field.as_str()) {
            return self.matches_numeric(value, &wanted[0]);
        }

        let items = value_items(value);
        match self.operator {
            Operator::IsOneOf | Operator::Equals => {
                items.iter().any(|item| wanted.iter().any(|w| w == item))
            }
            Operator::Contains => items
                .iter()
                .any(|item| wanted.iter().any(|w| item.contains(w.as_str()))),
            Operator::GreaterThan | Operator::LessThan | Operator::Unknown => false,
        }
    }

    fn matches_numeric(&self, value: &Value, wanted: &str) -> bool {
        let actual = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        let (Some(actual), Ok(target)) = (actual, wanted.parse::<f64>()) else {
            return false;
        };
        if !actual.is_finite() || !target.is_finite() {
            return false;
        }
        match self.operator {
            Operator::GreaterThan => actual > target,
            Operator::LessThan => actual < target,
            Operator::Equals => (actual - target).abs() < f64::EPSILON,
            Operator::IsOneOf | Operator::Contains | Operator::Unknown => false,
        }
    }
}

/// Lowercased, trimmed string items of a scalar or list value.
fn value_items(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(scalar_text).collect(),
        other => vec![scalar_text(other)],
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_lowercase(),
        other => other.to_string().trim().to_lowercase(),
    }
}

/// Accepts `["a", 600, true]` and yields their string forms.
fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter(|v| !v.is_null())
        .map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}

/// A user-authored routing rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortingRule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub target_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subfolder_pattern: Option<String>,
    #[serde(default)]
    pub download_type: RuleScope,
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) uploaders: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) audio_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) date_subfolders: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) filter_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) filter_operator: Option<Operator>,
    #[serde(
        default,
        deserialize_with = "lenient_optional_strings",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) filter_values: Option<Vec<String>>,
}

fn lenient_optional_strings<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_strings(deserializer).map(Some)
}

/// Editable part of a rule, used for add and update.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDraft {
    pub name: String,
    pub target_path: PathBuf,
    pub subfolder_pattern: Option<String>,
    pub download_type: RuleScope,
    pub conditions: Vec<Condition>,
}

impl SortingRule {
    /// Builds a rule from a draft under the given id.
    #[must_use]
    pub fn from_draft(id: String, draft: RuleDraft) -> Self {
        Self {
            id,
            name: draft.name,
            target_path: draft.target_path,
            subfolder_pattern: normalize_subfolder_pattern(draft.subfolder_pattern.as_deref()),
            download_type: draft.download_type,
            conditions: draft.conditions,
            uploaders: None,
            audio_only: None,
            date_subfolders: None,
            filter_field: None,
            filter_operator: None,
            filter_values: None,
        }
    }

    /// Replaces the editable fields and drops legacy ones.
    pub fn apply(&mut self, draft: RuleDraft) {
        let id = std::mem::take(&mut self.id);
        *self = Self::from_draft(id, draft);
    }

    /// Scope after folding the legacy `audio_only` flag.
    #[must_use]
    pub fn effective_scope(&self) -> RuleScope {
        if self.audio_only == Some(true) && self.download_type == RuleScope::All {
            RuleScope::Audio
        } else {
            self.download_type
        }
    }

    /// Conditions after folding legacy single-filter fields.
    #[must_use]
    pub fn effective_conditions(&self) -> Vec<Condition> {
        if self.filter_field.is_some() || self.filter_values.is_some() {
            return vec![Condition::new(
                self.filter_field.clone().unwrap_or_else(default_field),
                self.filter_operator.unwrap_or_default(),
                self.filter_values.clone().unwrap_or_default(),
            )];
        }
        if let Some(uploaders) = &self.uploaders {
            return vec![Condition::new(
                "uploader",
                Operator::IsOneOf,
                uploaders.clone(),
            )];
        }
        self.conditions.clone()
    }

    /// Subfolder pattern after folding the legacy `date_subfolders` flag.
    #[must_use]
    pub fn effective_subfolder(&self) -> Option<String> {
        if self.date_subfolders == Some(true) {
            return Some("{upload_year} - {upload_month}".to_string());
        }
        self.subfolder_pattern.clone()
    }

    /// True when the rule still carries pre-conditions fields.
    #[must_use]
    pub fn has_legacy_fields(&self) -> bool {
        self.uploaders.is_some()
            || self.audio_only.is_some()
            || self.date_subfolders.is_some()
            || self.filter_field.is_some()
            || self.filter_operator.is_some()
            || self.filter_values.is_some()
    }

    /// True when the type filter passes and every condition holds.
    #[must_use]
    pub fn matches(
        &self,
        metadata: &MediaMetadata,
        download_type: DownloadType,
        is_playlist: bool,
    ) -> bool {
        if !self.effective_scope().applies_to(download_type, is_playlist) {
            return false;
        }
        self.effective_conditions()
            .iter()
            .all(|cond| cond.matches(metadata))
    }
}

/// Backslashes become `/`, repeated slashes collapse, outer slashes go.
#[must_use]
pub fn normalize_subfolder_pattern(pattern: Option<&str>) -> Option<String> {
    let pattern = pattern?.replace('\\', "/");
    let joined = pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
