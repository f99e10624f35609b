//! Admission tiers: which check decides whether a URL is supported.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::download::{DownloadOptions, ToolKind};
use crate::input::host_of;

/// High-traffic hosts admitted without any lookup.
#[allow(clippy::expect_used)]
static FAST_TRACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://(?:www\.|m\.|music\.)?(?:youtube\.com|youtu\.be)/")
        .expect("fast-track regex is valid")
});

/// Image and gallery sites handled by the gallery tool.
const GALLERY_HOSTS: &[&str] = &[
    "instagram.com",
    "pixiv.net",
    "deviantart.com",
    "artstation.com",
    "imgur.com",
    "flickr.com",
    "tumblr.com",
    "danbooru.donmai.us",
    "gelbooru.com",
    "kemono.su",
    "pinterest.com",
    "bsky.app",
];

/// How an admitted URL was judged supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionTier {
    FastTrack,
    Index,
    Probe,
}

/// True for URLs on the fast-track host list.
#[must_use]
pub fn is_fast_track(url: &str) -> bool {
    FAST_TRACK.is_match(url.trim())
}

/// True when `url` belongs to a gallery-style site.
#[must_use]
pub fn is_gallery_host(url: &Url) -> bool {
    let host = host_of(url);
    GALLERY_HOSTS
        .iter()
        .any(|g| host == *g || host.ends_with(&format!(".{g}")))
}

/// The tool a request runs with: explicit choice first, else by host.
#[must_use]
pub fn choose_tool(url: &Url, options: &DownloadOptions) -> ToolKind {
    let gallery = !options.metadata_only
        && !options.audio_only
        && options
            .use_gallery_tool
            .unwrap_or_else(|| is_gallery_host(url));
    if gallery {
        ToolKind::Gallery
    } else {
        ToolKind::Media
    }
}
