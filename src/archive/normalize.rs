//! Archive key normalization.
//!
//! Different spellings of the same video URL must hit the same ledger row:
//! `youtu.be/ID`, `youtube.com/shorts/ID` and `m.youtube.com/watch?v=ID` all
//! collapse to `https://www.youtube.com/watch?v=ID`.

use url::Url;

use super::ArchiveError;

/// Query parameters that never change what is downloaded.
const TRACKING_PARAMS: &[&str] = &["si", "feature", "pp", "utm_source", "utm_medium", "utm_campaign"];

/// Returns the canonical ledger key for `raw`.
///
/// # Errors
///
/// Returns [`ArchiveError::InvalidUrl`] when `raw` is not an http(s) URL.
pub fn normalize_url(raw: &str) -> Result<String, ArchiveError> {
    let trimmed = raw.trim();
    let invalid = || ArchiveError::InvalidUrl {
        url: trimmed.to_string(),
    };
    let mut url = Url::parse(trimmed).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    let host = url.host_str().ok_or_else(invalid)?.to_ascii_lowercase();

    if let Some(video_id) = youtube_video_id(&url, &host) {
        return Ok(format!("https://www.youtube.com/watch?v={video_id}"));
    }

    url.set_fragment(None);
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let mut out = url.to_string();
    if out.ends_with('/') && url.query().is_none() {
        out.pop();
    }
    Ok(out)
}

fn youtube_video_id(url: &Url, host: &str) -> Option<String> {
    let host = host.strip_prefix("www.").unwrap_or(host);
    let host = host.strip_prefix("m.").unwrap_or(host);
    match host {
        "youtu.be" => url
            .path_segments()?
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        "youtube.com" | "music.youtube.com" => {
            let mut segments = url.path_segments()?;
            match segments.next()? {
                "watch" => url
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned())
                    .filter(|v| !v.is_empty()),
                "shorts" | "live" => segments.next().filter(|s| !s.is_empty()).map(str::to_string),
                _ => None,
            }
        }
        _ => None,
    }
}
