//! Failure classification and user-facing descriptors for downloader errors.
//!
//! The tool reports errors as free text (`ERROR: [youtube] abc: Private video`).
//! Classification is best-effort phrase matching; unclassified text passes
//! through unchanged in [`classify_message`].

use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)]
static ERROR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^ERROR:\s*(?:\[[^\]]+\]\s*)?(?:[\w-]+:\s)?(.+)$")
        .expect("error line regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureKind {
    Unavailable,
    Private,
    Removed,
    AuthRequired,
    Forbidden,
    BotChallenge,
    RateLimited,
    Network,
    Unknown,
}

impl FailureKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Unavailable => "Unavailable",
            Self::Private => "Private",
            Self::Removed => "Removed",
            Self::AuthRequired => "Authentication",
            Self::Forbidden => "Forbidden",
            Self::BotChallenge => "Bot check",
            Self::RateLimited => "Rate limited",
            Self::Network => "Network",
            Self::Unknown => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureDescriptor {
    pub kind: FailureKind,
    pub what: &'static str,
    pub why: &'static str,
    pub fix: &'static str,
}

/// Ordered phrase table; first hit wins. Phrases are lowercase.
const RULES: &[(&[&str], FailureDescriptor)] = &[
    (
        &["sign in to confirm you", "not a bot", "javascript runtime", "n challenge"],
        FailureDescriptor {
            kind: FailureKind::BotChallenge,
            what: "Blocked by an anti-bot challenge",
            why: "The site demanded a challenge that needs browser cookies or a JavaScript runtime.",
            fix: "Set a cookies browser or a JavaScript runtime path in the config, then retry.",
        },
    ),
    (
        &["private video", "this video is private"],
        FailureDescriptor {
            kind: FailureKind::Private,
            what: "Video is private",
            why: "The uploader restricted this video to approved accounts.",
            fix: "Use cookies from an account with access, or skip this item.",
        },
    ),
    (
        &[
            "has been removed",
            "account associated with this video has been terminated",
            "copyright claim",
            "no longer available",
        ],
        FailureDescriptor {
            kind: FailureKind::Removed,
            what: "Video was removed",
            why: "The host took the video down or terminated the uploader.",
            fix: "Nothing to retry; look for another source.",
        },
    ),
    (
        &[
            "members-only",
            "join this channel",
            "login required",
            "requires authentication",
            "sign in to view",
            "age-restricted",
            "confirm your age",
            "http error 401",
        ],
        FailureDescriptor {
            kind: FailureKind::AuthRequired,
            what: "Authentication required",
            why: "The content is gated behind a logged-in session.",
            fix: "Configure cookies from a logged-in browser and retry.",
        },
    ),
    (
        &["http error 403", "forbidden"],
        FailureDescriptor {
            kind: FailureKind::Forbidden,
            what: "Access forbidden",
            why: "The host refused the request, often due to stale cookies or cached signatures.",
            fix: "Update the downloader, refresh cookies, then retry.",
        },
    ),
    (
        &["http error 429", "too many requests", "rate-limit", "rate limit"],
        FailureDescriptor {
            kind: FailureKind::RateLimited,
            what: "Rate limited by host",
            why: "Too many requests were sent in a short window.",
            fix: "Wait a while, lower concurrency or set a rate limit, then retry.",
        },
    ),
    (
        &[
            "video unavailable",
            "this video is unavailable",
            "is not available",
            "premieres in",
            "this live event will begin",
            "not available in your country",
        ],
        FailureDescriptor {
            kind: FailureKind::Unavailable,
            what: "Video unavailable",
            why: "The host reports the video cannot be played right now (region lock or scheduled stream).",
            fix: "Retry later or from another region.",
        },
    ),
    (
        &[
            "timed out",
            "connection reset",
            "name or service not known",
            "temporary failure in name resolution",
            "unable to download webpage",
            "network is unreachable",
            "ssl",
        ],
        FailureDescriptor {
            kind: FailureKind::Network,
            what: "Network request failed",
            why: "Connectivity, DNS, TLS or VPN conditions interrupted the transfer.",
            fix: "Check connectivity, then retry.",
        },
    ),
];

const UNKNOWN: FailureDescriptor = FailureDescriptor {
    kind: FailureKind::Unknown,
    what: "Unhandled failure",
    why: "The error did not match a known category and needs closer inspection.",
    fix: "Inspect the output below and retry.",
};

/// Classifies raw process diagnostics into a descriptor.
#[must_use]
pub fn classify_failure(diagnostic: &str) -> FailureDescriptor {
    let lower = diagnostic.to_lowercase();
    RULES
        .iter()
        .find(|(phrases, _)| phrases.iter().any(|p| lower.contains(p)))
        .map_or(UNKNOWN, |(_, descriptor)| *descriptor)
}

/// User-facing one-line message for a failed process.
///
/// Classified failures get their `what` plus the tool's own error line;
/// unknown ones pass the most relevant raw text through.
#[must_use]
pub fn classify_message(diagnostic: &str) -> String {
    let descriptor = classify_failure(diagnostic);
    let detail = last_error_line(diagnostic).unwrap_or_else(|| {
        diagnostic
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default()
            .to_string()
    });
    match descriptor.kind {
        FailureKind::Unknown if detail.is_empty() => descriptor.what.to_string(),
        FailureKind::Unknown => detail,
        _ if detail.is_empty() => descriptor.what.to_string(),
        _ => format!("{}: {detail}", descriptor.what),
    }
}

/// Text of the last `ERROR:` line, stripped of extractor tag and id prefix.
fn last_error_line(diagnostic: &str) -> Option<String> {
    ERROR_LINE
        .captures_iter(diagnostic)
        .last()
        .map(|caps| caps[1].trim().to_string())
        .filter(|s| !s.is_empty())
}
