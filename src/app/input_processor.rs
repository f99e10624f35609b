//! Assembly of the URL list from positional arguments and/or stdin.

use std::io::{self, IsTerminal, Read};

use anyhow::{Context, Result};
use mediadl_core::extract_urls;
use tracing::debug;

use crate::cli::DownloadArgs;

/// URLs to submit, and whether they were looked for in piped stdin.
pub(crate) struct CollectedInput {
    pub(crate) urls: Vec<String>,
    pub(crate) read_stdin: bool,
}

/// Positional URLs are submitted verbatim so bad ones are reported, not
/// silently skipped. Piped text is scanned for URLs.
pub(crate) fn collect_input(args: &DownloadArgs) -> Result<CollectedInput> {
    if !args.urls.is_empty() {
        return Ok(CollectedInput {
            urls: positional_urls(&args.urls),
            read_stdin: false,
        });
    }
    if io::stdin().is_terminal() {
        return Ok(CollectedInput {
            urls: Vec::new(),
            read_stdin: false,
        });
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read stdin")?;
    let urls = extract_urls(&buffer);
    debug!(found = urls.len(), "URLs extracted from stdin");
    Ok(CollectedInput {
        urls,
        read_stdin: true,
    })
}

/// Trims and de-duplicates, keeping first-seen order.
pub(crate) fn positional_urls(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for url in raw.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
        if !out.iter().any(|seen| seen == url) {
            out.push(url.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::positional_urls;

    #[test]
    fn test_positional_urls_dedupe_in_order() {
        let raw = vec![
            " https://youtu.be/a ".to_string(),
            "https://vimeo.com/1".to_string(),
            "https://youtu.be/a".to_string(),
            String::new(),
        ];
        assert_eq!(
            positional_urls(&raw),
            vec!["https://youtu.be/a".to_string(), "https://vimeo.com/1".to_string()]
        );
    }
}
