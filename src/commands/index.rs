//! Index command handlers: rebuild the supported-sites index.

use anyhow::{Context, Result};
use mediadl_core::queue::ExtractorIndex;
use mediadl_core::{AppConfig, TokioLauncher};

use crate::ProcessExit;

/// Runs the downloader's extractor listing now and saves the result.
pub(crate) async fn run_index_rebuild(config: &AppConfig) -> Result<ProcessExit> {
    let path = config.extractor_index_path();
    let index = ExtractorIndex::rebuild(&TokioLauncher::new(), &config.ytdlp_path, &path)
        .await
        .context("extractor index rebuild failed")?;
    println!(
        "Indexed {} extractors into {}",
        index.entries.len(),
        path.display()
    );
    Ok(ProcessExit::Success)
}
