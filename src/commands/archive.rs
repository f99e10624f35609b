//! Archive command handlers: check, prune and remove ledger entries.

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use mediadl_core::{AppConfig, ArchiveStore, Database};
use tracing::debug;

use crate::ProcessExit;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Opens (creating if needed) the archive database in the state directory.
pub(crate) async fn open_archive(config: &AppConfig) -> Result<ArchiveStore> {
    fs::create_dir_all(&config.state_dir).with_context(|| {
        format!(
            "failed to create state directory {}",
            config.state_dir.display()
        )
    })?;
    let path = config.archive_db_path();
    debug!(path = %path.display(), "opening archive");
    let db = Database::new(&path)
        .await
        .with_context(|| format!("failed to open archive {}", path.display()))?;
    Ok(ArchiveStore::new(db))
}

/// Exit status mirrors the answer: success when the URL is archived.
pub(crate) async fn run_archive_check(config: &AppConfig, url: &str) -> Result<ProcessExit> {
    let archive = open_archive(config).await?;
    match archive.get(url).await? {
        Some(entry) => {
            println!("archived: {} (at {})", entry.url, entry.archived_at);
            Ok(ProcessExit::Success)
        }
        None => {
            println!("not archived: {url}");
            Ok(ProcessExit::Failure)
        }
    }
}

pub(crate) async fn run_archive_prune(config: &AppConfig, days: u64) -> Result<ProcessExit> {
    let archive = open_archive(config).await?;
    let age = Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY));
    let removed = archive.prune_older_than(age).await?;
    println!("Pruned {removed} entries older than {days} days");
    Ok(ProcessExit::Success)
}

pub(crate) async fn run_archive_remove(config: &AppConfig, url: &str) -> Result<ProcessExit> {
    let archive = open_archive(config).await?;
    if archive.remove(url).await? {
        println!("Removed {url}");
        Ok(ProcessExit::Success)
    } else {
        println!("not archived: {url}");
        Ok(ProcessExit::Failure)
    }
}
