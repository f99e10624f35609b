//! Completed-URL archive ledger.
//!
//! The archive remembers every URL that finished downloading (URL → unix
//! timestamp) so the scheduler can flag re-submissions as duplicates before
//! any process is spawned.
//!
//! Reads degrade instead of failing: a broken database makes
//! [`ArchiveRepository::is_archived`] answer "not archived" and logs the cause.
//!
//! # Example
//!
//! ```no_run
//! use mediadl_core::{ArchiveStore, Database};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let archive = ArchiveStore::new(Database::new_in_memory().await?);
//! archive.record("https://youtu.be/dQw4w9WgXcQ").await?;
//! assert!(archive.contains("https://www.youtube.com/watch?v=dQw4w9WgXcQ").await?);
//! # Ok(())
//! # }
//! ```

mod error;
mod normalize;
mod repository;

pub use error::ArchiveError;
pub use normalize::normalize_url;
pub use repository::ArchiveRepository;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sqlx::Row;
use tracing::{debug, info, instrument};

use crate::db::Database;

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// A single ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Normalized URL key.
    pub url: String,
    /// Unix seconds of the last successful completion.
    pub archived_at: i64,
}

/// `SQLite`-backed archive ledger.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    db: Database,
}

impl ArchiveStore {
    /// Creates an archive over an opened database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Point lookup by (normalized) URL.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] if the URL is invalid or the query fails.
    #[instrument(skip(self))]
    pub async fn contains(&self, url: &str) -> Result<bool> {
        Ok(self.get(url).await?.is_some())
    }

    /// Returns the ledger row for `url`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] if the URL is invalid or the query fails.
    pub async fn get(&self, url: &str) -> Result<Option<ArchiveEntry>> {
        let key = normalize_url(url)?;
        let row = sqlx::query("SELECT url, archived_at FROM archive WHERE url = ?")
            .bind(&key)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(|r| ArchiveEntry {
            url: r.get("url"),
            archived_at: r.get("archived_at"),
        }))
    }

    /// Inserts or refreshes the ledger row for `url` with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] if the URL is invalid or the upsert fails.
    #[instrument(skip(self))]
    pub async fn record(&self, url: &str) -> Result<()> {
        self.record_at(url, unix_now()).await
    }

    /// Upsert with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] if the URL is invalid or the upsert fails.
    pub async fn record_at(&self, url: &str, archived_at: i64) -> Result<()> {
        let key = normalize_url(url)?;
        sqlx::query(
            r"INSERT INTO archive (url, archived_at) VALUES (?, ?)
              ON CONFLICT(url) DO UPDATE SET archived_at = excluded.archived_at",
        )
        .bind(&key)
        .bind(archived_at)
        .execute(self.db.pool())
        .await?;
        debug!(url = %key, archived_at, "archived url");
        Ok(())
    }

    /// Deletes the ledger row for `url`. Returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] if the URL is invalid or the delete fails.
    pub async fn remove(&self, url: &str) -> Result<bool> {
        let key = normalize_url(url)?;
        let result = sqlx::query("DELETE FROM archive WHERE url = ?")
            .bind(&key)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every row older than `age`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn prune_older_than(&self, age: Duration) -> Result<u64> {
        let age_secs = i64::try_from(age.as_secs()).unwrap_or(i64::MAX);
        let cutoff = unix_now().saturating_sub(age_secs);
        let result = sqlx::query("DELETE FROM archive WHERE archived_at < ?")
            .bind(cutoff)
            .execute(self.db.pool())
            .await?;
        let removed = result.rows_affected();
        info!(removed, cutoff, "pruned archive");
        Ok(removed)
    }

    /// Number of archived URLs.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Database`] if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM archive")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
