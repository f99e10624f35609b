//! Error types for archive operations.

use thiserror::Error;

/// Errors that can occur while reading or writing the archive ledger.
#[derive(Debug, Clone, Error)]
pub enum ArchiveError {
    /// Database operation failed.
    #[error("archive database error: {message}")]
    Database {
        /// Human-readable database error text.
        message: String,
        /// True when `SQLite` reported busy/locked.
        busy: bool,
    },

    /// The URL could not be normalized into an archive key.
    #[error("invalid archive url '{url}'\n  Suggestion: only http(s) URLs are archived")]
    InvalidUrl {
        /// Offending input.
        url: String,
    },
}

impl From<sqlx::Error> for ArchiveError {
    fn from(err: sqlx::Error) -> Self {
        let busy = match &err {
            sqlx::Error::Database(db) => {
                matches!(db.code().as_deref(), Some("5" | "6" | "SQLITE_BUSY" | "SQLITE_LOCKED"))
                    || db.message().to_ascii_lowercase().contains("database is locked")
            }
            _ => false,
        };
        Self::Database {
            message: err.to_string(),
            busy,
        }
    }
}

impl ArchiveError {
    /// Returns true when this error is a database busy/locked condition.
    #[must_use]
    pub fn is_busy_or_locked(&self) -> bool {
        matches!(self, Self::Database { busy: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_error_database_message() {
        let err = ArchiveError::Database {
            message: "disk I/O error".to_string(),
            busy: false,
        };
        assert!(err.to_string().contains("disk I/O error"));
        assert!(!err.is_busy_or_locked());
    }

    #[test]
    fn test_archive_error_invalid_url_has_suggestion() {
        let err = ArchiveError::InvalidUrl {
            url: "ftp://x".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ftp://x"));
        assert!(msg.contains("Suggestion"));
    }
}
