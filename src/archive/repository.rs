//! Repository seam for archive lookups used by the scheduler.
//!
//! The scheduler never sees an [`ArchiveError`]: the seam folds persistence
//! failures into "not archived" / "not recorded" and logs them.

use async_trait::async_trait;
use tracing::warn;

use super::ArchiveStore;

/// Data-access contract the scheduler depends on.
#[async_trait]
pub trait ArchiveRepository: Send + Sync {
    /// True when `url` completed before. Errors degrade to `false`.
    async fn is_archived(&self, url: &str) -> bool;

    /// Records a successful completion. Errors are logged.
    async fn mark_archived(&self, url: &str);
}

#[async_trait]
impl ArchiveRepository for ArchiveStore {
    async fn is_archived(&self, url: &str) -> bool {
        match self.contains(url).await {
            Ok(found) => found,
            Err(e) => {
                warn!(url = %url, error = %e, "archive lookup failed; treating as not archived");
                false
            }
        }
    }

    async fn mark_archived(&self, url: &str) {
        if let Err(e) = self.record(url).await {
            warn!(url = %url, error = %e, "failed to record url in archive");
        }
    }
}
