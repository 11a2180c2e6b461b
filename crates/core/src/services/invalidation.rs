//! Cache invalidation after writes.
//!
//! Invalidation is best-effort: failures are logged and never surface to
//! the caller, since every cached page also expires on its own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cinekami_common::{Cache, CacheKeys};
use cinekami_db::YearMonth;
use tracing::{debug, warn};

/// Drops cached pages made stale by a write.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Arc<dyn Cache>,
}

impl CacheInvalidator {
    /// Create a new invalidator.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    async fn drop_prefix(&self, prefix: &str) {
        match self.cache.delete_prefix(prefix).await {
            Ok(removed) => debug!(prefix = %prefix, removed, "Invalidated cached pages"),
            Err(e) => warn!(prefix = %prefix, error = %e, "Cache invalidation failed"),
        }
    }

    /// A vote changed a movie's counters.
    pub async fn invalidate_vote(&self, movie_id: i64, now: DateTime<Utc>) {
        self.drop_prefix(&CacheKeys::tallies_prefix(movie_id)).await;
        self.invalidate_active_movies(YearMonth::containing(now)).await;
    }

    /// The active listing of `month` changed.
    pub async fn invalidate_active_movies(&self, month: YearMonth) {
        self.drop_prefix(&CacheKeys::active_movies_prefix(&month.to_string()))
            .await;
    }

    /// Snapshots of `month` were (re)written.
    pub async fn invalidate_snapshots(&self, month: YearMonth) {
        self.drop_prefix(&CacheKeys::snapshots_prefix(&month.to_string()))
            .await;
        if let Err(e) = self.cache.delete(CacheKeys::snapshots_available()).await {
            warn!(error = %e, "Cache invalidation failed");
        }
    }
}
