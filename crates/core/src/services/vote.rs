//! Vote ledger service.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use cinekami_common::{AppError, AppResult};
use cinekami_db::{MovieStore, Storage, TallyMap, VoteCategory, VoteStore};
use serde::Serialize;
use tracing::{debug, info};

/// How long after release a movie accepts votes.
pub const VOTING_WINDOW: Duration = Duration::days(14);

/// Whether a movie released on `release_date` still accepts votes at `now`.
///
/// The release date counts from 00:00:00 UTC and the window end is inclusive.
#[must_use]
pub fn is_open(release_date: NaiveDate, now: DateTime<Utc>) -> bool {
    let opens_at = release_date.and_time(chrono::NaiveTime::MIN).and_utc();
    now <= opens_at + VOTING_WINDOW
}

/// Result of a vote attempt.
#[derive(Debug, Clone, Serialize)]
pub struct VoteOutcome {
    /// Whether a new vote was recorded.
    pub inserted: bool,
    /// Counters after the attempt.
    pub tallies: TallyMap,
    /// Category stored for the voter, which differs from the requested one
    /// when an earlier vote exists.
    pub voted_category: Option<VoteCategory>,
}

/// Records at most one vote per voter and movie.
#[derive(Clone)]
pub struct VoteLedger {
    storage: Arc<dyn Storage>,
}

impl VoteLedger {
    /// Create a new vote ledger.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Cast a vote.
    ///
    /// A repeated vote by the same fingerprint is not an error: it returns
    /// `inserted = false` and leaves the counters untouched. Cache
    /// invalidation is left to the caller.
    pub async fn cast_vote(
        &self,
        movie_id: i64,
        category: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> AppResult<VoteOutcome> {
        let fingerprint = fingerprint.trim();
        if fingerprint.is_empty() {
            return Err(AppError::BadRequest("fingerprint is required".to_string()));
        }

        let movie = self
            .storage
            .find_movie(movie_id)
            .await?
            .ok_or(AppError::MovieNotFound(movie_id))?;

        if !is_open(movie.release_date, now) {
            debug!(movie_id, release_date = %movie.release_date, "Vote after window");
            return Err(AppError::VotingClosed);
        }

        let category: VoteCategory = category.trim().parse()?;

        let voter_id = self.storage.get_or_create_voter(fingerprint).await?;
        let inserted = self
            .storage
            .insert_vote_if_absent(movie_id, voter_id, category)
            .await?;
        if inserted {
            self.storage.increment_tally(movie_id, category).await?;
            info!(movie_id, %category, "Vote recorded");
        } else {
            debug!(movie_id, voter_id, "Duplicate vote ignored");
        }

        let tallies = self.storage.tallies(movie_id).await?;
        let voted_category = if inserted {
            Some(category)
        } else {
            self.storage.voter_category(movie_id, fingerprint).await?
        };

        Ok(VoteOutcome {
            inserted,
            tallies,
            voted_category,
        })
    }

    /// All four counters of a movie, zero-filled.
    pub async fn get_tallies(&self, movie_id: i64) -> AppResult<TallyMap> {
        self.storage.tallies(movie_id).await
    }
}
