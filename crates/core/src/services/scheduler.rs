//! Periodic background jobs.
//!
//! Each job is a long-lived task that sleeps until its next trigger. The
//! shared cancellation token is checked at every wait point and between the
//! discrete steps of a run, never in the middle of a write.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use cinekami_db::YearMonth;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::catalog::CatalogSyncService;
use super::snapshot::{SnapshotArchiver, next_monthly_run};

/// First catalog sync trigger after `now`: Monday 03:00 UTC.
#[must_use]
pub fn next_weekly_run(now: DateTime<Utc>) -> DateTime<Utc> {
    let run_at = NaiveTime::from_hms_opt(3, 0, 0).unwrap_or(NaiveTime::MIN);
    let days_to_monday = (7 - i64::from(now.weekday().num_days_from_monday())) % 7;
    let candidate = (now.date_naive() + Duration::days(days_to_monday))
        .and_time(run_at)
        .and_utc();
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(7)
    }
}

fn until(at: DateTime<Utc>) -> StdDuration {
    (at - Utc::now()).to_std().unwrap_or(StdDuration::ZERO)
}

/// Sleep until `at`. Returns `false` when cancelled first.
async fn wait_until(at: DateTime<Utc>, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(until(at)) => true,
    }
}

/// Owner of the background job tasks.
pub struct Scheduler {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a scheduler with no jobs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Token cancelled on shutdown.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of running jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no job was spawned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Archive the previous month shortly after every month rollover.
    pub fn spawn_monthly_archive(&mut self, archiver: SnapshotArchiver) {
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            info!("Monthly archive job started");
            loop {
                let run_at = next_monthly_run(Utc::now());
                if !wait_until(run_at, &cancel).await {
                    break;
                }
                let month = YearMonth::containing(run_at).previous();
                if let Err(e) = archiver.archive_month(month, Utc::now(), &cancel).await {
                    error!(%month, error = %e, "Monthly archive failed");
                }
            }
            info!("Monthly archive job stopped");
        }));
    }

    /// Refresh the current month's catalog every week.
    pub fn spawn_weekly_sync(&mut self, catalog: CatalogSyncService) {
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            info!("Weekly catalog sync job started");
            loop {
                let run_at = next_weekly_run(Utc::now());
                if !wait_until(run_at, &cancel).await {
                    break;
                }
                let month = YearMonth::containing(run_at);
                if let Err(e) = catalog.sync_month(month, &cancel).await {
                    error!(%month, error = %e, "Weekly catalog sync failed");
                }
            }
            info!("Weekly catalog sync job stopped");
        }));
    }

    /// Cancel every job and wait for them to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Background job panicked");
            }
        }
    }
}
