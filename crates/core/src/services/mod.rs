//! Business logic services.

#![allow(missing_docs)]

pub mod catalog;
pub mod invalidation;
pub mod page;
pub mod scheduler;
pub mod snapshot;
pub mod vote;

pub use catalog::{CatalogSource, CatalogSyncService};
pub use invalidation::CacheInvalidator;
pub use page::{DEFAULT_LIMIT, MAX_LIMIT, Page, PageParams, PageQueryEngine, PageRequest, TallyItem};
pub use scheduler::Scheduler;
pub use snapshot::{ArchiveReport, SnapshotArchiver};
pub use vote::{VOTING_WINDOW, VoteLedger, VoteOutcome};
