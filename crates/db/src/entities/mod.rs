//! Database entities.

#![allow(missing_docs)]

pub mod movie;
pub mod snapshot;
pub mod tally;
pub mod vote;
pub mod voter;

pub use movie::Entity as Movie;
pub use snapshot::Entity as Snapshot;
pub use tally::Entity as Tally;
pub use vote::{Entity as Vote, VoteCategory};
pub use voter::Entity as Voter;
