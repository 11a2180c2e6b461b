//! Core business logic for cinekami-rs.
//!
//! Paginated reads, vote recording, monthly archival, catalog sync and the
//! background scheduler that drives the last two.

pub mod services;

pub use services::*;
