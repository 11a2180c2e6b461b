//! HTTP API layer for cinekami-rs.
//!
//! - **Endpoints**: health, active movies, tallies, votes and snapshots
//! - **Extractors**: voter fingerprint
//! - **Middleware**: application state and correlation ids
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::{app, router};
pub use middleware::AppState;
