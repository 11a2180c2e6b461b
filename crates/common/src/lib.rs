//! Common utilities and shared types for cinekami-rs.
//!
//! This crate provides foundational components used across all cinekami-rs crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **Cursors**: Signed keyset pagination tokens via [`CursorCodec`]
//! - **Cache**: TTL key/value caching via the [`Cache`] trait (in-process or Redis)
//! - **Catalog**: TMDb HTTP client used by the catalog sync job
//!
//! # Example
//!
//! ```no_run
//! use cinekami_common::{AppResult, Config, CursorCodec, CursorKind, Cursor};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let codec = CursorCodec::new(&config.cursor.secret_bytes());
//!     let token = codec.encode(CursorKind::Movies, &Cursor::Metric { key: 12.5, id: 42 })?;
//!     let position = codec.decode(CursorKind::Movies, &token)?;
//!     println!("{position:?}");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod cursor;
pub mod error;
pub mod tmdb;

pub use cache::{Cache, CacheKeys, InMemoryCache, RedisCache};
pub use config::Config;
pub use cursor::{Cursor, CursorCodec, CursorKind};
pub use error::{AppError, AppResult};
pub use tmdb::{TmdbClient, TmdbExternalIds, TmdbMovie};
