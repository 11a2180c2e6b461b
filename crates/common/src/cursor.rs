//! Signed keyset pagination cursors.
//!
//! A cursor is an opaque token naming the last row a client has seen in a
//! sorted scan. The server never trusts its contents: every token carries an
//! HMAC-SHA256 tag over its payload, and the tag is verified before a single
//! payload byte is interpreted.
//!
//! Wire layouts (before base64url without padding):
//!
//! | kind | payload |
//! |------|---------|
//! | movies, snapshots | `f64 bits (8, BE) \| row id (i64, 8, BE)` |
//! | tallies | `count (i64, 8, BE) \| len (u16, 2, BE) \| category (len bytes)` |
//! | snapshots by id | `row id (i64, 8, BE)` |
//!
//! The payload is followed by the 32-byte tag. The tag also covers the cursor
//! kind, so a movies cursor cannot be replayed against the snapshots listing
//! even though both share a layout.
//!
//! # Example
//!
//! ```
//! use cinekami_common::{Cursor, CursorCodec, CursorKind};
//!
//! let codec = CursorCodec::new(b"server-secret");
//! let token = codec
//!     .encode(CursorKind::Movies, &Cursor::Metric { key: 87.5, id: 42 })
//!     .unwrap();
//! let decoded = codec.decode(CursorKind::Movies, &token).unwrap();
//! assert_eq!(decoded, Cursor::Metric { key: 87.5, id: 42 });
//! ```

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Length of the HMAC-SHA256 tag appended to every payload.
const TAG_LEN: usize = 32;

/// Which listing a cursor belongs to. Selects the payload layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorKind {
    /// Active movies, ordered by a numeric metric.
    Movies,
    /// Per-movie tallies, ordered by (count, category).
    Tallies,
    /// Monthly snapshots, ordered by a numeric metric.
    Snapshots,
    /// Monthly snapshots, ordered by movie id.
    SnapshotsById,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Metric,
    Tally,
    Id,
}

impl Layout {
    const fn min_payload_len(self) -> usize {
        match self {
            Self::Metric => 16,
            Self::Tally => 10,
            Self::Id => 8,
        }
    }
}

impl CursorKind {
    const fn label(self) -> &'static [u8] {
        match self {
            Self::Movies => b"movies",
            Self::Tallies => b"tallies",
            Self::Snapshots => b"snapshots",
            Self::SnapshotsById => b"snapshots-by-id",
        }
    }

    const fn layout(self) -> Layout {
        match self {
            Self::Movies | Self::Snapshots => Layout::Metric,
            Self::Tallies => Layout::Tally,
            Self::SnapshotsById => Layout::Id,
        }
    }
}

/// A decoded resume position.
#[derive(Debug, Clone, PartialEq)]
pub enum Cursor {
    /// Numeric sort key plus row id tie-break. Infinite keys are preserved.
    Metric {
        /// Sort key value of the last row.
        key: f64,
        /// Row id of the last row.
        id: i64,
    },
    /// Tally count plus category tie-break.
    Tally {
        /// Vote count of the last tally.
        count: i64,
        /// Category wire name of the last tally.
        category: String,
    },
    /// Bare row id.
    Id(i64),
}

/// Encodes and verifies pagination cursors with a server-held secret.
#[derive(Clone)]
pub struct CursorCodec {
    key: Arc<[u8]>,
}

impl fmt::Debug for CursorCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorCodec").field("key", &"<redacted>").finish()
    }
}

fn invalid(reason: &str) -> AppError {
    AppError::InvalidCursor(reason.to_string())
}

impl CursorCodec {
    /// Create a codec with the given signing secret.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: Arc::from(secret),
        }
    }

    fn mac(&self, kind: CursorKind) -> AppResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AppError::Internal(format!("Failed to initialise cursor MAC: {e}")))?;
        mac.update(kind.label());
        mac.update(&[0]);
        Ok(mac)
    }

    /// Encode a resume position for the given listing.
    ///
    /// Fails with [`AppError::Internal`] if the position does not match the
    /// layout of `kind`, or if a tally category does not fit a 16-bit length.
    pub fn encode(&self, kind: CursorKind, cursor: &Cursor) -> AppResult<String> {
        let mut buf = match (kind.layout(), cursor) {
            (Layout::Metric, Cursor::Metric { key, id }) => {
                let mut payload = Vec::with_capacity(16 + TAG_LEN);
                payload.extend_from_slice(&key.to_bits().to_be_bytes());
                payload.extend_from_slice(&id.to_be_bytes());
                payload
            }
            (Layout::Tally, Cursor::Tally { count, category }) => {
                let len = u16::try_from(category.len()).map_err(|_| {
                    AppError::Internal("Tally cursor category exceeds 65535 bytes".to_string())
                })?;
                let mut payload = Vec::with_capacity(10 + category.len() + TAG_LEN);
                payload.extend_from_slice(&count.to_be_bytes());
                payload.extend_from_slice(&len.to_be_bytes());
                payload.extend_from_slice(category.as_bytes());
                payload
            }
            (Layout::Id, Cursor::Id(id)) => {
                let mut payload = Vec::with_capacity(8 + TAG_LEN);
                payload.extend_from_slice(&id.to_be_bytes());
                payload
            }
            (layout, cursor) => {
                return Err(AppError::Internal(format!(
                    "Cursor {cursor:?} does not fit the {layout:?} layout of {kind:?}"
                )));
            }
        };

        let mut mac = self.mac(kind)?;
        mac.update(&buf);
        let tag = mac.finalize().into_bytes();
        buf.extend_from_slice(&tag);

        Ok(URL_SAFE_NO_PAD.encode(buf))
    }

    /// Verify and decode a token previously issued for the same listing.
    ///
    /// The tag is checked in constant time before the payload is parsed.
    pub fn decode(&self, kind: CursorKind, token: &str) -> AppResult<Cursor> {
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| invalid("malformed encoding"))?;

        let layout = kind.layout();
        if raw.len() < layout.min_payload_len() + TAG_LEN {
            return Err(invalid("invalid length"));
        }

        let (payload, tag) = raw.split_at(raw.len() - TAG_LEN);
        let mut mac = self.mac(kind)?;
        mac.update(payload);
        mac.verify_slice(tag)
            .map_err(|_| invalid("signature mismatch"))?;

        Self::parse(layout, payload)
    }

    fn parse(layout: Layout, payload: &[u8]) -> AppResult<Cursor> {
        match layout {
            Layout::Metric => {
                if payload.len() != 16 {
                    return Err(invalid("invalid payload"));
                }
                Ok(Cursor::Metric {
                    key: f64::from_bits(u64::from_be_bytes(be8(&payload[0..8])?)),
                    id: i64::from_be_bytes(be8(&payload[8..16])?),
                })
            }
            Layout::Tally => {
                let count = i64::from_be_bytes(be8(&payload[0..8])?);
                let len = usize::from(u16::from_be_bytes([payload[8], payload[9]]));
                if 10 + len != payload.len() {
                    return Err(invalid("invalid payload"));
                }
                let category = std::str::from_utf8(&payload[10..])
                    .map_err(|_| invalid("invalid payload"))?
                    .to_string();
                Ok(Cursor::Tally { count, category })
            }
            Layout::Id => {
                if payload.len() != 8 {
                    return Err(invalid("invalid payload"));
                }
                Ok(Cursor::Id(i64::from_be_bytes(be8(payload)?)))
            }
        }
    }
}

fn be8(bytes: &[u8]) -> AppResult<[u8; 8]> {
    bytes.try_into().map_err(|_| invalid("invalid payload"))
}
