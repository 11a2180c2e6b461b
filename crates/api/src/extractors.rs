//! Request extractors.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

/// Header identifying an anonymous voter.
pub const FINGERPRINT_HEADER: &str = "x-fingerprint";

/// Voter fingerprint from `X-Fingerprint`, if present and non-blank.
#[derive(Debug, Clone, Default)]
pub struct Fingerprint(pub Option<String>);

impl Fingerprint {
    /// Borrow the fingerprint.
    #[must_use]
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S> FromRequestParts<S> for Fingerprint
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .headers
                .get(FINGERPRINT_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        ))
    }
}
