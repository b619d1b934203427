//! Refresh Token Entry
//!
//! Opaque refresh token owned by exactly one user, stored verbatim.

use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct RefreshTokenEntry {
    pub token: String,
    pub expires: DateTime<Utc>,
}

impl RefreshTokenEntry {
    pub fn new(token: String, expires: DateTime<Utc>) -> Self {
        Self { token, expires }
    }

    /// Expired once `expires` is at or before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

impl fmt::Debug for RefreshTokenEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshTokenEntry")
            .field("token", &"[REDACTED]")
            .field("expires", &self.expires)
            .finish()
    }
}
