//! Blacklisted access token
//!
//! Lives exactly as long as the token it revokes.

use chrono::{DateTime, Utc};

#[derive(Clone, PartialEq, Eq)]
pub struct BlacklistedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl BlacklistedToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl std::fmt::Debug for BlacklistedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlacklistedToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
