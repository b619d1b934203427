//! Token Blacklist
//!
//! Revoked access tokens, each kept only until its own expiry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use platform::token::TokenSigner;

use crate::application::deadline::store_call;
use crate::domain::entity::blacklisted_token::BlacklistedToken;
use crate::domain::repository::TokenBlacklistStore;
use crate::error::{AuthError, AuthResult, UnauthorizedReason};

pub struct TokenBlacklist<B>
where
    B: TokenBlacklistStore,
{
    store: Arc<B>,
    signer: Arc<TokenSigner>,
    timeout: std::time::Duration,
}

impl<B> TokenBlacklist<B>
where
    B: TokenBlacklistStore,
{
    pub fn new(store: Arc<B>, signer: Arc<TokenSigner>, timeout: std::time::Duration) -> Self {
        Self {
            store,
            signer,
            timeout,
        }
    }

    /// Revoke `token` until its `exp`. Idempotent.
    ///
    /// A token that is already past its expiry is not stored; verification
    /// rejects it anyway.
    pub async fn blacklist(&self, token: &str) -> AuthResult<()> {
        let claims = self
            .signer
            .decode_unverified(token)
            .map_err(|_| AuthError::Unauthorized(UnauthorizedReason::InvalidOrExpired))?;

        let Some(expires_at) = DateTime::<Utc>::from_timestamp(claims.exp, 0) else {
            return Err(AuthError::Unauthorized(UnauthorizedReason::InvalidOrExpired));
        };

        let entry = BlacklistedToken {
            token: token.to_string(),
            expires_at,
        };
        if entry.is_expired_at(Utc::now()) {
            tracing::debug!(subject = %claims.sub, "Skipping blacklist of expired token");
            return Ok(());
        }

        store_call(
            self.timeout,
            "blacklist_token",
            None,
            self.store.insert(&entry),
        )
        .await?;

        tracing::debug!(subject = %claims.sub, expires_at = %expires_at, "Access token blacklisted");
        Ok(())
    }

    pub async fn is_blacklisted(&self, token: &str) -> AuthResult<bool> {
        store_call(
            self.timeout,
            "check_blacklist",
            None,
            self.store.exists(token),
        )
        .await
    }
}
