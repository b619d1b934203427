//! Refresh Use Case
//!
//! Single-use rotation: the presented token is replaced by a new one in
//! the same slot, conditioned on it still being stored. Of two concurrent
//! calls with the same token, the one that loses the store's
//! replace-if-match fails with `InvalidRefreshToken`.

use std::sync::Arc;

use chrono::Utc;

use crate::application::config::AuthConfig;
use crate::application::deadline::store_call;
use crate::application::tokens::{SessionOutput, TokenIssuer};
use crate::domain::repository::UserStore;
use crate::error::{AuthError, AuthResult, UnauthorizedReason};

pub struct RefreshUseCase<U>
where
    U: UserStore,
{
    users: Arc<U>,
    issuer: TokenIssuer,
    config: Arc<AuthConfig>,
}

impl<U> RefreshUseCase<U>
where
    U: UserStore,
{
    pub fn new(users: Arc<U>, issuer: TokenIssuer, config: Arc<AuthConfig>) -> Self {
        Self {
            users,
            issuer,
            config,
        }
    }

    pub async fn execute(&self, refresh_token: &str) -> AuthResult<SessionOutput> {
        if refresh_token.is_empty() {
            return Err(AuthError::InvalidRefreshToken);
        }

        let user = store_call(
            self.config.store_timeout,
            "refresh.find_by_refresh_token",
            None,
            self.users.find_by_refresh_token(refresh_token),
        )
        .await?
        .ok_or_else(|| {
            tracing::warn!("Refresh rejected: unknown token");
            AuthError::InvalidRefreshToken
        })?;

        let entry = user
            .refresh_entry(refresh_token)
            .ok_or(AuthError::InvalidRefreshToken)?;
        if entry.is_expired_at(Utc::now()) {
            tracing::warn!(user_id = %user.id, "Refresh rejected: token expired");
            return Err(AuthError::RefreshTokenExpired);
        }

        if !user.is_active {
            tracing::warn!(user_id = %user.id, "Refresh rejected: user inactive");
            return Err(AuthError::Unauthorized(UnauthorizedReason::UserInactive));
        }

        let (tokens, new_entry) = self.issuer.issue(&user)?;
        let rotated = store_call(
            self.config.store_timeout,
            "refresh.replace_refresh_token",
            Some(&user.id),
            self.users
                .replace_refresh_token(&user.id, refresh_token, new_entry),
        )
        .await?;

        if !rotated {
            tracing::warn!(user_id = %user.id, "Refresh rejected: token already rotated");
            return Err(AuthError::InvalidRefreshToken);
        }

        tracing::info!(user_id = %user.id, "Session refreshed");

        Ok(SessionOutput {
            user: user.to_public(),
            tokens,
        })
    }
}
