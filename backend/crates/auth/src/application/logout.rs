//! Logout Use Case
//!
//! Revokes the caller's access token and drops one refresh entry, or all
//! of them.

use std::sync::Arc;

use crate::application::blacklist::TokenBlacklist;
use crate::application::config::AuthConfig;
use crate::application::deadline::store_call;
use crate::domain::repository::{TokenBlacklistStore, UserStore};
use crate::domain::value_object::UserId;
use crate::error::AuthResult;

pub struct LogoutUseCase<U, B>
where
    U: UserStore,
    B: TokenBlacklistStore,
{
    users: Arc<U>,
    blacklist: Arc<TokenBlacklist<B>>,
    config: Arc<AuthConfig>,
}

impl<U, B> LogoutUseCase<U, B>
where
    U: UserStore,
    B: TokenBlacklistStore,
{
    pub fn new(users: Arc<U>, blacklist: Arc<TokenBlacklist<B>>, config: Arc<AuthConfig>) -> Self {
        Self {
            users,
            blacklist,
            config,
        }
    }

    /// Blacklist first (idempotent), then remove the refresh entry. Both
    /// steps always run; the first failure is reported.
    pub async fn execute(
        &self,
        user_id: &UserId,
        access_token: &str,
        refresh_token: &str,
    ) -> AuthResult<()> {
        let blacklisted = self.blacklist.blacklist(access_token).await;

        let removed = store_call(
            self.config.store_timeout,
            "logout.remove_refresh_token",
            Some(user_id),
            self.users.remove_refresh_token(user_id, refresh_token),
        )
        .await;

        blacklisted.and(removed)?;

        tracing::info!(user_id = %user_id, "User logged out");
        Ok(())
    }

    /// Clears every refresh entry. Access tokens of other sessions stay
    /// valid until they expire.
    pub async fn execute_all(&self, user_id: &UserId) -> AuthResult<()> {
        store_call(
            self.config.store_timeout,
            "logout_all.clear_refresh_tokens",
            Some(user_id),
            self.users.clear_refresh_tokens(user_id),
        )
        .await?;

        tracing::info!(user_id = %user_id, "All sessions logged out");
        Ok(())
    }
}
