//! Password Reset Use Case
//!
//! Request: mint a random token, store only its SHA-256, hand the
//! plaintext to the mailer. The work runs detached from the caller, so
//! known and unknown emails return alike.
//!
//! Confirm: look the digest up, store the new hash and clear the pending
//! reset in one conditional update.

use std::sync::Arc;

use chrono::Utc;
use platform::crypto::{random_token, sha256_hex};
use platform::password::{ClearTextPassword, PasswordHasher};
use tokio::task::JoinHandle;

use crate::application::config::AuthConfig;
use crate::application::deadline::store_call;
use crate::domain::repository::{ResetTokenMailer, UserStore};
use crate::domain::value_object::Email;
use crate::error::{AuthError, AuthResult};

pub struct PasswordResetUseCase<U, M>
where
    U: UserStore,
    M: ResetTokenMailer,
{
    users: Arc<U>,
    mailer: Arc<M>,
    hasher: Arc<PasswordHasher>,
    config: Arc<AuthConfig>,
}

impl<U, M> PasswordResetUseCase<U, M>
where
    U: UserStore,
    M: ResetTokenMailer,
{
    pub fn new(
        users: Arc<U>,
        mailer: Arc<M>,
        hasher: Arc<PasswordHasher>,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            users,
            mailer,
            hasher,
            config,
        }
    }

    pub async fn confirm(&self, token: &str, new_password: String) -> AuthResult<()> {
        let password = ClearTextPassword::new(new_password)?;
        let token_hash = sha256_hex(token.as_bytes());

        let user = store_call(
            self.config.store_timeout,
            "password_reset.find_by_reset_token_hash",
            None,
            self.users.find_by_reset_token_hash(&token_hash),
        )
        .await?
        .filter(|u| u.reset_token_matches(&token_hash, Utc::now()))
        .ok_or_else(|| {
            tracing::warn!("Password reset rejected: invalid or expired token");
            AuthError::InvalidOrExpiredResetToken
        })?;

        let new_hash = self.hasher.hash(&password)?;
        let completed = store_call(
            self.config.store_timeout,
            "password_reset.complete_password_reset",
            Some(&user.id),
            self.users
                .complete_password_reset(&user.id, &token_hash, &new_hash),
        )
        .await?;

        if !completed {
            tracing::warn!(user_id = %user.id, "Password reset rejected: token already used");
            return Err(AuthError::InvalidOrExpiredResetToken);
        }

        tracing::info!(user_id = %user.id, "Password reset completed");
        Ok(())
    }
}

impl<U, M> PasswordResetUseCase<U, M>
where
    U: UserStore + Send + Sync + 'static,
    M: ResetTokenMailer + Send + Sync + 'static,
{
    /// Start a reset for `email` and return at once.
    ///
    /// Lookup, token storage and delivery all happen on a spawned task; its
    /// failures are logged there. The handle is only for callers that want
    /// to wait for delivery.
    pub fn request(&self, email: &str) -> JoinHandle<()> {
        let users = self.users.clone();
        let mailer = self.mailer.clone();
        let config = self.config.clone();
        let email = email.to_string();

        tokio::spawn(async move {
            if let Err(e) = deliver_reset(&*users, &*mailer, &config, &email).await {
                tracing::error!(error = %e, "Password reset request failed");
            }
        })
    }
}

async fn deliver_reset<U, M>(
    users: &U,
    mailer: &M,
    config: &AuthConfig,
    email: &str,
) -> AuthResult<()>
where
    U: UserStore,
    M: ResetTokenMailer,
{
    let Ok(email) = Email::new(email) else {
        tracing::debug!("Password reset requested for malformed email");
        return Ok(());
    };

    let user = store_call(
        config.store_timeout,
        "password_reset_request.find_by_email",
        None,
        users.find_by_email(&email),
    )
    .await?;

    let Some(user) = user else {
        tracing::debug!("Password reset requested for unknown email");
        return Ok(());
    };

    let token = random_token(config.reset_token_bytes);
    let token_hash = sha256_hex(token.as_bytes());
    let ttl = chrono::Duration::from_std(config.reset_token_ttl)
        .map_err(|_| AuthError::Internal("reset token TTL out of range".into()))?;
    store_call(
        config.store_timeout,
        "password_reset_request.set_reset_token",
        Some(&user.id),
        users.set_reset_token(&user.id, &token_hash, Utc::now() + ttl),
    )
    .await?;

    if let Err(e) = mailer.send_reset_token(&user.email, &token).await {
        tracing::error!(user_id = %user.id, error = %e, "Failed to deliver reset token");
    }

    tracing::info!(user_id = %user.id, "Password reset requested");
    Ok(())
}
