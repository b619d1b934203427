//! Login Use Case
//!
//! Verifies credentials and opens a new session. Unknown email and wrong
//! password take the same path through Argon2 and fail identically.

use std::sync::Arc;

use platform::password::{ClearTextPassword, PasswordHasher};

use crate::application::config::AuthConfig;
use crate::application::deadline::store_call;
use crate::application::tokens::{SessionOutput, TokenIssuer};
use crate::domain::repository::UserStore;
use crate::domain::value_object::Email;
use crate::error::{AuthError, AuthResult, UnauthorizedReason};

/// Login input
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Login use case
pub struct LoginUseCase<U>
where
    U: UserStore,
{
    users: Arc<U>,
    hasher: Arc<PasswordHasher>,
    issuer: TokenIssuer,
    config: Arc<AuthConfig>,
}

impl<U> LoginUseCase<U>
where
    U: UserStore,
{
    pub fn new(
        users: Arc<U>,
        hasher: Arc<PasswordHasher>,
        issuer: TokenIssuer,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            users,
            hasher,
            issuer,
            config,
        }
    }

    pub async fn execute(&self, input: LoginInput) -> AuthResult<SessionOutput> {
        let password = ClearTextPassword::for_verification(input.password);

        let user = match Email::new(&input.email) {
            Ok(email) => {
                store_call(
                    self.config.store_timeout,
                    "login.find_by_email",
                    None,
                    self.users.find_by_email(&email),
                )
                .await?
            }
            Err(_) => None,
        };

        let Some(user) = user else {
            self.hasher.verify_dummy(&password);
            tracing::warn!(email = %input.email.trim(), "Login failed");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.verify(&password, &user.password_hash) {
            tracing::warn!(email = %user.email, "Login failed");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            tracing::warn!(user_id = %user.id, "Login rejected: user inactive");
            return Err(AuthError::Unauthorized(UnauthorizedReason::UserInactive));
        }

        let (tokens, entry) = self.issuer.issue(&user)?;
        store_call(
            self.config.store_timeout,
            "login.append_refresh_token",
            Some(&user.id),
            self.users.append_refresh_token(&user.id, entry),
        )
        .await?;

        tracing::info!(user_id = %user.id, "User logged in");

        Ok(SessionOutput {
            user: user.to_public(),
            tokens,
        })
    }
}
