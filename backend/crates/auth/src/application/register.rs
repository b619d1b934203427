//! Register Use Case
//!
//! Creates a new user and opens its first session.

use std::sync::Arc;

use platform::password::{ClearTextPassword, PasswordHasher};

use crate::application::config::AuthConfig;
use crate::application::deadline::store_call;
use crate::application::tokens::{SessionOutput, TokenIssuer};
use crate::domain::entity::user::{NewUser, User};
use crate::domain::repository::UserStore;
use crate::domain::value_object::Email;
use crate::error::{AuthError, AuthResult};

/// Maximum length of a first or last name
const NAME_MAX_LENGTH: usize = 100;

/// Register input
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Register use case
pub struct RegisterUseCase<U>
where
    U: UserStore,
{
    users: Arc<U>,
    hasher: Arc<PasswordHasher>,
    issuer: TokenIssuer,
    config: Arc<AuthConfig>,
}

impl<U> RegisterUseCase<U>
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

    pub async fn execute(&self, input: RegisterInput) -> AuthResult<SessionOutput> {
        let email = Email::new(&input.email)?;
        let first_name = validate_name("First name", &input.first_name)?;
        let last_name = validate_name("Last name", &input.last_name)?;
        let password = ClearTextPassword::new(input.password)?;

        // Cheap pre-check; `create` remains the authority under races.
        let existing = store_call(
            self.config.store_timeout,
            "register.find_by_email",
            None,
            self.users.find_by_email(&email),
        )
        .await?;
        if existing.is_some() {
            tracing::warn!(email = %email, "Registration rejected: email taken");
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.hasher.hash(&password)?;
        let user = User::new(NewUser {
            email,
            password_hash,
            first_name,
            last_name,
        });

        store_call(
            self.config.store_timeout,
            "register.create",
            Some(&user.id),
            self.users.create(&user),
        )
        .await
        .inspect_err(|e| {
            if matches!(e, AuthError::EmailTaken) {
                tracing::warn!(email = %user.email, "Registration rejected: email taken");
            }
        })?;

        let (tokens, entry) = self.issuer.issue(&user)?;
        store_call(
            self.config.store_timeout,
            "register.append_refresh_token",
            Some(&user.id),
            self.users.append_refresh_token(&user.id, entry),
        )
        .await?;

        tracing::info!(user_id = %user.id, "User registered");

        Ok(SessionOutput {
            user: user.to_public(),
            tokens,
        })
    }
}

/// Trimmed, non-empty, bounded
pub(crate) fn validate_name(field: &str, raw: &str) -> AuthResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AuthError::Validation(format!("{field} cannot be empty")));
    }
    if name.chars().count() > NAME_MAX_LENGTH {
        return Err(AuthError::Validation(format!(
            "{field} must be at most {NAME_MAX_LENGTH} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(AuthError::Validation(format!(
            "{field} contains invalid characters"
        )));
    }
    Ok(name.to_string())
}
