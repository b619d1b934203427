//! Store Traits
//!
//! Interfaces for persistence and delivery. Implementations live in the
//! infrastructure layer.

use chrono::{DateTime, Utc};
use platform::password::HashedPassword;

use crate::domain::entity::{
    blacklisted_token::BlacklistedToken,
    refresh_token::RefreshTokenEntry,
    user::{User, UserPatch},
};
use crate::domain::value_object::{Email, UserId};
use crate::error::AuthResult;

/// User record store.
///
/// Every mutating operation is atomic with respect to a single user.
#[trait_variant::make(UserStore: Send)]
pub trait LocalUserStore {
    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>>;

    async fn find_by_id(&self, id: &UserId) -> AuthResult<Option<User>>;

    /// Owner of the refresh entry whose token equals `token`, expired or not.
    async fn find_by_refresh_token(&self, token: &str) -> AuthResult<Option<User>>;

    /// Fails with `EmailTaken` if the email is already registered.
    async fn create(&self, user: &User) -> AuthResult<()>;

    async fn update_fields(&self, id: &UserId, patch: UserPatch) -> AuthResult<Option<User>>;

    async fn append_refresh_token(&self, id: &UserId, entry: RefreshTokenEntry) -> AuthResult<()>;

    /// Replace the entry matching `old_token` with `new_entry`, in the same
    /// position. Returns `false` if `old_token` is no longer present; the
    /// condition and the write happen as one step.
    async fn replace_refresh_token(
        &self,
        id: &UserId,
        old_token: &str,
        new_entry: RefreshTokenEntry,
    ) -> AuthResult<bool>;

    /// No-op if the token is not present.
    async fn remove_refresh_token(&self, id: &UserId, token: &str) -> AuthResult<()>;

    async fn clear_refresh_tokens(&self, id: &UserId) -> AuthResult<()>;

    /// Replaces any pending reset.
    async fn set_reset_token(
        &self,
        id: &UserId,
        token_hash: &str,
        expires: DateTime<Utc>,
    ) -> AuthResult<()>;

    /// Only returns users whose reset has not expired.
    async fn find_by_reset_token_hash(&self, token_hash: &str) -> AuthResult<Option<User>>;

    /// Store `new_hash` and clear both reset fields, only while the pending
    /// reset still equals `token_hash` and is unexpired. Returns whether the
    /// update happened.
    async fn complete_password_reset(
        &self,
        id: &UserId,
        token_hash: &str,
        new_hash: &HashedPassword,
    ) -> AuthResult<bool>;

    async fn delete(&self, id: &UserId) -> AuthResult<Option<User>>;

    /// Page of users ordered by creation time, plus the total count.
    async fn list(&self, offset: u64, limit: u64) -> AuthResult<(Vec<User>, u64)>;
}

/// TTL-capable store of revoked access tokens
#[trait_variant::make(TokenBlacklistStore: Send)]
pub trait LocalTokenBlacklistStore {
    /// Idempotent; re-inserting overwrites the expiry.
    async fn insert(&self, entry: &BlacklistedToken) -> AuthResult<()>;

    /// Expired entries never count.
    async fn exists(&self, token: &str) -> AuthResult<bool>;
}

/// Out-of-band delivery of plaintext reset tokens (email, SMS, ...)
#[trait_variant::make(ResetTokenMailer: Send)]
pub trait LocalResetTokenMailer {
    async fn send_reset_token(&self, email: &Email, token: &str) -> AuthResult<()>;
}
