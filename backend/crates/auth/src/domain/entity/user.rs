//! User Entity
//!
//! Identity record with its refresh-token entries and pending password
//! reset. Never serialized directly: callers only ever see [`PublicUser`].

use chrono::{DateTime, Utc};
use platform::password::HashedPassword;
use serde::Serialize;

use crate::domain::entity::refresh_token::RefreshTokenEntry;
use crate::domain::value_object::{Email, UserId, UserRole};

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    /// Unique, case-normalized
    pub email: Email,
    pub password_hash: HashedPassword,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub is_active: bool,
    /// Insertion order is preserved; rotation replaces an entry in place.
    pub refresh_tokens: Vec<RefreshTokenEntry>,
    /// SHA-256 hex of the outstanding reset token
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a user
#[derive(Debug)]
pub struct NewUser {
    pub email: Email,
    pub password_hash: HashedPassword,
    pub first_name: String,
    pub last_name: String,
}

impl User {
    /// New active user with the default role and no sessions.
    pub fn new(fields: NewUser) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            email: fields.email,
            password_hash: fields.password_hash,
            first_name: fields.first_name,
            last_name: fields.last_name,
            role: UserRole::default(),
            is_active: true,
            refresh_tokens: Vec::new(),
            password_reset_token: None,
            password_reset_expires: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role,
            is_active: self.is_active,
        }
    }

    pub fn refresh_entry(&self, token: &str) -> Option<&RefreshTokenEntry> {
        self.refresh_tokens.iter().find(|e| e.token == token)
    }

    /// Reset pending for exactly this hash and not yet expired.
    pub fn reset_token_matches(&self, token_hash: &str, now: DateTime<Utc>) -> bool {
        match (&self.password_reset_token, self.password_reset_expires) {
            (Some(stored), Some(expires)) => {
                platform::crypto::constant_time_eq(stored.as_bytes(), token_hash.as_bytes())
                    && expires > now
            }
            _ => false,
        }
    }
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Default)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    pub password_hash: Option<HashedPassword>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.role.is_none()
            && self.is_active.is_none()
            && self.password_hash.is_none()
    }

    pub fn apply_to(self, user: &mut User) {
        if let Some(first_name) = self.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            user.last_name = last_name;
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
        if let Some(password_hash) = self.password_hash {
            user.password_hash = password_hash;
        }
        user.updated_at = Utc::now();
    }
}

/// What callers are allowed to see of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: UserId,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub is_active: bool,
}
