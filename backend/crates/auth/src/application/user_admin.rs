//! User Administration
//!
//! Profile reads and admin mutations. Every result is a [`PublicUser`].

use std::sync::Arc;

use platform::password::{ClearTextPassword, PasswordHasher};
use serde::Serialize;

use crate::application::config::AuthConfig;
use crate::application::deadline::store_call;
use crate::application::register::validate_name;
use crate::domain::entity::user::{PublicUser, UserPatch};
use crate::domain::repository::UserStore;
use crate::domain::value_object::{UserId, UserRole};
use crate::error::{AuthError, AuthResult};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

/// One page of results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

/// Admin update. `None` leaves a field unchanged.
#[derive(Default)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    /// Plaintext; re-hashed before it reaches the store
    pub password: Option<String>,
}

pub struct UserAdminService<U>
where
    U: UserStore,
{
    users: Arc<U>,
    hasher: Arc<PasswordHasher>,
    config: Arc<AuthConfig>,
}

impl<U> UserAdminService<U>
where
    U: UserStore,
{
    pub fn new(users: Arc<U>, hasher: Arc<PasswordHasher>, config: Arc<AuthConfig>) -> Self {
        Self {
            users,
            hasher,
            config,
        }
    }

    /// `page` and `limit` default to 1 and 10; `limit` is capped at 100.
    pub async fn list(
        &self,
        page: Option<u64>,
        limit: Option<u64>,
    ) -> AuthResult<Page<PublicUser>> {
        let page = page.unwrap_or(DEFAULT_PAGE).max(1);
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = (page - 1).saturating_mul(limit);

        let (users, total) = store_call(
            self.config.store_timeout,
            "users.list",
            None,
            self.users.list(offset, limit),
        )
        .await?;

        Ok(Page {
            items: users.iter().map(|u| u.to_public()).collect(),
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    pub async fn get(&self, id: &UserId) -> AuthResult<PublicUser> {
        store_call(
            self.config.store_timeout,
            "users.get",
            Some(id),
            self.users.find_by_id(id),
        )
        .await?
        .map(|u| u.to_public())
        .ok_or(AuthError::UserNotFound)
    }

    /// Profile of the authenticated caller
    pub async fn me(&self, id: &UserId) -> AuthResult<PublicUser> {
        self.get(id).await
    }

    pub async fn update(&self, id: &UserId, update: UserUpdate) -> AuthResult<PublicUser> {
        let password_hash = match update.password {
            Some(raw) => Some(self.hasher.hash(&ClearTextPassword::new(raw)?)?),
            None => None,
        };
        let patch = UserPatch {
            first_name: update
                .first_name
                .map(|n| validate_name("First name", &n))
                .transpose()?,
            last_name: update
                .last_name
                .map(|n| validate_name("Last name", &n))
                .transpose()?,
            role: update.role,
            is_active: update.is_active,
            password_hash,
        };

        let user = store_call(
            self.config.store_timeout,
            "users.update",
            Some(id),
            self.users.update_fields(id, patch),
        )
        .await?
        .ok_or(AuthError::UserNotFound)?;

        tracing::info!(user_id = %id, "User updated");
        Ok(user.to_public())
    }

    pub async fn remove(&self, id: &UserId) -> AuthResult<PublicUser> {
        let user = store_call(
            self.config.store_timeout,
            "users.remove",
            Some(id),
            self.users.delete(id),
        )
        .await?
        .ok_or(AuthError::UserNotFound)?;

        tracing::info!(user_id = %id, "User removed");
        Ok(user.to_public())
    }
}
