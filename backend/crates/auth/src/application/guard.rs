//! Auth Guard
//!
//! Decides whether a request may proceed. Access requirements come from an
//! explicit route table rather than per-handler annotations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use platform::client::parse_bearer;
use platform::token::TokenSigner;

use crate::application::blacklist::TokenBlacklist;
use crate::application::deadline::store_call;
use crate::domain::repository::{TokenBlacklistStore, UserStore};
use crate::domain::value_object::{Email, UserId, UserRole};
use crate::error::{AuthError, AuthResult, UnauthorizedReason};

/// What a route requires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    Authenticated,
    /// Authenticated with one of these roles
    Roles(Vec<UserRole>),
}

impl RouteAccess {
    pub fn admin_only() -> Self {
        Self::Roles(vec![UserRole::Admin])
    }
}

/// Route -> access lookup keyed by method and matched path pattern.
/// Routes not listed require authentication.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<(String, String), RouteAccess>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, method: &str, path: &str, access: RouteAccess) -> Self {
        self.routes
            .insert((method.to_ascii_uppercase(), path.to_string()), access);
        self
    }

    pub fn public(self, method: &str, path: &str) -> Self {
        self.route(method, path, RouteAccess::Public)
    }

    pub fn access(&self, method: &str, path: &str) -> &RouteAccess {
        self.routes
            .get(&(method.to_ascii_uppercase(), path.to_string()))
            .unwrap_or(&RouteAccess::Authenticated)
    }
}

/// Identity attached to an admitted request, read from the current user
/// record rather than the token claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub email: Email,
    pub role: UserRole,
}

pub struct AuthGuard<U, B>
where
    U: UserStore,
    B: TokenBlacklistStore,
{
    users: Arc<U>,
    blacklist: Arc<TokenBlacklist<B>>,
    signer: Arc<TokenSigner>,
    timeout: Duration,
}

impl<U, B> AuthGuard<U, B>
where
    U: UserStore,
    B: TokenBlacklistStore,
{
    pub fn new(
        users: Arc<U>,
        blacklist: Arc<TokenBlacklist<B>>,
        signer: Arc<TokenSigner>,
        timeout: Duration,
    ) -> Self {
        Self {
            users,
            blacklist,
            signer,
            timeout,
        }
    }

    /// `Ok(None)` for public routes; otherwise the resolved identity.
    pub async fn authorize(
        &self,
        access: &RouteAccess,
        authorization: Option<&str>,
    ) -> AuthResult<Option<AuthenticatedUser>> {
        if *access == RouteAccess::Public {
            return Ok(None);
        }

        let token = authorization.and_then(parse_bearer).ok_or_else(|| {
            tracing::debug!("Request denied: missing bearer token");
            AuthError::Unauthorized(UnauthorizedReason::MissingToken)
        })?;

        let identity = self.authenticate(token).await?;

        if let RouteAccess::Roles(roles) = access
            && !roles.contains(&identity.role)
        {
            tracing::debug!(user_id = %identity.id, role = %identity.role, "Request denied: role");
            return Err(AuthError::Forbidden);
        }

        Ok(Some(identity))
    }

    /// Blacklist, then signature and expiry, then the user record.
    pub async fn authenticate(&self, token: &str) -> AuthResult<AuthenticatedUser> {
        if self.blacklist.is_blacklisted(token).await? {
            tracing::debug!("Request denied: token revoked");
            return Err(AuthError::Unauthorized(UnauthorizedReason::TokenRevoked));
        }

        let claims = self.signer.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "Request denied: token verification failed");
            AuthError::Unauthorized(UnauthorizedReason::InvalidOrExpired)
        })?;

        let user_id: UserId = claims
            .sub
            .parse()
            .map_err(|_| AuthError::Unauthorized(UnauthorizedReason::InvalidOrExpired))?;

        let user = store_call(
            self.timeout,
            "guard.find_by_id",
            Some(&user_id),
            self.users.find_by_id(&user_id),
        )
        .await?
        .ok_or_else(|| {
            tracing::debug!(user_id = %user_id, "Request denied: user not found");
            AuthError::Unauthorized(UnauthorizedReason::UserNotFound)
        })?;

        if !user.is_active {
            tracing::debug!(user_id = %user_id, "Request denied: user inactive");
            return Err(AuthError::Unauthorized(UnauthorizedReason::UserInactive));
        }

        Ok(AuthenticatedUser {
            id: user.id,
            email: user.email,
            role: user.role,
        })
    }
}
