//! Auth (Authentication) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, store traits
//! - `application/` - Session use cases, token blacklist, auth guard
//! - `infra/` - In-memory and PostgreSQL stores
//! - `presentation/` - HTTP handlers, DTOs, guard middleware, router
//!
//! ## Features
//! - Register / login with email + password
//! - Short-lived HS256 access tokens, opaque single-use refresh tokens
//! - Logout (access-token blacklist) and logout of all sessions
//! - Password reset via a hashed, one-hour, single-use token
//! - Route table with public, authenticated and role-restricted routes
//!
//! ## Security Model
//! - Passwords hashed with Argon2id; unknown emails burn a dummy verify
//! - Refresh rotation is a conditional replace in the store, so a token
//!   can be redeemed at most once even under concurrent requests
//! - Reset tokens are stored as SHA-256 digests only
//! - Password-reset requests never reveal whether an email is registered

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

mod tests;

// Re-exports for convenience
pub use application::config::AuthConfig;
pub use application::session_service::SessionService;
pub use error::{AuthError, AuthResult, UnauthorizedReason};
pub use infra::memory::{MemoryOutbox, MemoryTokenBlacklistStore, MemoryUserStore};
pub use infra::postgres::{PgTokenBlacklistStore, PgUserStore};
pub use presentation::router::{auth_route_table, auth_router};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

// Convenience re-exports
pub mod config {
    pub use crate::application::config::*;
}

pub mod models {
    pub use crate::domain::entity::*;
    pub use crate::domain::value_object::*;
    pub use crate::presentation::dto::*;
}

pub mod handlers {
    pub use crate::presentation::handlers::*;
}

pub mod store {
    pub use crate::domain::repository::{ResetTokenMailer, TokenBlacklistStore, UserStore};
    pub use crate::infra::*;
}

pub mod router {
    pub use crate::presentation::router::*;
}

pub mod middleware {
    pub use crate::presentation::middleware::*;
}
