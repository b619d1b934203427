//! Domain Layer
//!
//! Contains entities, value objects, and store traits.

pub mod entity;
pub mod repository;
pub mod value_object;

// Re-exports
pub use entity::{
    blacklisted_token::BlacklistedToken,
    refresh_token::RefreshTokenEntry,
    user::{NewUser, PublicUser, User, UserPatch},
};
pub use repository::{ResetTokenMailer, TokenBlacklistStore, UserStore};
