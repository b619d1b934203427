//! Value Object Module

pub mod email;
pub mod user_role;

pub use email::Email;
pub use kernel::id::UserId;
pub use user_role::UserRole;
