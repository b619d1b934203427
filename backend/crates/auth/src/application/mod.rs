//! Application Layer
//!
//! Use cases and application services.

pub mod blacklist;
pub mod config;
pub(crate) mod deadline;
pub mod guard;
pub mod login;
pub mod logout;
pub mod password_reset;
pub mod refresh;
pub mod register;
pub mod session_service;
pub mod throttle;
pub mod tokens;
pub mod user_admin;

// Re-exports
pub use blacklist::TokenBlacklist;
pub use config::{AccessTokenConfig, AuthConfig};
pub use guard::{AuthGuard, AuthenticatedUser, RouteAccess, RouteTable};
pub use login::{LoginInput, LoginUseCase};
pub use logout::LogoutUseCase;
pub use password_reset::PasswordResetUseCase;
pub use refresh::RefreshUseCase;
pub use register::{RegisterInput, RegisterUseCase};
pub use session_service::SessionService;
pub use throttle::LoginThrottle;
pub use tokens::{SessionOutput, TokenIssuer, TokenPair};
pub use user_admin::{Page, UserAdminService, UserUpdate};
