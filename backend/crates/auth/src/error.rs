//! Auth Error Types
//!
//! Auth-specific error variants that integrate with the unified
//! `kernel::error::AppError` system at the HTTP boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use derive_more::Display;
use kernel::error::{app_error::AppError, kind::ErrorKind};
use kernel::id::UserId;
use platform::password::{PasswordHashError, PasswordPolicyError};
use thiserror::Error;

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

/// Why a request was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UnauthorizedReason {
    #[display("missing bearer token")]
    MissingToken,
    #[display("token revoked")]
    TokenRevoked,
    #[display("invalid or expired token")]
    InvalidOrExpired,
    #[display("user no longer exists")]
    UserNotFound,
    #[display("user is inactive")]
    UserInactive,
}

/// Auth-specific error variants
#[derive(Debug, Error)]
pub enum AuthError {
    /// Email already registered
    #[error("Email already registered")]
    EmailTaken,

    /// Unknown email or wrong password. Deliberately indistinguishable.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Refresh token unknown or already rotated
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("Unauthorized: {0}")]
    Unauthorized(UnauthorizedReason),

    /// Authenticated, but the role is not allowed on this route
    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Invalid or expired reset token")]
    InvalidOrExpiredResetToken,

    #[error("User not found")]
    UserNotFound,

    /// Input rejected (email format, password policy, empty names)
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::EmailTaken => ErrorKind::Conflict,
            AuthError::InvalidCredentials
            | AuthError::InvalidRefreshToken
            | AuthError::RefreshTokenExpired
            | AuthError::Unauthorized(_) => ErrorKind::Unauthorized,
            AuthError::Forbidden => ErrorKind::Forbidden,
            AuthError::InvalidOrExpiredResetToken | AuthError::Validation(_) => {
                ErrorKind::BadRequest
            }
            AuthError::UserNotFound => ErrorKind::NotFound,
            AuthError::TooManyRequests => ErrorKind::TooManyRequests,
            AuthError::Database(_) | AuthError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Convert to AppError. Server-side details never reach the client.
    pub fn to_app_error(&self) -> AppError {
        match self {
            AuthError::Database(_) | AuthError::Internal(_) => {
                AppError::internal("Internal server error")
            }
            AuthError::Unauthorized(reason) => {
                let message = match reason {
                    UnauthorizedReason::MissingToken => "Missing bearer token",
                    UnauthorizedReason::TokenRevoked => "Token has been revoked",
                    UnauthorizedReason::InvalidOrExpired => "Invalid or expired token",
                    UnauthorizedReason::UserNotFound | UnauthorizedReason::UserInactive => {
                        "Unauthorized"
                    }
                };
                AppError::unauthorized(message)
            }
            _ => AppError::new(self.kind(), self.to_string()),
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Auth database error");
            }
            AuthError::Internal(msg) => {
                tracing::error!(message = %msg, "Auth internal error");
            }
            AuthError::TooManyRequests => {
                tracing::warn!("Rate limit exceeded");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

impl From<PasswordPolicyError> for AuthError {
    fn from(err: PasswordPolicyError) -> Self {
        AuthError::Validation(err.to_string())
    }
}

impl From<PasswordHashError> for AuthError {
    fn from(err: PasswordHashError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

/// Attach operation context to store failures.
pub trait OperationContext<T> {
    /// Log server-side failures with the operation name and user id.
    /// Domain errors pass through untouched and unlogged.
    fn op_context(self, operation: &'static str, user_id: Option<&UserId>) -> AuthResult<T>;
}

impl<T> OperationContext<T> for AuthResult<T> {
    fn op_context(self, operation: &'static str, user_id: Option<&UserId>) -> AuthResult<T> {
        self.inspect_err(|e| {
            if !e.kind().is_server_error() {
                return;
            }
            match user_id {
                Some(id) => {
                    tracing::error!(operation, user_id = %id, error = %e, "Store operation failed")
                }
                None => tracing::error!(operation, error = %e, "Store operation failed"),
            }
        })
    }
}
