//! Login Throttle
//!
//! Fixed-window attempt counter per `"{client_ip}-{email}"`, checked before
//! any credential work.

use std::net::IpAddr;
use std::sync::Arc;

use platform::rate_limit::{RateLimitConfig, RateLimitStore};

use crate::error::{AuthError, AuthResult};

pub struct LoginThrottle<R>
where
    R: RateLimitStore,
{
    store: Arc<R>,
    config: RateLimitConfig,
}

impl<R> LoginThrottle<R>
where
    R: RateLimitStore,
{
    pub fn new(store: Arc<R>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn key(client_ip: Option<IpAddr>, email: &str) -> String {
        let ip = client_ip.map_or_else(|| "unknown".to_string(), |ip| ip.to_string());
        format!("{}-{}", ip, email.trim().to_lowercase())
    }

    pub async fn check(&self, client_ip: Option<IpAddr>, email: &str) -> AuthResult<()> {
        let key = Self::key(client_ip, email);
        let result = self
            .store
            .check_and_increment(&key, &self.config)
            .await
            .map_err(|e| AuthError::Internal(format!("rate limit store failed: {e}")))?;

        if !result.allowed {
            tracing::warn!(
                client_ip = ?client_ip,
                reset_at_ms = result.reset_at_ms,
                "Login throttled"
            );
            return Err(AuthError::TooManyRequests);
        }
        Ok(())
    }
}
