//! Application Configuration
//!
//! Configuration for the Auth application layer. Values only; the binary
//! decides where they come from.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use platform::password::PasswordHashConfig;
use platform::rate_limit::RateLimitConfig;
use platform::token::TokenSigner;

/// Signing settings for access tokens
#[derive(Clone)]
pub struct AccessTokenConfig {
    /// HMAC secret (at least 32 bytes in production)
    pub secret: Vec<u8>,
    pub issuer: String,
    pub ttl: Duration,
}

impl fmt::Debug for AccessTokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenConfig")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Auth application configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_token: AccessTokenConfig,
    /// Lifetime of a stored refresh entry (30 days)
    pub refresh_token_ttl: Duration,
    /// Random bytes per refresh token (encoded as base64url)
    pub refresh_token_bytes: usize,
    /// Argon2id cost
    pub password_hash: PasswordHashConfig,
    /// Lifetime of a password-reset token (1 hour)
    pub reset_token_ttl: Duration,
    pub reset_token_bytes: usize,
    /// Upper bound on any single store call
    pub store_timeout: Duration,
    /// Login attempts per `ip-email` key
    pub login_rate_limit: RateLimitConfig,
    /// Peers whose `X-Forwarded-For` is believed when keying the login throttle
    pub trusted_proxies: Vec<IpAddr>,
}

/// The signing secret is random per process; deployments set their own.
impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token: AccessTokenConfig {
                secret: platform::crypto::random_bytes(32),
                issuer: "auth-api".to_string(),
                ttl: Duration::from_secs(15 * 60), // 15 minutes
            },
            refresh_token_ttl: Duration::from_secs(30 * 24 * 3600), // 30 days
            refresh_token_bytes: 32,
            password_hash: PasswordHashConfig::default(),
            reset_token_ttl: Duration::from_secs(3600), // 1 hour
            reset_token_bytes: 32,
            store_timeout: Duration::from_secs(5),
            login_rate_limit: RateLimitConfig::new(5, 60),
            trusted_proxies: Vec::new(),
        }
    }
}

impl AuthConfig {
    /// Cheap Argon2 cost, for local runs and tests
    pub fn development() -> Self {
        Self {
            password_hash: PasswordHashConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            ..Self::default()
        }
    }

    pub fn access_token_signer(&self) -> TokenSigner {
        TokenSigner::new(&self.access_token.secret, self.access_token.issuer.clone())
    }
}
