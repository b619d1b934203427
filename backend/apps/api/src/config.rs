//! Environment configuration
//!
//! Reads `AuthConfig` and server settings from the process environment.

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, bail};
use auth::AuthConfig;
use platform::rate_limit::RateLimitConfig;

/// Server-level settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub frontend_origins: Vec<String>,
}

/// Parse `<n>[smhd]`, e.g. `15m`, `30d`.
pub fn parse_duration(raw: &str) -> anyhow::Result<Duration> {
    let raw = raw.trim();
    let Some(unit) = raw.chars().last() else {
        bail!("empty duration");
    };
    let digits = &raw[..raw.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        bail!("invalid duration {raw:?}: expected <number>[s|m|h|d]");
    }
    let value: u64 = digits
        .parse()
        .with_context(|| format!("invalid duration {raw:?}"))?;

    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        _ => bail!("invalid duration unit in {raw:?}: expected s, m, h or d"),
    };
    let secs = value
        .checked_mul(multiplier)
        .with_context(|| format!("duration {raw:?} is too large"))?;
    Ok(Duration::from_secs(secs))
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn duration_var(name: &str) -> anyhow::Result<Option<Duration>> {
    var(name)
        .map(|v| parse_duration(&v).with_context(|| format!("{name} is invalid")))
        .transpose()
}

fn number_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(name)
        .map(|v| v.trim().parse::<T>().with_context(|| format!("{name} is invalid")))
        .transpose()
}

/// Build `AuthConfig` from the environment.
///
/// Without `JWT_ACCESS_SECRET` a random secret is generated in debug builds;
/// release builds refuse to start.
pub fn load_auth_config() -> anyhow::Result<AuthConfig> {
    let mut config = match var("JWT_ACCESS_SECRET") {
        Some(secret) => {
            if secret.len() < 32 {
                bail!("JWT_ACCESS_SECRET must be at least 32 bytes");
            }
            let mut config = AuthConfig::default();
            config.access_token.secret = secret.into_bytes();
            config
        }
        None if cfg!(debug_assertions) => {
            tracing::warn!("JWT_ACCESS_SECRET not set, using a random development secret");
            AuthConfig::default()
        }
        None => bail!("JWT_ACCESS_SECRET must be set in production"),
    };

    if let Some(issuer) = var("JWT_ISSUER") {
        config.access_token.issuer = issuer;
    }
    if let Some(ttl) = duration_var("JWT_ACCESS_EXPIRES_IN")? {
        config.access_token.ttl = ttl;
    }
    if let Some(ttl) = duration_var("REFRESH_TOKEN_EXPIRES_IN")? {
        config.refresh_token_ttl = ttl;
    }
    if let Some(ttl) = duration_var("PASSWORD_RESET_EXPIRES_IN")? {
        config.reset_token_ttl = ttl;
    }
    if let Some(memory_kib) = number_var("PASSWORD_HASH_MEMORY_KIB")? {
        config.password_hash.memory_kib = memory_kib;
    }
    if let Some(iterations) = number_var("PASSWORD_HASH_ITERATIONS")? {
        config.password_hash.iterations = iterations;
    }
    if let Some(secs) = number_var::<u64>("STORE_TIMEOUT_SECS")? {
        config.store_timeout = Duration::from_secs(secs);
    }

    let max_requests = number_var("LOGIN_RATE_LIMIT_MAX")?
        .unwrap_or(config.login_rate_limit.max_requests);
    let window_secs = number_var("LOGIN_RATE_LIMIT_WINDOW_SECS")?
        .unwrap_or(config.login_rate_limit.window.as_secs());
    config.login_rate_limit = RateLimitConfig::new(max_requests, window_secs);

    if let Some(raw) = var("TRUSTED_PROXIES") {
        config.trusted_proxies = parse_ip_list(&raw).context("TRUSTED_PROXIES is invalid")?;
    }

    Ok(config)
}

/// Comma-separated IP addresses; blank entries are skipped.
pub fn parse_ip_list(raw: &str) -> anyhow::Result<Vec<IpAddr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<IpAddr>()
                .with_context(|| format!("{entry:?} is not an IP address"))
        })
        .collect()
}

pub fn load_server_config() -> anyhow::Result<ServerConfig> {
    let bind_addr = var("BIND_ADDR")
        .unwrap_or_else(|| "0.0.0.0:3000".to_string())
        .parse()
        .context("BIND_ADDR is invalid")?;

    let frontend_origins = var("FRONTEND_ORIGINS")
        .unwrap_or_else(|| "http://localhost:3001,http://127.0.0.1:3001".to_string())
        .split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect();

    Ok(ServerConfig {
        bind_addr,
        database_url: var("DATABASE_URL"),
        frontend_origins,
    })
}
