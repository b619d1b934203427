//! Rate Limiting Infrastructure
//!
//! Fixed-window counters keyed by an arbitrary string (e.g. `"{ip}-{email}"`).

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    pub fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Rate limit check result
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at_ms: i64,
}

/// Trait for rate limit storage backends
#[trait_variant::make(RateLimitStore: Send)]
pub trait LocalRateLimitStore {
    /// Count one request against `key` and report whether it is allowed.
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at_ms: i64,
}

#[derive(Debug, Default)]
struct WindowTable {
    windows: HashMap<String, Window>,
    next_sweep_ms: i64,
}

impl WindowTable {
    fn purge(&mut self, now_ms: i64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| w.reset_at_ms > now_ms);
        before - self.windows.len()
    }
}

/// Process-local fixed-window store.
///
/// Lapsed windows are swept at most once per window length while counting,
/// so keys that are never seen again do not accumulate.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    table: Mutex<WindowTable>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop windows that have already reset. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now_ms = Utc::now().timestamp_millis();
        self.table.lock().await.purge(now_ms)
    }

    /// Number of tracked keys
    pub async fn len(&self) -> usize {
        self.table.lock().await.windows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, Box<dyn std::error::Error + Send + Sync>> {
        let now_ms = Utc::now().timestamp_millis();
        let mut table = self.table.lock().await;

        if table.next_sweep_ms <= now_ms {
            table.purge(now_ms);
            table.next_sweep_ms = now_ms.saturating_add(config.window_ms());
        }

        let window = table.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at_ms: now_ms + config.window_ms(),
        });
        if window.reset_at_ms <= now_ms {
            *window = Window {
                count: 0,
                reset_at_ms: now_ms + config.window_ms(),
            };
        }

        window.count = window.count.saturating_add(1);
        let allowed = window.count <= config.max_requests;

        Ok(RateLimitResult {
            allowed,
            remaining: config.max_requests.saturating_sub(window.count),
            reset_at_ms: window.reset_at_ms,
        })
    }
}
