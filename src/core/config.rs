use once_cell::sync::Lazy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::core::error::{AppError, AppResult};

/// Configuration read from the environment
///
/// Values are read once, on first access. `.env` is loaded by `main` before anything
/// here is touched.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Postgres connection string
/// Read from DATABASE_URL environment variable (required for `run`)
pub static DATABASE_URL: Lazy<Option<String>> = Lazy::new(|| env::var("DATABASE_URL").ok());

/// A setting that must be present and non-blank.
pub fn required<'a>(name: &str, value: Option<&'a str>) -> AppResult<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Config(format!("{} environment variable not set", name)))
}

pub fn database_url() -> AppResult<&'static str> {
    required("DATABASE_URL", DATABASE_URL.as_deref())
}

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Custom Bot API server (local telegram-bot-api)
pub static BOT_API_URL: Lazy<Option<String>> = Lazy::new(|| env::var("BOT_API_URL").ok());

/// Optional log file; console output is always on
pub static LOG_FILE_PATH: Lazy<Option<String>> = Lazy::new(|| env::var("LOG_FILE_PATH").ok());

/// Shared Redis for pending replies and click dedup. Unset = process-local maps.
pub static REDIS_URL: Lazy<Option<String>> =
    Lazy::new(|| env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty()));

/// Database pool configuration
pub mod database {
    use super::*;

    /// Maximum number of pooled connections (the listener holds one more of its own)
    pub static MAX_CONNECTIONS: Lazy<u32> = Lazy::new(|| env_or("DB_MAX_CONNECTIONS", 10));

    /// Apply bundled migrations on startup
    pub static RUN_MIGRATIONS: Lazy<bool> = Lazy::new(|| env_flag("RUN_MIGRATIONS", true));

    /// Timeout for acquiring a pooled connection (in seconds)
    pub const ACQUIRE_TIMEOUT_SECS: u64 = 10;

    pub fn acquire_timeout() -> Duration {
        Duration::from_secs(ACQUIRE_TIMEOUT_SECS)
    }
}

/// Fanout (batched delivery) configuration
pub mod fanout {
    use super::*;

    /// Guides per concurrently-delivered chunk
    pub static CHUNK_SIZE: Lazy<usize> = Lazy::new(|| env_or("FANOUT_CHUNK_SIZE", 20).max(1));

    /// Pause between chunks (in milliseconds)
    pub static CHUNK_PAUSE_MS: Lazy<u64> = Lazy::new(|| env_or("FANOUT_CHUNK_PAUSE_MS", 1000));

    pub fn chunk_pause() -> Duration {
        Duration::from_millis(*CHUNK_PAUSE_MS)
    }
}

/// Change-capture listener configuration
pub mod listener {
    use super::*;

    /// Postgres NOTIFY channel carrying new request ids
    pub static CHANNEL: Lazy<String> =
        Lazy::new(|| env::var("NOTIFY_CHANNEL").unwrap_or_else(|_| "new_request".to_string()));

    /// Attempts for the initial LISTEN connection before giving up on the fast path
    pub const CONNECT_MAX_ATTEMPTS: usize = 8;

    /// Pause after a failed `recv` before listening again (in seconds)
    pub const RECV_ERROR_DELAY_SECS: u64 = 2;

    pub fn recv_error_delay() -> Duration {
        Duration::from_secs(RECV_ERROR_DELAY_SECS)
    }
}

/// Backup poller configuration
pub mod poller {
    use super::*;

    /// Interval between scans (in seconds)
    pub static INTERVAL_SECS: Lazy<u64> = Lazy::new(|| env_or("POLL_INTERVAL_SECS", 10).max(1));

    /// Maximum requests picked up by one scan
    pub static BATCH_LIMIT: Lazy<i64> = Lazy::new(|| env_or("POLL_BATCH_LIMIT", 500).max(1));

    /// Look-back window for the very first scan after startup (in seconds)
    pub static LOOKBACK_SECS: Lazy<i64> = Lazy::new(|| env_or("POLL_LOOKBACK_SECS", 600).max(0));

    pub fn interval() -> Duration {
        Duration::from_secs(*INTERVAL_SECS)
    }
}

/// Bot interaction configuration
pub mod interaction {
    use super::*;

    /// Window in which an identical button click is treated as a replay (in milliseconds)
    pub static CLICK_DEDUP_WINDOW_MS: Lazy<u64> = Lazy::new(|| env_or("CLICK_DEDUP_WINDOW_MS", 3000));

    /// Upper bound on remembered clicks
    pub static CLICK_DEDUP_CAPACITY: Lazy<u64> = Lazy::new(|| env_or("CLICK_DEDUP_CAPACITY", 10_000));

    /// How long a pending reply survives in Redis (in seconds)
    pub static PENDING_REPLY_TTL_SECS: Lazy<u64> = Lazy::new(|| env_or("PENDING_REPLY_TTL_SECS", 86_400));

    pub fn click_dedup_window() -> Duration {
        Duration::from_millis(*CLICK_DEDUP_WINDOW_MS)
    }

    pub fn pending_reply_ttl() -> Duration {
        Duration::from_secs(*PENDING_REPLY_TTL_SECS)
    }
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for Bot API calls (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Metrics HTTP server configuration
pub mod metrics {
    use super::*;

    /// Serve /metrics and /health
    pub static ENABLED: Lazy<bool> = Lazy::new(|| env_flag("METRICS_ENABLED", false));

    pub static PORT: Lazy<u16> = Lazy::new(|| env_or("METRICS_PORT", 9090));
}
