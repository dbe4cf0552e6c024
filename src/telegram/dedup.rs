//! Replay protection for inline-button clicks.
//!
//! Telegram clients resend a callback when the user double-taps or the network
//! hiccups. A click is identified by (message, user, payload); the first one within
//! the window wins, later identical ones are acknowledged and dropped.

use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

use crate::core::config;
use crate::core::error::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClickKey {
    /// Absent when the message is too old for Telegram to include it
    pub message_id: Option<i32>,
    pub user_id: i64,
    pub payload: String,
}

impl ClickKey {
    pub fn new(message_id: Option<i32>, user_id: i64, payload: impl Into<String>) -> Self {
        Self {
            message_id,
            user_id,
            payload: payload.into(),
        }
    }

    fn redis_key(&self) -> String {
        let message = self.message_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
        format!("guidebot:click:{}:{}:{}", message, self.user_id, self.payload)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DedupSettings {
    pub window: Duration,
    pub capacity: u64,
}

impl DedupSettings {
    pub fn from_env() -> Self {
        Self {
            window: config::interaction::click_dedup_window(),
            capacity: *config::interaction::CLICK_DEDUP_CAPACITY,
        }
    }
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(3),
            capacity: 10_000,
        }
    }
}

#[async_trait]
pub trait ClickDedup: Send + Sync {
    /// `true` for the first sighting of `key` within the window.
    async fn first_seen(&self, key: &ClickKey) -> AppResult<bool>;
}

/// Bounded in-process cache; entries expire after the window.
pub struct MemoryClickDedup {
    seen: Cache<ClickKey, ()>,
}

impl MemoryClickDedup {
    pub fn new(settings: DedupSettings) -> Self {
        let seen = Cache::builder()
            .max_capacity(settings.capacity)
            .time_to_live(settings.window)
            .build();
        Self { seen }
    }
}

#[async_trait]
impl ClickDedup for MemoryClickDedup {
    async fn first_seen(&self, key: &ClickKey) -> AppResult<bool> {
        let entry = self.seen.entry(key.clone()).or_insert(()).await;
        Ok(entry.is_fresh())
    }
}

/// `SET NX PX` in Redis, shared by every bot process.
pub struct RedisClickDedup {
    client: redis::Client,
    window: Duration,
}

impl RedisClickDedup {
    pub fn new(client: redis::Client, window: Duration) -> Self {
        Self { client, window }
    }
}

#[async_trait]
impl ClickDedup for RedisClickDedup {
    async fn first_seen(&self, key: &ClickKey) -> AppResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let window_ms = u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX).max(1);
        let set: Option<String> = redis::cmd("SET")
            .arg(key.redis_key())
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(window_ms)
            .query_async(&mut conn)
            .await?;
        Ok(set.is_some())
    }
}
