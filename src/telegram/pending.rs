//! Pending-reply markers: "this guide is composing a reply to that request".
//!
//! Keyed by the Telegram user id. The default store is a process-local map; with
//! `REDIS_URL` set the markers live in Redis so several bot processes agree.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::core::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReply {
    pub request_id: Uuid,
    pub guide_id: Uuid,
    /// Prompt message carrying the Cancel button
    pub prompt_message_id: Option<i32>,
}

#[async_trait]
pub trait PendingReplies: Send + Sync {
    async fn get(&self, user_id: i64) -> AppResult<Option<PendingReply>>;

    /// Store the marker, replacing any previous one for this user.
    async fn set(&self, user_id: i64, reply: PendingReply) -> AppResult<()>;

    /// Remove and return the marker.
    async fn take(&self, user_id: i64) -> AppResult<Option<PendingReply>>;
}

/// Single-process store. Lost on restart; the guide just presses Reply again.
#[derive(Default)]
pub struct MemoryPendingReplies {
    entries: DashMap<i64, PendingReply>,
}

impl MemoryPendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PendingReplies for MemoryPendingReplies {
    async fn get(&self, user_id: i64) -> AppResult<Option<PendingReply>> {
        Ok(self.entries.get(&user_id).map(|entry| *entry.value()))
    }

    async fn set(&self, user_id: i64, reply: PendingReply) -> AppResult<()> {
        self.entries.insert(user_id, reply);
        Ok(())
    }

    async fn take(&self, user_id: i64) -> AppResult<Option<PendingReply>> {
        Ok(self.entries.remove(&user_id).map(|(_, reply)| reply))
    }
}

/// Shared store: one JSON value per user with a TTL so abandoned replies expire.
pub struct RedisPendingReplies {
    client: redis::Client,
    ttl: Duration,
}

impl RedisPendingReplies {
    pub fn new(client: redis::Client, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    fn key(user_id: i64) -> String {
        format!("guidebot:pending:{}", user_id)
    }
}

#[async_trait]
impl PendingReplies for RedisPendingReplies {
    async fn get(&self, user_id: i64) -> AppResult<Option<PendingReply>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = redis::cmd("GET").arg(Self::key(user_id)).query_async(&mut conn).await?;
        Ok(raw.map(|json| serde_json::from_str(&json)).transpose()?)
    }

    async fn set(&self, user_id: i64, reply: PendingReply) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let json = serde_json::to_string(&reply)?;
        let _: () = redis::cmd("SET")
            .arg(Self::key(user_id))
            .arg(json)
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn take(&self, user_id: i64) -> AppResult<Option<PendingReply>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = redis::cmd("GETDEL").arg(Self::key(user_id)).query_async(&mut conn).await?;
        Ok(raw.map(|json| serde_json::from_str(&json)).transpose()?)
    }
}
