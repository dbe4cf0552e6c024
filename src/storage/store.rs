//! The relational store as seen by the fanout and the bot.
//!
//! `PgStore` is the production implementation; `testing::MemoryStore` mirrors the same
//! semantics in memory for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::error::AppResult;
use crate::storage::models::{Guide, Request, Response};

#[async_trait]
pub trait Store: Send + Sync {
    async fn request(&self, id: Uuid) -> AppResult<Option<Request>>;

    async fn request_by_code(&self, code: &str) -> AppResult<Option<Request>>;

    async fn guide_by_telegram_id(&self, telegram_id: i64) -> AppResult<Option<Guide>>;

    /// Guides that should be pushed `request` now: eligible, and with neither a
    /// response nor a ledger entry for it. Ordered by guide id.
    async fn guides_to_notify(&self, request: &Request, now: DateTime<Utc>) -> AppResult<Vec<Guide>>;

    /// Number of active requests `guide` may browse (eligible, not yet answered).
    async fn count_browsable(&self, guide: &Guide, now: DateTime<Utc>) -> AppResult<usize>;

    /// The browsable request at `position`, newest first.
    async fn browsable_at(&self, guide: &Guide, now: DateTime<Utc>, position: usize) -> AppResult<Option<Request>>;

    /// Insert-if-absent into the ledger. Returns `true` when this call created the entry.
    async fn record_notification(&self, request_id: Uuid, guide_id: Uuid) -> AppResult<bool>;

    /// Active requests created at or after `since` with no ledger entries, oldest first.
    async fn unnotified_requests_since(&self, since: DateTime<Utc>, limit: i64) -> AppResult<Vec<Uuid>>;

    /// Upsert a `sent` response with `text` and append it to the thread.
    ///
    /// Fails with `RequestNotFound` / `RequestInactive` when the request can't take replies.
    async fn record_reply(&self, request_id: Uuid, guide_id: Uuid, text: &str) -> AppResult<Response>;

    /// Upsert a `rejected` response; a non-empty `reason` is appended to the thread.
    async fn record_rejection(&self, request_id: Uuid, guide_id: Uuid, reason: Option<&str>) -> AppResult<Response>;
}
