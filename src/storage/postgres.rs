//! Postgres-backed `Store`.
//!
//! Queries are plain runtime-checked `sqlx::query_as` so the crate builds without a
//! live database. Uniqueness on the ledger and on responses is enforced by the schema;
//! every write here is an idempotent insert or an upsert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

use crate::core::error::{AppError, AppResult};
use crate::fanout::eligibility::guide_is_available;
use crate::storage::models::{Guide, Request, RequestStatus, Response, ResponseStatus, SenderRole};
use crate::storage::store::Store;

const REQUEST_COLUMNS: &str = "r.id, r.code, r.user_id, r.body, r.categories, r.status, r.created_at";

const RESPONSE_RETURNING: &str = "id, request_id, guide_id, user_id, status, text, created_at, updated_at";

#[derive(FromRow)]
struct RequestRow {
    id: Uuid,
    code: String,
    user_id: Uuid,
    body: String,
    categories: Vec<String>,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<RequestRow> for Request {
    fn from(row: RequestRow) -> Self {
        Request {
            id: row.id,
            code: row.code,
            user_id: row.user_id,
            body: row.body,
            categories: row.categories,
            status: RequestStatus::from(row.status),
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct ResponseRow {
    id: Uuid,
    request_id: Uuid,
    guide_id: Uuid,
    user_id: Uuid,
    status: String,
    text: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ResponseRow> for Response {
    type Error = AppError;

    fn try_from(row: ResponseRow) -> AppResult<Self> {
        let status = row
            .status
            .parse::<ResponseStatus>()
            .map_err(|_| AppError::Validation(format!("unknown response status '{}'", row.status)))?;
        Ok(Response {
            id: row.id,
            request_id: row.request_id,
            guide_id: row.guide_id,
            user_id: row.user_id,
            status,
            text: row.text,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Validate the request, upsert the response and append the thread message in one
    /// transaction. The request row is share-locked so a concurrent close can't slip in
    /// between the status check and the write.
    async fn upsert_response(
        &self,
        request_id: Uuid,
        guide_id: Uuid,
        status: ResponseStatus,
        text: Option<&str>,
    ) -> AppResult<Response> {
        let mut tx = self.pool.begin().await?;

        let request: Option<(String, Uuid)> =
            sqlx::query_as("SELECT status, user_id FROM requests WHERE id = $1 FOR SHARE")
                .bind(request_id)
                .fetch_optional(&mut *tx)
                .await?;

        let (raw_status, user_id) = request.ok_or(AppError::RequestNotFound(request_id))?;
        if !RequestStatus::from(raw_status).is_active() {
            return Err(AppError::RequestInactive(request_id));
        }

        let row: ResponseRow = sqlx::query_as(&format!(
            "INSERT INTO request_responses (request_id, guide_id, user_id, status, text) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (request_id, guide_id) DO UPDATE \
             SET status = EXCLUDED.status, text = EXCLUDED.text, updated_at = now() \
             RETURNING {}",
            RESPONSE_RETURNING
        ))
        .bind(request_id)
        .bind(guide_id)
        .bind(user_id)
        .bind(status.as_ref())
        .bind(text)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(text) = text {
            sqlx::query(
                "INSERT INTO request_messages (response_id, sender_role, sender_id, text) VALUES ($1, $2, $3, $4)",
            )
            .bind(row.id)
            .bind(SenderRole::Guide.as_ref())
            .bind(guide_id)
            .bind(text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Response::try_from(row)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn request(&self, id: Uuid) -> AppResult<Option<Request>> {
        let row: Option<RequestRow> = sqlx::query_as(&format!("SELECT {} FROM requests r WHERE r.id = $1", REQUEST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Request::from))
    }

    async fn request_by_code(&self, code: &str) -> AppResult<Option<Request>> {
        let row: Option<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM requests r WHERE upper(r.code) = upper($1)",
            REQUEST_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Request::from))
    }

    async fn guide_by_telegram_id(&self, telegram_id: i64) -> AppResult<Option<Guide>> {
        let guide = sqlx::query_as::<_, Guide>(
            "SELECT id, name, telegram_id, is_active, subscription_until, categories FROM guides WHERE telegram_id = $1",
        )
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(guide)
    }

    async fn guides_to_notify(&self, request: &Request, now: DateTime<Utc>) -> AppResult<Vec<Guide>> {
        let guides = sqlx::query_as::<_, Guide>(
            "SELECT g.id, g.name, g.telegram_id, g.is_active, g.subscription_until, g.categories \
             FROM guides g \
             WHERE g.telegram_id IS NOT NULL \
               AND g.is_active \
               AND (g.subscription_until IS NULL OR g.subscription_until >= $2) \
               AND g.categories && $1 \
               AND NOT EXISTS (SELECT 1 FROM request_responses rr WHERE rr.request_id = $3 AND rr.guide_id = g.id) \
               AND NOT EXISTS (SELECT 1 FROM request_notifications rn WHERE rn.request_id = $3 AND rn.guide_id = g.id) \
             ORDER BY g.id",
        )
        .bind(&request.categories)
        .bind(now)
        .bind(request.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(guides)
    }

    async fn count_browsable(&self, guide: &Guide, now: DateTime<Utc>) -> AppResult<usize> {
        if !guide_is_available(guide, now) {
            return Ok(0);
        }
        let (count,): (i64,) = sqlx::query_as(
            "SELECT count(*) FROM requests r \
             WHERE r.status = 'active' \
               AND r.categories && $1 \
               AND NOT EXISTS (SELECT 1 FROM request_responses rr WHERE rr.request_id = r.id AND rr.guide_id = $2)",
        )
        .bind(&guide.categories)
        .bind(guide.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn browsable_at(&self, guide: &Guide, now: DateTime<Utc>, position: usize) -> AppResult<Option<Request>> {
        if !guide_is_available(guide, now) {
            return Ok(None);
        }
        let offset = i64::try_from(position).map_err(|_| AppError::Validation("position out of range".to_string()))?;
        let row: Option<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM requests r \
             WHERE r.status = 'active' \
               AND r.categories && $1 \
               AND NOT EXISTS (SELECT 1 FROM request_responses rr WHERE rr.request_id = r.id AND rr.guide_id = $2) \
             ORDER BY r.created_at DESC, r.id \
             LIMIT 1 OFFSET $3",
            REQUEST_COLUMNS
        ))
        .bind(&guide.categories)
        .bind(guide.id)
        .bind(offset)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Request::from))
    }

    async fn record_notification(&self, request_id: Uuid, guide_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO request_notifications (request_id, guide_id) VALUES ($1, $2) \
             ON CONFLICT (request_id, guide_id) DO NOTHING",
        )
        .bind(request_id)
        .bind(guide_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn unnotified_requests_since(&self, since: DateTime<Utc>, limit: i64) -> AppResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT r.id FROM requests r \
             WHERE r.status = 'active' \
               AND r.created_at >= $1 \
               AND NOT EXISTS (SELECT 1 FROM request_notifications rn WHERE rn.request_id = r.id) \
             ORDER BY r.created_at ASC \
             LIMIT $2",
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn record_reply(&self, request_id: Uuid, guide_id: Uuid, text: &str) -> AppResult<Response> {
        self.upsert_response(request_id, guide_id, ResponseStatus::Sent, Some(text))
            .await
    }

    async fn record_rejection(&self, request_id: Uuid, guide_id: Uuid, reason: Option<&str>) -> AppResult<Response> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        self.upsert_response(request_id, guide_id, ResponseStatus::Rejected, reason)
            .await
    }
}
