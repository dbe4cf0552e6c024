//! Rows of the fanout tables as the rest of the crate sees them.

use chrono::{DateTime, Utc};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Lifecycle of a user request. Only `active` requests are pushed, browsed or answered.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RequestStatus {
    Active,
    Closed,
    Cancelled,
    /// Any status introduced by the CRUD app that this service doesn't know about
    #[strum(default)]
    Other(String),
}

impl RequestStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RequestStatus::Active => "active",
            RequestStatus::Closed => "closed",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Other(s) => s,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RequestStatus::Active)
    }
}

impl From<String> for RequestStatus {
    fn from(raw: String) -> Self {
        match raw.parse() {
            Ok(status) => status,
            Err(_) => RequestStatus::Other(raw),
        }
    }
}

/// A user's ask, broadcast to matching guides.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: Uuid,
    /// Short human-readable code shown to guides (e.g. `R-7KQ2`)
    pub code: String,
    /// Owner of the request
    pub user_id: Uuid,
    pub body: String,
    pub categories: Vec<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// A local expert reachable through the bot.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Guide {
    pub id: Uuid,
    pub name: String,
    /// Telegram chat/user id; guides without one are never contacted
    pub telegram_id: Option<i64>,
    pub is_active: bool,
    /// Paid subscription end; `None` means no expiry
    pub subscription_until: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ResponseStatus {
    Sent,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SenderRole {
    Guide,
    User,
}

/// A guide's answer to a request; one per (request, guide).
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: Uuid,
    pub request_id: Uuid,
    pub guide_id: Uuid,
    /// Denormalized from the request
    pub user_id: Uuid,
    pub status: ResponseStatus,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of a response thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadMessage {
    pub id: i64,
    pub response_id: Uuid,
    pub sender_role: SenderRole,
    pub sender_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry: this guide has been pushed this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub request_id: Uuid,
    pub guide_id: Uuid,
}
