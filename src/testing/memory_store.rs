//! `Store` over plain collections, with the same uniqueness rules as the schema

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::core::error::{AppError, AppResult};
use crate::fanout::eligibility::{categories_overlap, guide_is_available, is_eligible, EligibilityFilter};
use crate::storage::models::{
    Guide, NotificationKey, Request, RequestStatus, Response, ResponseStatus, SenderRole, ThreadMessage,
};
use crate::storage::store::Store;

#[derive(Default)]
struct State {
    requests: Vec<Request>,
    guides: Vec<Guide>,
    notifications: HashSet<NotificationKey>,
    responses: Vec<Response>,
    messages: Vec<ThreadMessage>,
    /// Guides whose ledger writes fail
    broken_ledger: HashSet<Uuid>,
}

impl State {
    fn responded(&self, request_id: Uuid, guide_id: Uuid) -> bool {
        self.responses
            .iter()
            .any(|r| r.request_id == request_id && r.guide_id == guide_id)
    }

    fn notified(&self, request_id: Uuid, guide_id: Uuid) -> bool {
        self.notifications.contains(&NotificationKey { request_id, guide_id })
    }

    fn browsable(&self, guide: &Guide, now: DateTime<Utc>) -> Vec<Request> {
        if !guide_is_available(guide, now) {
            return Vec::new();
        }
        let mut requests: Vec<Request> = self
            .requests
            .iter()
            .filter(|r| r.status.is_active())
            .filter(|r| categories_overlap(&guide.categories, &r.categories))
            .filter(|r| EligibilityFilter::Browse.admits(self.responded(r.id, guide.id), false))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        requests
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_request(&self, request: Request) {
        self.lock().requests.push(request);
    }

    pub fn add_guide(&self, guide: Guide) {
        self.lock().guides.push(guide);
    }

    pub fn set_request_status(&self, request_id: Uuid, status: RequestStatus) {
        if let Some(request) = self.lock().requests.iter_mut().find(|r| r.id == request_id) {
            request.status = status;
        }
    }

    /// Make ledger writes for `guide_id` fail as a database error would.
    pub fn break_ledger_for(&self, guide_id: Uuid) {
        self.lock().broken_ledger.insert(guide_id);
    }

    pub fn notifications(&self) -> Vec<NotificationKey> {
        self.lock().notifications.iter().copied().collect()
    }

    pub fn notification_count(&self, request_id: Uuid) -> usize {
        self.lock()
            .notifications
            .iter()
            .filter(|key| key.request_id == request_id)
            .count()
    }

    pub fn responses(&self) -> Vec<Response> {
        self.lock().responses.clone()
    }

    pub fn messages(&self) -> Vec<ThreadMessage> {
        self.lock().messages.clone()
    }

    fn upsert_response(
        &self,
        request_id: Uuid,
        guide_id: Uuid,
        status: ResponseStatus,
        text: Option<&str>,
    ) -> AppResult<Response> {
        let mut state = self.lock();

        let request = state
            .requests
            .iter()
            .find(|r| r.id == request_id)
            .ok_or(AppError::RequestNotFound(request_id))?;
        if !request.status.is_active() {
            return Err(AppError::RequestInactive(request_id));
        }
        let user_id = request.user_id;
        let now = Utc::now();

        let response = match state
            .responses
            .iter_mut()
            .find(|r| r.request_id == request_id && r.guide_id == guide_id)
        {
            Some(existing) => {
                existing.status = status;
                existing.text = text.map(String::from);
                existing.updated_at = now;
                existing.clone()
            }
            None => {
                let response = Response {
                    id: Uuid::new_v4(),
                    request_id,
                    guide_id,
                    user_id,
                    status,
                    text: text.map(String::from),
                    created_at: now,
                    updated_at: now,
                };
                state.responses.push(response.clone());
                response
            }
        };

        if let Some(text) = text {
            let id = i64::try_from(state.messages.len()).unwrap_or(i64::MAX) + 1;
            state.messages.push(ThreadMessage {
                id,
                response_id: response.id,
                sender_role: SenderRole::Guide,
                sender_id: guide_id,
                text: text.to_string(),
                created_at: now,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn request(&self, id: Uuid) -> AppResult<Option<Request>> {
        Ok(self.lock().requests.iter().find(|r| r.id == id).cloned())
    }

    async fn request_by_code(&self, code: &str) -> AppResult<Option<Request>> {
        Ok(self
            .lock()
            .requests
            .iter()
            .find(|r| r.code.eq_ignore_ascii_case(code))
            .cloned())
    }

    async fn guide_by_telegram_id(&self, telegram_id: i64) -> AppResult<Option<Guide>> {
        Ok(self
            .lock()
            .guides
            .iter()
            .find(|g| g.telegram_id == Some(telegram_id))
            .cloned())
    }

    async fn guides_to_notify(&self, request: &Request, now: DateTime<Utc>) -> AppResult<Vec<Guide>> {
        let state = self.lock();
        let mut guides: Vec<Guide> = state
            .guides
            .iter()
            .filter(|g| is_eligible(g, request, now))
            .filter(|g| {
                EligibilityFilter::Fanout.admits(state.responded(request.id, g.id), state.notified(request.id, g.id))
            })
            .cloned()
            .collect();
        guides.sort_by_key(|g| g.id);
        Ok(guides)
    }

    async fn count_browsable(&self, guide: &Guide, now: DateTime<Utc>) -> AppResult<usize> {
        Ok(self.lock().browsable(guide, now).len())
    }

    async fn browsable_at(&self, guide: &Guide, now: DateTime<Utc>, position: usize) -> AppResult<Option<Request>> {
        Ok(self.lock().browsable(guide, now).into_iter().nth(position))
    }

    async fn record_notification(&self, request_id: Uuid, guide_id: Uuid) -> AppResult<bool> {
        let mut state = self.lock();
        if state.broken_ledger.contains(&guide_id) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(state.notifications.insert(NotificationKey { request_id, guide_id }))
    }

    async fn unnotified_requests_since(&self, since: DateTime<Utc>, limit: i64) -> AppResult<Vec<Uuid>> {
        let state = self.lock();
        let mut found: Vec<&Request> = state
            .requests
            .iter()
            .filter(|r| r.status.is_active() && r.created_at >= since)
            .filter(|r| !state.notifications.iter().any(|key| key.request_id == r.id))
            .collect();
        found.sort_by_key(|r| r.created_at);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(found.into_iter().take(limit).map(|r| r.id).collect())
    }

    async fn record_reply(&self, request_id: Uuid, guide_id: Uuid, text: &str) -> AppResult<Response> {
        self.upsert_response(request_id, guide_id, ResponseStatus::Sent, Some(text))
    }

    async fn record_rejection(&self, request_id: Uuid, guide_id: Uuid, reason: Option<&str>) -> AppResult<Response> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        self.upsert_response(request_id, guide_id, ResponseStatus::Rejected, reason)
    }
}
