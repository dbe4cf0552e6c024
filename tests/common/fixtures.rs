//! Test fixtures: requests, guides and a wired-up dispatcher + state machine
//! over the in-memory fakes.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use guidebot::fanout::{FanoutDispatcher, FanoutSettings};
use guidebot::storage::{Guide, Request, RequestStatus};
use guidebot::telegram::{DedupSettings, Interaction, MemoryClickDedup, MemoryPendingReplies};
use guidebot::testing::{MemoryStore, RecordingMessenger};

pub fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn request(code: &str, categories: &[&str]) -> Request {
    request_at(code, categories, Utc::now())
}

pub fn request_at(code: &str, categories: &[&str], created_at: DateTime<Utc>) -> Request {
    Request {
        id: Uuid::new_v4(),
        code: code.to_string(),
        user_id: Uuid::new_v4(),
        body: format!("Looking for help with {}", categories.join(" and ")),
        categories: tags(categories),
        status: RequestStatus::Active,
        created_at,
    }
}

pub fn guide(name: &str, telegram_id: i64, categories: &[&str]) -> Guide {
    Guide {
        id: Uuid::new_v4(),
        name: name.to_string(),
        telegram_id: Some(telegram_id),
        is_active: true,
        subscription_until: None,
        categories: tags(categories),
    }
}

/// No pacing delay, small chunks so multi-chunk paths are exercised.
pub fn fast_settings() -> FanoutSettings {
    FanoutSettings {
        chunk_size: 2,
        chunk_pause: Duration::ZERO,
    }
}

/// Everything a test needs, sharing one store and one messenger.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub messenger: Arc<RecordingMessenger>,
    pub pending: Arc<MemoryPendingReplies>,
    pub dispatcher: Arc<FanoutDispatcher>,
    pub interaction: Interaction,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(fast_settings())
    }

    pub fn with_settings(settings: FanoutSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let pending = Arc::new(MemoryPendingReplies::new());
        let dispatcher = Arc::new(FanoutDispatcher::new(store.clone(), messenger.clone(), settings));
        let interaction = Interaction::new(
            store.clone(),
            messenger.clone(),
            pending.clone(),
            Arc::new(MemoryClickDedup::new(DedupSettings::default())),
        );
        Self {
            store,
            messenger,
            pending,
            dispatcher,
            interaction,
        }
    }

    pub fn add_request(&self, request: Request) -> Request {
        self.store.add_request(request.clone());
        request
    }

    pub fn add_guide(&self, guide: Guide) -> Guide {
        self.store.add_guide(guide.clone());
        guide
    }
}
