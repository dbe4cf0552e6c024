//! Push one request to every eligible guide.
//!
//! Guides are delivered in chunks: sends inside a chunk run concurrently, chunks run
//! one after another with a pause in between. A guide is written to the ledger only
//! after its message went out, so a failed send is picked up again by a later
//! dispatch of the same request.

use chrono::Utc;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use strum::AsRefStr;
use uuid::Uuid;

use crate::core::config;
use crate::core::error::AppResult;
use crate::core::metrics;
use crate::storage::models::{Guide, Request};
use crate::storage::Store;
use crate::telegram::cards::{request_card_keyboard, request_card_text};
use crate::telegram::messenger::Messenger;

/// Which discovery path asked for the dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Trigger {
    Listener,
    Poller,
    Manual,
}

#[derive(Debug, Clone, Copy)]
pub struct FanoutSettings {
    pub chunk_size: usize,
    pub chunk_pause: Duration,
}

impl FanoutSettings {
    pub fn from_env() -> Self {
        Self {
            chunk_size: *config::fanout::CHUNK_SIZE,
            chunk_pause: config::fanout::chunk_pause(),
        }
    }
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            chunk_size: 20,
            chunk_pause: Duration::from_secs(1),
        }
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Guides selected for delivery
    pub eligible: usize,
    /// Messages that reached Telegram
    pub delivered: usize,
    /// Sends that failed (no ledger entry written)
    pub failed: usize,
    /// Delivered, but the ledger write failed or found an existing entry
    pub unrecorded: usize,
    /// The request was missing or no longer active; nothing was sent
    pub skipped: bool,
}

enum Delivery {
    Recorded,
    Unrecorded,
    Failed,
}

pub struct FanoutDispatcher {
    store: Arc<dyn Store>,
    messenger: Arc<dyn Messenger>,
    settings: FanoutSettings,
}

impl FanoutDispatcher {
    pub fn new(store: Arc<dyn Store>, messenger: Arc<dyn Messenger>, settings: FanoutSettings) -> Self {
        Self {
            store,
            messenger,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Deliver `request_id` to every guide that should see it now.
    pub async fn dispatch(&self, request_id: Uuid, trigger: Trigger) -> AppResult<DispatchReport> {
        metrics::DISPATCH_TOTAL.with_label_values(&[trigger.as_ref()]).inc();

        let request = match self.store.request(request_id).await? {
            Some(request) if request.status.is_active() => request,
            Some(request) => {
                log::debug!(
                    "Skipping dispatch of {} ({}): status is {}",
                    request_id,
                    trigger.as_ref(),
                    request.status.as_str()
                );
                return Ok(DispatchReport {
                    skipped: true,
                    ..DispatchReport::default()
                });
            }
            None => {
                log::debug!("Skipping dispatch of {} ({}): request not found", request_id, trigger.as_ref());
                return Ok(DispatchReport {
                    skipped: true,
                    ..DispatchReport::default()
                });
            }
        };

        let guides = self.store.guides_to_notify(&request, Utc::now()).await?;
        let mut report = DispatchReport {
            eligible: guides.len(),
            ..DispatchReport::default()
        };
        if guides.is_empty() {
            log::debug!("Request {} ({}): no guides to notify", request.code, trigger.as_ref());
            return Ok(report);
        }

        let text = request_card_text(&request);
        let chunk_size = self.settings.chunk_size.max(1);
        let chunk_count = guides.len().div_ceil(chunk_size);

        for (index, chunk) in guides.chunks(chunk_size).enumerate() {
            let outcomes = join_all(chunk.iter().map(|guide| self.deliver(&request, guide, &text))).await;
            for outcome in outcomes {
                match outcome {
                    Delivery::Recorded => report.delivered += 1,
                    Delivery::Unrecorded => {
                        report.delivered += 1;
                        report.unrecorded += 1;
                    }
                    Delivery::Failed => report.failed += 1,
                }
            }

            if index + 1 < chunk_count && !self.settings.chunk_pause.is_zero() {
                tokio::time::sleep(self.settings.chunk_pause).await;
            }
        }

        log::info!(
            "Request {} dispatched via {}: {} eligible, {} delivered, {} failed",
            request.code,
            trigger.as_ref(),
            report.eligible,
            report.delivered,
            report.failed
        );
        Ok(report)
    }

    async fn deliver(&self, request: &Request, guide: &Guide, text: &str) -> Delivery {
        let Some(chat_id) = guide.telegram_id else {
            return Delivery::Failed;
        };

        if let Err(e) = self
            .messenger
            .send_text(chat_id, text, Some(request_card_keyboard(request.id)))
            .await
        {
            log::warn!("Failed to notify guide {} about {}: {}", guide.id, request.code, e);
            metrics::NOTIFICATIONS_FAILED.inc();
            return Delivery::Failed;
        }
        metrics::NOTIFICATIONS_SENT.inc();

        match self.store.record_notification(request.id, guide.id).await {
            Ok(true) => Delivery::Recorded,
            Ok(false) => {
                log::debug!("Ledger already had ({}, {})", request.id, guide.id);
                Delivery::Unrecorded
            }
            Err(e) => {
                log::error!("Failed to record notification ({}, {}): {}", request.id, guide.id, e);
                Delivery::Unrecorded
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_labels() {
        assert_eq!(Trigger::Listener.as_ref(), "listener");
        assert_eq!(Trigger::Poller.as_ref(), "poller");
        assert_eq!(Trigger::Manual.as_ref(), "manual");
    }

    #[test]
    fn test_default_settings() {
        let settings = FanoutSettings::default();
        assert_eq!(settings.chunk_size, 20);
        assert_eq!(settings.chunk_pause, Duration::from_secs(1));
    }
}
