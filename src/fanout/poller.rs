//! Safety net: periodically scan for active requests nobody has been told about.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::core::config;
use crate::core::error::AppResult;
use crate::core::metrics;
use crate::fanout::discoverer::Discoverer;
use crate::fanout::dispatcher::{FanoutDispatcher, Trigger};

#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    pub interval: Duration,
    pub batch_limit: i64,
    /// How far back the first scan after startup looks
    pub lookback: chrono::Duration,
}

impl PollerSettings {
    pub fn from_env() -> Self {
        Self {
            interval: config::poller::interval(),
            batch_limit: *config::poller::BATCH_LIMIT,
            lookback: chrono::Duration::try_seconds(*config::poller::LOOKBACK_SECS)
                .unwrap_or_else(|| chrono::Duration::minutes(10)),
        }
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            batch_limit: 500,
            lookback: chrono::Duration::minutes(10),
        }
    }
}

pub struct BackupPoller {
    dispatcher: Arc<FanoutDispatcher>,
    settings: PollerSettings,
    watermark: Mutex<Option<DateTime<Utc>>>,
}

impl BackupPoller {
    pub fn new(dispatcher: Arc<FanoutDispatcher>, settings: PollerSettings) -> Self {
        Self {
            dispatcher,
            settings,
            watermark: Mutex::new(None),
        }
    }

    /// Lower bound of the next scan; `None` before the first one.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        *self.watermark.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move the watermark to `now` and return the previous one (or the look-back
    /// start). Never moves backwards.
    fn advance_watermark(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut watermark = self.watermark.lock().unwrap_or_else(|e| e.into_inner());
        let since = watermark.unwrap_or(now - self.settings.lookback);
        *watermark = Some(since.max(now));
        since
    }

    pub async fn poll_once(&self) -> AppResult<usize> {
        self.poll_once_at(Utc::now()).await
    }

    /// One scan as of `now`. Returns how many requests were found.
    pub async fn poll_once_at(&self, now: DateTime<Utc>) -> AppResult<usize> {
        // Advanced before querying: a slow batch must not widen the next window
        let since = self.advance_watermark(now);

        let ids = self
            .dispatcher
            .store()
            .unnotified_requests_since(since, self.settings.batch_limit)
            .await?;
        if ids.is_empty() {
            return Ok(0);
        }

        log::info!("Backup poller found {} request(s) without notifications", ids.len());
        metrics::POLLER_DISCOVERED.inc_by(ids.len() as u64);

        for id in &ids {
            if let Err(e) = self.dispatcher.dispatch(*id, Trigger::Poller).await {
                log::error!("Poller dispatch of {} failed: {}", id, e);
            }
        }
        Ok(ids.len())
    }
}

#[async_trait]
impl Discoverer for BackupPoller {
    fn name(&self) -> &'static str {
        "poller"
    }

    async fn run(&self) {
        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "Backup poller started (interval: {:?}, batch: {}, look-back: {}s)",
            self.settings.interval,
            self.settings.batch_limit,
            self.settings.lookback.num_seconds()
        );

        loop {
            ticker.tick().await;

            if let Err(e) = self.poll_once().await {
                log::error!("Backup poll failed: {}", e);
            }
        }
    }
}
