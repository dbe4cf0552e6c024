//! Fast path: Postgres LISTEN on the new-request channel.
//!
//! Each event is dispatched in its own task and never retried here; the backup
//! poller covers lost events, dropped connections and failed dispatches.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::Deserialize;
use sqlx::postgres::{PgListener, PgPool};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::config;
use crate::core::metrics;
use crate::fanout::discoverer::Discoverer;
use crate::fanout::dispatcher::{FanoutDispatcher, Trigger};

#[derive(Debug, Deserialize)]
struct NotifyPayload {
    #[serde(alias = "id")]
    request_id: Uuid,
}

/// Extract the request id from a NOTIFY payload (`{"request_id": "<uuid>"}`).
pub fn parse_payload(payload: &str) -> Result<Uuid, serde_json::Error> {
    serde_json::from_str::<NotifyPayload>(payload).map(|p| p.request_id)
}

/// Spawn the dispatch for one event. Malformed payloads are logged and dropped.
pub fn on_notification(dispatcher: &Arc<FanoutDispatcher>, payload: &str) -> Option<JoinHandle<()>> {
    let request_id = match parse_payload(payload) {
        Ok(id) => id,
        Err(e) => {
            log::warn!("Ignoring malformed notification payload {:?}: {}", payload, e);
            metrics::LISTENER_EVENTS.with_label_values(&["malformed"]).inc();
            return None;
        }
    };
    metrics::LISTENER_EVENTS.with_label_values(&["dispatched"]).inc();

    let dispatcher = Arc::clone(dispatcher);
    Some(tokio::spawn(async move {
        if let Err(e) = dispatcher.dispatch(request_id, Trigger::Listener).await {
            log::error!("Listener dispatch of {} failed: {}", request_id, e);
        }
    }))
}

pub struct ChangeListener {
    pool: PgPool,
    channel: String,
    dispatcher: Arc<FanoutDispatcher>,
}

impl ChangeListener {
    pub fn new(pool: PgPool, channel: impl Into<String>, dispatcher: Arc<FanoutDispatcher>) -> Self {
        Self {
            pool,
            channel: channel.into(),
            dispatcher,
        }
    }

    async fn connect(&self) -> Result<PgListener, sqlx::Error> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&self.channel).await?;
        Ok(listener)
    }
}

#[async_trait]
impl Discoverer for ChangeListener {
    fn name(&self) -> &'static str {
        "listener"
    }

    async fn run(&self) {
        let connected = (|| self.connect())
            .retry(ExponentialBuilder::default().with_max_times(config::listener::CONNECT_MAX_ATTEMPTS))
            .notify(|err: &sqlx::Error, dur| {
                log::warn!("LISTEN {} failed, retrying in {:?}: {}", self.channel, dur, err);
            })
            .await;

        let mut listener = match connected {
            Ok(listener) => listener,
            Err(e) => {
                log::error!(
                    "Giving up on LISTEN {} ({}); new requests will arrive via the poller only",
                    self.channel,
                    e
                );
                return;
            }
        };
        log::info!("Listening on channel {}", self.channel);

        loop {
            // recv() reconnects on its own after a dropped connection
            match listener.recv().await {
                Ok(notification) => {
                    on_notification(&self.dispatcher, notification.payload());
                }
                Err(e) => {
                    log::error!("LISTEN {} receive error: {}", self.channel, e);
                    tokio::time::sleep(config::listener::recv_error_delay()).await;
                }
            }
        }
    }
}
