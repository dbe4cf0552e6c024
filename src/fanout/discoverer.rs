//! The two ways a new request is noticed.
//!
//! `ChangeListener` reacts to NOTIFY events within milliseconds; `BackupPoller` scans
//! the table on an interval and catches whatever the listener missed. Both feed the
//! same `FanoutDispatcher`, and the ledger keeps them from double-sending.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Run until the task is aborted. Failures are logged, never returned.
    async fn run(&self);
}

/// Run a discoverer as a background task.
pub fn spawn_discoverer(discoverer: Arc<dyn Discoverer>) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("Starting {} discoverer", discoverer.name());
        discoverer.run().await;
        log::warn!("{} discoverer stopped", discoverer.name());
    })
}
