//! Metrics collection using Prometheus
//!
//! Counters for the fanout paths (listener, poller, dispatcher) and for the bot's
//! interaction handling. Exposed by `metrics_server`.

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, Opts};

// Definitions are static; a failed registration (duplicate name) only loses the export.
#[allow(clippy::expect_used)]
fn counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("static metric definition");
    if let Err(e) = prometheus::register(Box::new(counter.clone())) {
        log::warn!("Metric {} not registered: {}", name, e);
    }
    counter
}

#[allow(clippy::expect_used)]
fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), labels).expect("static metric definition");
    if let Err(e) = prometheus::register(Box::new(counter.clone())) {
        log::warn!("Metric {} not registered: {}", name, e);
    }
    counter
}

// ======================
// FANOUT METRICS
// ======================

/// Dispatcher invocations
/// Labels: trigger (listener/poller/manual)
pub static DISPATCH_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    counter_vec(
        "guidebot_dispatch_total",
        "Fanout dispatches started, by discovery path",
        &["trigger"],
    )
});

/// Push messages delivered to guides
pub static NOTIFICATIONS_SENT: Lazy<IntCounter> =
    Lazy::new(|| counter("guidebot_notifications_sent_total", "Request cards delivered to guides"));

/// Push messages that failed to send
pub static NOTIFICATIONS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "guidebot_notifications_failed_total",
        "Request cards that failed to deliver",
    )
});

/// Requests discovered by the backup poller
pub static POLLER_DISCOVERED: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "guidebot_poller_discovered_total",
        "Requests without ledger entries found by the backup poller",
    )
});

/// Change-capture events
/// Labels: outcome (dispatched/malformed)
pub static LISTENER_EVENTS: Lazy<IntCounterVec> =
    Lazy::new(|| counter_vec("guidebot_listener_events_total", "NOTIFY events received", &["outcome"]));

// ======================
// BOT METRICS
// ======================

/// Responses written by guides
/// Labels: status (sent/rejected)
pub static RESPONSES_RECORDED: Lazy<IntCounterVec> =
    Lazy::new(|| counter_vec("guidebot_responses_recorded_total", "Guide responses recorded", &["status"]));

/// Button clicks swallowed as replays
pub static CLICKS_DEDUPLICATED: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "guidebot_clicks_deduplicated_total",
        "Button clicks ignored as double-taps or client retries",
    )
});

/// Force registration so /metrics lists every series from the first scrape
pub fn init_metrics() {
    Lazy::force(&DISPATCH_TOTAL);
    Lazy::force(&NOTIFICATIONS_SENT);
    Lazy::force(&NOTIFICATIONS_FAILED);
    Lazy::force(&POLLER_DISCOVERED);
    Lazy::force(&LISTENER_EVENTS);
    Lazy::force(&RESPONSES_RECORDED);
    Lazy::force(&CLICKS_DEDUPLICATED);
}
