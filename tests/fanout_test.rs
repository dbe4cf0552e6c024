//! Integration tests for the fanout dispatcher
//!
//! Run with: cargo test --test fanout_test

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};
use uuid::Uuid;

use common::{guide, request, Harness};
use guidebot::fanout::{DispatchReport, FanoutSettings, Trigger};
use guidebot::storage::{NotificationKey, RequestStatus, Store};
use guidebot::testing::Call;

#[tokio::test]
async fn test_matching_guide_is_notified_once() {
    let h = Harness::new();
    let r1 = h.add_request(request("R-1", &["boats", "taxi"]));
    let g1 = h.add_guide(guide("Marta", 1001, &["taxi"]));

    let report = h.dispatcher.dispatch(r1.id, Trigger::Listener).await.unwrap();
    assert_eq!(
        report,
        DispatchReport {
            eligible: 1,
            delivered: 1,
            ..DispatchReport::default()
        }
    );
    assert_eq!(
        h.store.notifications(),
        vec![NotificationKey {
            request_id: r1.id,
            guide_id: g1.id
        }]
    );

    let sent = h.messenger.sent_to(1001);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("R-1"));

    let (_, _, _, keyboard) = h.messenger.last_send().unwrap();
    let payloads: Vec<String> = keyboard.unwrap().payloads().map(String::from).collect();
    assert_eq!(payloads, vec![format!("reply:{}", r1.id), format!("reject:{}", r1.id)]);

    // Second dispatch of the same request finds nobody left to notify
    let again = h.dispatcher.dispatch(r1.id, Trigger::Poller).await.unwrap();
    assert_eq!(again.eligible, 0);
    assert_eq!(h.messenger.send_count(), 1);
}

#[tokio::test]
async fn test_expired_subscription_is_excluded() {
    let h = Harness::new();
    let r1 = h.add_request(request("R-1", &["boats", "taxi"]));
    h.add_guide(guide("Marta", 1001, &["taxi"]));
    let mut g2 = guide("Oleg", 1002, &["boats"]);
    g2.subscription_until = Some(Utc::now() - ChronoDuration::days(3));
    h.add_guide(g2);

    let report = h.dispatcher.dispatch(r1.id, Trigger::Listener).await.unwrap();
    assert_eq!(report.eligible, 1);
    assert!(h.messenger.sent_to(1002).is_empty());
}

#[tokio::test]
async fn test_inactive_unlinked_and_unrelated_guides_are_excluded() {
    let h = Harness::new();
    let r1 = h.add_request(request("R-1", &["boats"]));

    let mut inactive = guide("Inactive", 2001, &["boats"]);
    inactive.is_active = false;
    h.add_guide(inactive);

    let mut unlinked = guide("Unlinked", 2002, &["boats"]);
    unlinked.telegram_id = None;
    h.add_guide(unlinked);

    h.add_guide(guide("Food only", 2003, &["food"]));
    h.add_guide(guide("No tags", 2004, &[]));

    let report = h.dispatcher.dispatch(r1.id, Trigger::Manual).await.unwrap();
    assert_eq!(report.eligible, 0);
    assert_eq!(h.messenger.send_count(), 0);
}

#[tokio::test]
async fn test_guide_who_already_responded_is_not_pushed() {
    let h = Harness::new();
    let r1 = h.add_request(request("R-1", &["taxi"]));
    let g1 = h.add_guide(guide("Marta", 1001, &["taxi"]));
    h.store.record_rejection(r1.id, g1.id, None).await.unwrap();

    let report = h.dispatcher.dispatch(r1.id, Trigger::Listener).await.unwrap();
    assert_eq!(report.eligible, 0);
}

#[tokio::test]
async fn test_closed_or_missing_request_is_skipped() {
    let h = Harness::new();
    let r1 = h.add_request(request("R-1", &["taxi"]));
    h.add_guide(guide("Marta", 1001, &["taxi"]));
    h.store.set_request_status(r1.id, RequestStatus::Closed);

    let closed = h.dispatcher.dispatch(r1.id, Trigger::Listener).await.unwrap();
    assert!(closed.skipped);

    let missing = h.dispatcher.dispatch(Uuid::new_v4(), Trigger::Listener).await.unwrap();
    assert!(missing.skipped);

    assert_eq!(h.messenger.send_count(), 0);
    assert!(h.store.notifications().is_empty());
}

#[tokio::test]
async fn test_failed_send_does_not_affect_siblings() {
    let h = Harness::new();
    let r1 = h.add_request(request("R-1", &["taxi"]));
    for telegram_id in 3001..=3005 {
        h.add_guide(guide("Guide", telegram_id, &["taxi"]));
    }
    h.messenger.fail_chat(3003);

    let report = h.dispatcher.dispatch(r1.id, Trigger::Listener).await.unwrap();
    assert_eq!(report.eligible, 5);
    assert_eq!(report.delivered, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(h.store.notification_count(r1.id), 4);

    // The guide without a ledger entry is retried by the next dispatch
    let retry = h.dispatcher.dispatch(r1.id, Trigger::Poller).await.unwrap();
    assert_eq!(retry.eligible, 1);
    assert_eq!(retry.failed, 1);
}

#[tokio::test]
async fn test_ledger_failure_is_isolated_per_guide() {
    let h = Harness::new();
    let r1 = h.add_request(request("R-1", &["taxi"]));
    let g1 = h.add_guide(guide("Marta", 1001, &["taxi"]));
    h.add_guide(guide("Oleg", 1002, &["taxi"]));
    h.store.break_ledger_for(g1.id);

    let report = h.dispatcher.dispatch(r1.id, Trigger::Listener).await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.unrecorded, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(h.store.notification_count(r1.id), 1);
}

#[tokio::test]
async fn test_racing_dispatches_leave_one_ledger_entry_per_guide() {
    let h = Harness::new();
    let r1 = h.add_request(request("R-1", &["taxi"]));
    for telegram_id in 4001..=4004 {
        h.add_guide(guide("Guide", telegram_id, &["taxi"]));
    }

    let (a, b) = tokio::join!(
        h.dispatcher.dispatch(r1.id, Trigger::Listener),
        h.dispatcher.dispatch(r1.id, Trigger::Poller)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(h.store.notification_count(r1.id), 4);
    assert_eq!(a.delivered - a.unrecorded + b.delivered - b.unrecorded, 4);
}

#[tokio::test]
async fn test_chunks_are_paced() {
    let h = Harness::with_settings(FanoutSettings {
        chunk_size: 2,
        chunk_pause: Duration::from_millis(60),
    });
    let r1 = h.add_request(request("R-1", &["taxi"]));
    for telegram_id in 5001..=5005 {
        h.add_guide(guide("Guide", telegram_id, &["taxi"]));
    }

    let started = Instant::now();
    let report = h.dispatcher.dispatch(r1.id, Trigger::Manual).await.unwrap();
    let elapsed = started.elapsed();

    // 5 guides in chunks of 2 -> 3 chunks -> 2 pauses, none after the last chunk
    assert_eq!(report.delivered, 5);
    assert!(elapsed >= Duration::from_millis(120), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_card_goes_to_guide_chat() {
    let h = Harness::new();
    let r1 = h.add_request(request("R-9", &["museums"]));
    h.add_guide(guide("Marta", 1001, &["museums"]));

    h.dispatcher.dispatch(r1.id, Trigger::Listener).await.unwrap();

    match h.messenger.calls().first() {
        Some(Call::Send { chat_id, text, .. }) => {
            assert_eq!(*chat_id, 1001);
            assert!(text.contains("museums"));
            assert!(text.contains(&r1.body));
        }
        other => panic!("expected a send, got {:?}", other),
    }
}

#[tokio::test]
async fn test_oversized_request_is_still_delivered() {
    let h = Harness::new();
    let mut long = request("R-LONG", &["taxi"]);
    long.body = "x".repeat(5000);
    let r1 = h.add_request(long);
    h.add_guide(guide("Marta", 1001, &["taxi"]));

    let report = h.dispatcher.dispatch(r1.id, Trigger::Listener).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(h.store.notification_count(r1.id), 1);
    assert!(h.messenger.sent_to(1001)[0].chars().count() <= guidebot::telegram::cards::MAX_MESSAGE_CHARS);
}
