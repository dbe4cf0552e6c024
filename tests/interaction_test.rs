//! Integration tests for the guide interaction state machine
//!
//! Run with: cargo test --test interaction_test

mod common;

use pretty_assertions::assert_eq;
use uuid::Uuid;

use common::{guide, request, Harness};
use guidebot::storage::{Guide, Request, RequestStatus, ResponseStatus};
use guidebot::telegram::cards::{CallbackAction, NOT_A_GUIDE, NO_BROWSABLE_REQUESTS};
use guidebot::telegram::{CallbackEvent, Command, PendingReplies, TextEvent};
use guidebot::testing::Call;

const GUIDE_CHAT: i64 = 1001;

fn setup() -> (Harness, Guide, Request) {
    let h = Harness::new();
    let g = h.add_guide(guide("Marta", GUIDE_CHAT, &["taxi"]));
    let r = h.add_request(request("R-1", &["taxi", "boats"]));
    (h, g, r)
}

fn click(message_id: i32, action: CallbackAction) -> CallbackEvent {
    CallbackEvent {
        callback_id: format!("cb-{}-{}", message_id, action.encode()),
        user_id: GUIDE_CHAT,
        chat_id: GUIDE_CHAT,
        message_id: Some(message_id),
        data: action.encode(),
    }
}

fn text(body: &str) -> TextEvent {
    TextEvent {
        user_id: GUIDE_CHAT,
        chat_id: GUIDE_CHAT,
        text: body.to_string(),
    }
}

async fn start_reply(h: &Harness, request_id: Uuid) {
    h.interaction
        .on_callback(click(500, CallbackAction::Reply(request_id)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reply_button_prompts_and_waits_for_text() {
    let (h, g, r) = setup();
    start_reply(&h, r.id).await;

    let pending = h.pending.get(GUIDE_CHAT).await.unwrap().expect("pending reply");
    assert_eq!(pending.request_id, r.id);
    assert_eq!(pending.guide_id, g.id);

    let (chat, prompt_id, prompt, keyboard) = h.messenger.last_send().unwrap();
    assert_eq!(chat, GUIDE_CHAT);
    assert_eq!(pending.prompt_message_id, Some(prompt_id));
    assert!(prompt.contains("R-1"));
    let payloads: Vec<String> = keyboard.unwrap().payloads().map(String::from).collect();
    assert_eq!(payloads, vec!["cancel".to_string()]);
}

#[tokio::test]
async fn test_valid_text_records_one_response_and_returns_to_idle() {
    let (h, g, r) = setup();
    start_reply(&h, r.id).await;

    h.interaction.on_text(text("  I can take you on Saturday.  ")).await.unwrap();

    let responses = h.store.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, ResponseStatus::Sent);
    assert_eq!(responses[0].guide_id, g.id);
    assert_eq!(responses[0].user_id, r.user_id);
    assert_eq!(responses[0].text.as_deref(), Some("I can take you on Saturday."));

    let messages = h.store.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "I can take you on Saturday.");

    assert_eq!(h.pending.get(GUIDE_CHAT).await.unwrap(), None);
    assert!(h
        .messenger
        .calls()
        .iter()
        .any(|c| matches!(c, Call::ClearKeyboard { .. })));
    assert!(h.messenger.sent_to(GUIDE_CHAT).last().unwrap().contains("reply was sent"));
}

#[tokio::test]
async fn test_cancel_keyword_discards_pending_reply() {
    let (h, _, r) = setup();
    start_reply(&h, r.id).await;

    h.interaction.on_text(text("CANCEL")).await.unwrap();

    assert_eq!(h.pending.get(GUIDE_CHAT).await.unwrap(), None);
    assert!(h.store.responses().is_empty());
    assert_eq!(h.messenger.sent_to(GUIDE_CHAT).last().unwrap(), "Reply cancelled.");
}

#[tokio::test]
async fn test_cancel_button_discards_pending_reply() {
    let (h, _, r) = setup();
    start_reply(&h, r.id).await;
    let (_, prompt_id, _, _) = h.messenger.last_send().unwrap();

    h.interaction
        .on_callback(click(prompt_id, CallbackAction::Cancel))
        .await
        .unwrap();

    assert_eq!(h.pending.get(GUIDE_CHAT).await.unwrap(), None);
    assert!(h.store.responses().is_empty());
    let (_, toast) = h.messenger.answers().pop().unwrap();
    assert_eq!(toast.as_deref(), Some("Reply cancelled."));
}

#[tokio::test]
async fn test_cancel_command_matches_keyword() {
    let (h, _, r) = setup();
    start_reply(&h, r.id).await;

    h.interaction
        .on_command(GUIDE_CHAT, GUIDE_CHAT, Command::Cancel)
        .await
        .unwrap();
    assert_eq!(h.pending.get(GUIDE_CHAT).await.unwrap(), None);
}

#[tokio::test]
async fn test_empty_text_keeps_waiting() {
    let (h, _, r) = setup();
    start_reply(&h, r.id).await;
    let before = h.pending.get(GUIDE_CHAT).await.unwrap();

    h.interaction.on_text(text("   \n ")).await.unwrap();

    assert_eq!(h.pending.get(GUIDE_CHAT).await.unwrap(), before);
    assert!(h.store.responses().is_empty());
    let (_, _, _, keyboard) = h.messenger.last_send().unwrap();
    assert!(keyboard.is_some(), "cancel is offered again");
}

#[tokio::test]
async fn test_unknown_command_is_not_recorded_as_reply() {
    let (h, _, r) = setup();
    start_reply(&h, r.id).await;

    h.interaction.on_text(text("/whatever")).await.unwrap();

    assert!(h.store.responses().is_empty());
    assert!(h.pending.get(GUIDE_CHAT).await.unwrap().is_some());
}

#[tokio::test]
async fn test_reply_to_closed_request_keeps_pending_state() {
    let (h, _, r) = setup();
    start_reply(&h, r.id).await;
    h.store.set_request_status(r.id, RequestStatus::Closed);

    h.interaction.on_text(text("Still interested?")).await.unwrap();

    assert!(h.store.responses().is_empty());
    assert!(h.pending.get(GUIDE_CHAT).await.unwrap().is_some());
    let (_, _, message, keyboard) = h.messenger.last_send().unwrap();
    assert!(message.contains("closed"));
    assert!(keyboard.is_some());
}

#[tokio::test]
async fn test_reply_button_on_closed_request_only_toasts() {
    let (h, _, r) = setup();
    h.store.set_request_status(r.id, RequestStatus::Closed);

    start_reply(&h, r.id).await;

    assert_eq!(h.pending.get(GUIDE_CHAT).await.unwrap(), None);
    assert_eq!(h.messenger.send_count(), 0);
    assert!(h.messenger.answers()[0].1.is_some());
}

#[tokio::test]
async fn test_reject_button_records_rejection_and_edits_card() {
    let (h, _, r) = setup();

    h.interaction
        .on_callback(click(42, CallbackAction::Reject(r.id)))
        .await
        .unwrap();

    let responses = h.store.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, ResponseStatus::Rejected);
    assert!(h.store.messages().is_empty());
    assert!(h
        .messenger
        .calls()
        .iter()
        .any(|c| matches!(c, Call::Edit { message_id: 42, keyboard: None, .. })));
}

#[tokio::test]
async fn test_duplicate_click_has_one_effect() {
    let (h, _, r) = setup();
    let event = click(42, CallbackAction::Reject(r.id));

    h.interaction.on_callback(event.clone()).await.unwrap();
    h.interaction.on_callback(event).await.unwrap();

    assert_eq!(h.store.responses().len(), 1);
    let edits = h
        .messenger
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Edit { .. }))
        .count();
    assert_eq!(edits, 1);
    // Both clicks are acknowledged so the client stops spinning
    assert_eq!(h.messenger.answers().len(), 2);
}

#[tokio::test]
async fn test_reply_after_reject_overwrites_response() {
    let (h, _, r) = setup();
    h.interaction
        .on_callback(click(42, CallbackAction::Reject(r.id)))
        .await
        .unwrap();

    start_reply(&h, r.id).await;
    h.interaction.on_text(text("Changed my mind, I'm free.")).await.unwrap();

    let responses = h.store.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, ResponseStatus::Sent);
    assert_eq!(responses[0].text.as_deref(), Some("Changed my mind, I'm free."));
}

#[tokio::test]
async fn test_rejecting_the_pending_request_clears_pending() {
    let (h, _, r) = setup();
    start_reply(&h, r.id).await;

    h.interaction
        .on_callback(click(42, CallbackAction::Reject(r.id)))
        .await
        .unwrap();

    assert_eq!(h.pending.get(GUIDE_CHAT).await.unwrap(), None);
}

#[tokio::test]
async fn test_new_reply_replaces_older_prompt() {
    let (h, _, r1) = setup();
    let r2 = h.add_request(request("R-2", &["taxi"]));

    start_reply(&h, r1.id).await;
    let (_, first_prompt, _, _) = h.messenger.last_send().unwrap();
    h.interaction
        .on_callback(click(501, CallbackAction::Reply(r2.id)))
        .await
        .unwrap();

    let pending = h.pending.get(GUIDE_CHAT).await.unwrap().unwrap();
    assert_eq!(pending.request_id, r2.id);
    assert!(h.messenger.calls().iter().any(|c| matches!(
        c,
        Call::ClearKeyboard { message_id, .. } if *message_id == first_prompt
    )));
}

#[tokio::test]
async fn test_reject_command_with_reason() {
    let (h, _, r) = setup();

    h.interaction
        .on_command(
            GUIDE_CHAT,
            GUIDE_CHAT,
            Command::Reject("r-1 booked all week".to_string()),
        )
        .await
        .unwrap();

    let responses = h.store.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].request_id, r.id);
    assert_eq!(responses[0].status, ResponseStatus::Rejected);
    assert_eq!(h.store.messages()[0].text, "booked all week");
    assert!(h.messenger.sent_to(GUIDE_CHAT)[0].contains("rejected"));
}

#[tokio::test]
async fn test_reject_command_unknown_code() {
    let (h, _, _) = setup();

    h.interaction
        .on_command(GUIDE_CHAT, GUIDE_CHAT, Command::Reject("R-404".to_string()))
        .await
        .unwrap();

    assert!(h.store.responses().is_empty());
    assert!(h.messenger.sent_to(GUIDE_CHAT)[0].contains("R-404"));
}

#[tokio::test]
async fn test_reject_command_for_other_category_is_treated_as_unknown() {
    let (h, _, _) = setup();
    h.add_request(request("R-FOOD", &["food"]));

    h.interaction
        .on_command(GUIDE_CHAT, GUIDE_CHAT, Command::Reject("R-FOOD".to_string()))
        .await
        .unwrap();

    assert!(h.store.responses().is_empty());
    assert_eq!(
        h.messenger.sent_to(GUIDE_CHAT),
        vec!["No request with code R-FOOD was found.".to_string()]
    );
}

#[tokio::test]
async fn test_buttons_for_other_category_change_nothing() {
    let (h, _, _) = setup();
    let food = h.add_request(request("R-FOOD", &["food"]));

    start_reply(&h, food.id).await;
    h.interaction
        .on_callback(click(43, CallbackAction::Reject(food.id)))
        .await
        .unwrap();

    assert_eq!(h.pending.get(GUIDE_CHAT).await.unwrap(), None);
    assert!(h.store.responses().is_empty());
    assert_eq!(h.messenger.send_count(), 0);
    let answers = h.messenger.answers();
    assert_eq!(answers.len(), 2);
    assert!(answers.iter().all(|(_, toast)| toast.as_deref() == Some("This request no longer exists.")));
}

#[tokio::test]
async fn test_browse_clamps_position() {
    let (h, _, _) = setup();
    h.add_request(request("R-2", &["taxi"]));

    h.interaction
        .on_callback(click(77, CallbackAction::Browse(10)))
        .await
        .unwrap();

    match h.messenger.calls().first() {
        Some(Call::Edit { message_id, text, .. }) => {
            assert_eq!(*message_id, 77);
            assert!(text.starts_with("📋 Request 2 of 2"), "{}", text);
        }
        other => panic!("expected an edit, got {:?}", other),
    }
    assert!(h.store.responses().is_empty());
}

#[tokio::test]
async fn test_browse_skips_answered_requests() {
    let (h, _, r) = setup();
    h.interaction
        .on_callback(click(42, CallbackAction::Reject(r.id)))
        .await
        .unwrap();
    h.messenger.clear();

    h.interaction
        .on_command(GUIDE_CHAT, GUIDE_CHAT, Command::Next)
        .await
        .unwrap();

    assert_eq!(h.messenger.sent_to(GUIDE_CHAT), vec![NO_BROWSABLE_REQUESTS.to_string()]);
}

#[tokio::test]
async fn test_unregistered_user_is_told_so() {
    let (h, _, r) = setup();
    let stranger = 9999;

    h.interaction
        .on_text(TextEvent {
            user_id: stranger,
            chat_id: stranger,
            text: "hello".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(h.messenger.sent_to(stranger), vec![NOT_A_GUIDE.to_string()]);

    h.interaction
        .on_callback(CallbackEvent {
            callback_id: "cb-stranger".to_string(),
            user_id: stranger,
            chat_id: stranger,
            message_id: Some(1),
            data: CallbackAction::Reject(r.id).encode(),
        })
        .await
        .unwrap();
    assert!(h.store.responses().is_empty());
    assert_eq!(h.messenger.answers(), vec![("cb-stranger".to_string(), None)]);
}

#[tokio::test]
async fn test_text_without_pending_reply_gets_hint() {
    let (h, _, _) = setup();

    h.interaction.on_text(text("hello?")).await.unwrap();

    assert!(h.store.responses().is_empty());
    assert!(h.messenger.sent_to(GUIDE_CHAT)[0].contains("/next"));
}
