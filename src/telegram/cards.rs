//! Request cards, keyboards and the callback payloads behind their buttons.
//!
//! Messages are plain text (no parse mode): request bodies are user input and would
//! otherwise need escaping.

use uuid::Uuid;

use crate::storage::models::Request;
use crate::telegram::messenger::{Button, Keyboard};

/// What a button click asks for. Encoded into the 64-byte callback payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Reply(Uuid),
    Reject(Uuid),
    /// Show the browsable request at this position
    Browse(usize),
    Cancel,
}

impl CallbackAction {
    pub fn encode(&self) -> String {
        match self {
            CallbackAction::Reply(id) => format!("reply:{}", id),
            CallbackAction::Reject(id) => format!("reject:{}", id),
            CallbackAction::Browse(position) => format!("browse:{}", position),
            CallbackAction::Cancel => "cancel".to_string(),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        if data == "cancel" {
            return Some(CallbackAction::Cancel);
        }
        let (kind, arg) = data.split_once(':')?;
        match kind {
            "reply" => Uuid::parse_str(arg).ok().map(CallbackAction::Reply),
            "reject" => Uuid::parse_str(arg).ok().map(CallbackAction::Reject),
            "browse" => arg.parse().ok().map(CallbackAction::Browse),
            _ => None,
        }
    }
}

/// Telegram rejects message text longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Cut `text` to at most `max` chars, ending with an ellipsis when shortened.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn body_with_header(header: &str, request: &Request) -> String {
    let categories = if request.categories.is_empty() {
        "—".to_string()
    } else {
        request.categories.join(", ")
    };
    let head = format!("{}\nCode: {}\nCategories: {}\n\n", header, request.code, categories);
    let room = MAX_MESSAGE_CHARS.saturating_sub(head.chars().count());
    let body = truncate_chars(&request.body, room);
    let card = head + &body;
    // A pathological header still has to fit
    truncate_chars(&card, MAX_MESSAGE_CHARS)
}

/// Text of the push sent to every eligible guide.
pub fn request_card_text(request: &Request) -> String {
    body_with_header("🆕 New request", request)
}

fn action_row(request_id: Uuid) -> Vec<Button> {
    vec![
        Button::new("✍️ Reply", CallbackAction::Reply(request_id).encode()),
        Button::new("❌ Reject", CallbackAction::Reject(request_id).encode()),
    ]
}

pub fn request_card_keyboard(request_id: Uuid) -> Keyboard {
    Keyboard::new(vec![action_row(request_id)])
}

/// Card shown while browsing; `position` is zero-based.
pub fn browse_card_text(request: &Request, position: usize, total: usize) -> String {
    body_with_header(&format!("📋 Request {} of {}", position + 1, total), request)
}

/// Reply/Reject plus whichever of Prev/Next make sense at `position`.
pub fn browse_keyboard(request_id: Uuid, position: usize, total: usize) -> Keyboard {
    let mut rows = vec![action_row(request_id)];

    let mut nav = Vec::new();
    if position > 0 {
        nav.push(Button::new("◀️ Prev", CallbackAction::Browse(position - 1).encode()));
    }
    if position + 1 < total {
        nav.push(Button::new("Next ▶️", CallbackAction::Browse(position + 1).encode()));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }

    Keyboard::new(rows)
}

pub fn cancel_keyboard() -> Keyboard {
    Keyboard::new(vec![vec![Button::new("Cancel", CallbackAction::Cancel.encode())]])
}

pub const NO_BROWSABLE_REQUESTS: &str = "No open requests match your categories right now. New ones will arrive here automatically.";

pub const NOT_A_GUIDE: &str = "This Telegram account isn't linked to a guide profile. Link it in your guide settings to receive requests.";

pub fn reply_prompt(request: &Request) -> String {
    format!(
        "✍️ Write your reply to request {}.\nSend it as a single message, or press Cancel.",
        request.code
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::RequestStatus;
    use chrono::Utc;

    fn sample_request() -> Request {
        Request {
            id: Uuid::new_v4(),
            code: "R-7KQ2".to_string(),
            user_id: Uuid::new_v4(),
            body: "Boat trip for 4 people on Saturday".to_string(),
            categories: vec!["boats".to_string(), "taxi".to_string()],
            status: RequestStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_callback_action_round_trip() {
        let id = Uuid::new_v4();
        for action in [
            CallbackAction::Reply(id),
            CallbackAction::Reject(id),
            CallbackAction::Browse(12),
            CallbackAction::Cancel,
        ] {
            assert_eq!(CallbackAction::parse(&action.encode()), Some(action));
        }
    }

    #[test]
    fn test_callback_payload_fits_telegram_limit() {
        let encoded = CallbackAction::Reject(Uuid::new_v4()).encode();
        assert!(encoded.len() <= 64, "payload too long: {}", encoded.len());
    }

    #[test]
    fn test_callback_action_rejects_garbage() {
        assert_eq!(CallbackAction::parse(""), None);
        assert_eq!(CallbackAction::parse("reply:not-a-uuid"), None);
        assert_eq!(CallbackAction::parse("browse:-1"), None);
        assert_eq!(CallbackAction::parse("download:1"), None);
    }

    #[test]
    fn test_request_card_mentions_code_and_categories() {
        let request = sample_request();
        let text = request_card_text(&request);
        assert!(text.contains("R-7KQ2"));
        assert!(text.contains("boats, taxi"));
        assert!(text.contains("Boat trip"));

        let payloads: Vec<String> = request_card_keyboard(request.id).payloads().map(String::from).collect();
        assert_eq!(
            payloads,
            vec![format!("reply:{}", request.id), format!("reject:{}", request.id)]
        );
    }

    #[test]
    fn test_browse_keyboard_navigation_edges() {
        let id = Uuid::new_v4();

        let only = browse_keyboard(id, 0, 1);
        assert_eq!(only.rows.len(), 1);

        let first = browse_keyboard(id, 0, 3);
        assert_eq!(first.rows[1].len(), 1);
        assert_eq!(first.rows[1][0].data, "browse:1");

        let middle = browse_keyboard(id, 1, 3);
        let nav: Vec<&str> = middle.rows[1].iter().map(|b| b.data.as_str()).collect();
        assert_eq!(nav, vec!["browse:0", "browse:2"]);

        let last = browse_keyboard(id, 2, 3);
        assert_eq!(last.rows[1][0].data, "browse:1");
        assert_eq!(last.rows[1].len(), 1);
    }

    #[test]
    fn test_long_body_is_cut_to_message_limit() {
        let mut request = sample_request();
        request.body = "ж".repeat(5000);

        let card = request_card_text(&request);
        assert_eq!(card.chars().count(), MAX_MESSAGE_CHARS);
        assert!(card.ends_with('…'));
        assert!(card.contains("R-7KQ2"));

        let browse = browse_card_text(&request, 2, 10);
        assert!(browse.chars().count() <= MAX_MESSAGE_CHARS);
        assert!(browse.starts_with("📋 Request 3 of 10"));
    }

    #[test]
    fn test_short_body_is_untouched() {
        let request = sample_request();
        assert!(request_card_text(&request).ends_with("Boat trip for 4 people on Saturday"));
    }

    #[test]
    fn test_browse_card_is_one_based() {
        let text = browse_card_text(&sample_request(), 0, 4);
        assert!(text.starts_with("📋 Request 1 of 4"));
    }
}
