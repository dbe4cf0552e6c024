//! Handler types and dependencies

use std::sync::Arc;

use teloxide::types::{CallbackQuery, Message};

use crate::telegram::interaction::{CallbackEvent, Interaction, TextEvent};

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub interaction: Arc<Interaction>,
}

impl HandlerDeps {
    pub fn new(interaction: Arc<Interaction>) -> Self {
        Self { interaction }
    }
}

/// Telegram user id of the message author (0 for channel posts and the like).
pub fn sender_id(msg: &Message) -> i64 {
    msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok()).unwrap_or(0)
}

/// Reduce a message to the state machine's text event. Non-text messages become
/// empty text, which a pending reply treats like whitespace.
pub fn text_event(msg: &Message) -> TextEvent {
    TextEvent {
        user_id: sender_id(msg),
        chat_id: msg.chat.id.0,
        text: msg.text().unwrap_or_default().to_string(),
    }
}

/// Reduce a callback query to the state machine's click event.
pub fn callback_event(q: &CallbackQuery) -> CallbackEvent {
    let user_id = i64::try_from(q.from.id.0).unwrap_or(0);
    CallbackEvent {
        callback_id: q.id.0.clone(),
        user_id,
        // Private chats share the user's id
        chat_id: q.message.as_ref().map(|m| m.chat().id.0).unwrap_or(user_id),
        message_id: q.message.as_ref().map(|m| m.id().0),
        data: q.data.clone().unwrap_or_default(),
    }
}
