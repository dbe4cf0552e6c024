//! Outbound message channel
//!
//! The fanout and the interaction state machine talk to guides through `Messenger`,
//! expressed in plain ids and a teloxide-free `Keyboard`. `TelegramMessenger` is the
//! Bot API implementation.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{CallbackQueryId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId};
use teloxide::{ApiError, RequestError};

use crate::core::error::AppResult;

/// One inline button: a label and the callback payload it sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Rows of inline buttons attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }

    /// Every callback payload on the keyboard, row by row.
    pub fn payloads(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(|b| b.data.as_str())
    }
}

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a new message; returns its message id.
    async fn send_text(&self, chat_id: i64, text: &str, keyboard: Option<Keyboard>) -> AppResult<i32>;

    /// Replace the text (and keyboard) of an existing message.
    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str, keyboard: Option<Keyboard>) -> AppResult<()>;

    /// Remove the inline keyboard from a message.
    async fn clear_keyboard(&self, chat_id: i64, message_id: i32) -> AppResult<()>;

    /// Acknowledge a button click, optionally with a short toast.
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> AppResult<()>;
}

fn to_markup(keyboard: Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.into_iter().map(|row| {
        row.into_iter()
            .map(|button| InlineKeyboardButton::callback(button.label, button.data))
            .collect::<Vec<_>>()
    }))
}

/// Telegram's answer when an edit would leave the message as it was.
fn is_not_modified(err: &RequestError) -> bool {
    matches!(err, RequestError::Api(ApiError::MessageNotModified))
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: i64, text: &str, keyboard: Option<Keyboard>) -> AppResult<i32> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(to_markup(keyboard));
        }
        let message = request.await?;
        Ok(message.id.0)
    }

    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str, keyboard: Option<Keyboard>) -> AppResult<()> {
        let mut request = self.bot.edit_message_text(ChatId(chat_id), MessageId(message_id), text);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(to_markup(keyboard));
        }
        match request.await {
            Ok(_) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear_keyboard(&self, chat_id: i64, message_id: i32) -> AppResult<()> {
        match self.bot.edit_message_reply_markup(ChatId(chat_id), MessageId(message_id)).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> AppResult<()> {
        let mut request = self.bot.answer_callback_query(CallbackQueryId(callback_id.to_string()));
        if let Some(text) = text {
            request = request.text(text);
        }
        request.await?;
        Ok(())
    }
}
