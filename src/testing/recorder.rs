//! Messenger that records every outbound call instead of talking to Telegram

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;
use teloxide::{ApiError, RequestError};

use crate::core::error::{AppError, AppResult};
use crate::telegram::messenger::{Keyboard, Messenger};

/// One recorded Bot API call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send {
        chat_id: i64,
        message_id: i32,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edit {
        chat_id: i64,
        message_id: i32,
        text: String,
        keyboard: Option<Keyboard>,
    },
    ClearKeyboard {
        chat_id: i64,
        message_id: i32,
    },
    Answer {
        callback_id: String,
        text: Option<String>,
    },
}

pub struct RecordingMessenger {
    calls: Mutex<Vec<Call>>,
    /// Chats whose sends fail as if the user blocked the bot
    failing_chats: Mutex<HashSet<i64>>,
    next_message_id: AtomicI32,
}

impl Default for RecordingMessenger {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing_chats: Mutex::new(HashSet::new()),
            next_message_id: AtomicI32::new(1),
        }
    }

    /// Make every send to `chat_id` fail.
    pub fn fail_chat(&self, chat_id: i64) {
        self.failing_chats.lock().unwrap_or_else(|e| e.into_inner()).insert(chat_id);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Texts successfully sent to `chat_id`, oldest first.
    pub fn sent_to(&self, chat_id: i64) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send { chat_id: c, text, .. } if c == chat_id => Some(text),
                _ => None,
            })
            .collect()
    }

    /// The most recent successful send, with its keyboard.
    pub fn last_send(&self) -> Option<(i64, i32, String, Option<Keyboard>)> {
        self.calls().into_iter().rev().find_map(|call| match call {
            Call::Send {
                chat_id,
                message_id,
                text,
                keyboard,
            } => Some((chat_id, message_id, text, keyboard)),
            _ => None,
        })
    }

    /// Number of successful sends.
    pub fn send_count(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Send { .. })).count()
    }

    /// Callback answers, as (callback id, toast text).
    pub fn answers(&self) -> Vec<(String, Option<String>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Answer { callback_id, text } => Some((callback_id, text)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, chat_id: i64, text: &str, keyboard: Option<Keyboard>) -> AppResult<i32> {
        if self.failing_chats.lock().unwrap_or_else(|e| e.into_inner()).contains(&chat_id) {
            return Err(AppError::Telegram(RequestError::Api(ApiError::BotBlocked)));
        }
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        self.record(Call::Send {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(message_id)
    }

    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str, keyboard: Option<Keyboard>) -> AppResult<()> {
        self.record(Call::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn clear_keyboard(&self, chat_id: i64, message_id: i32) -> AppResult<()> {
        self.record(Call::ClearKeyboard { chat_id, message_id });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> AppResult<()> {
        self.record(Call::Answer {
            callback_id: callback_id.to_string(),
            text: text.map(String::from),
        });
        Ok(())
    }
}
