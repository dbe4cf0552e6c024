//! Guide-facing conversation logic.
//!
//! A guide is either idle or composing a reply to one request (a `PendingReply`
//! marker exists). Inbound updates arrive here already stripped of teloxide types, so
//! the whole state machine runs against `Store` / `Messenger` fakes in tests.

use chrono::Utc;
use std::sync::Arc;
use teloxide::utils::command::BotCommands;
use uuid::Uuid;

use crate::core::error::{AppError, AppResult};
use crate::core::metrics;
use crate::fanout::eligibility::is_eligible;
use crate::storage::models::{Guide, Request, ResponseStatus};
use crate::storage::Store;
use crate::telegram::bot::Command;
use crate::telegram::cards::{
    browse_card_text, browse_keyboard, cancel_keyboard, reply_prompt, CallbackAction, NOT_A_GUIDE,
    NO_BROWSABLE_REQUESTS,
};
use crate::telegram::dedup::{ClickDedup, ClickKey};
use crate::telegram::messenger::Messenger;
use crate::telegram::pending::{PendingReplies, PendingReply};

const REPLY_SENT: &str = "✅ Your reply was sent. The traveller will see it in their request thread.";
const REPLY_CANCELLED: &str = "Reply cancelled.";
const NOTHING_TO_CANCEL: &str = "There is no reply in progress.";
const EMPTY_REPLY: &str = "Your reply is empty. Write a message, or press Cancel.";
const COMMAND_AS_REPLY: &str = "Commands can't be sent as a reply. Write your reply as plain text, or press Cancel.";
const IDLE_HINT: &str = "To answer a request, press Reply on its card. Use /next to browse open requests.";
const REJECTED: &str = "❌ You rejected this request. It won't be shown to you again.";
const REJECT_USAGE: &str = "Usage: /reject CODE [reason]";

/// A button click, reduced to what the state machine needs.
#[derive(Debug, Clone)]
pub struct CallbackEvent {
    pub callback_id: String,
    pub user_id: i64,
    pub chat_id: i64,
    /// Message the button sits on; absent for messages Telegram no longer exposes
    pub message_id: Option<i32>,
    pub data: String,
}

/// A plain (non-command) text message.
#[derive(Debug, Clone)]
pub struct TextEvent {
    pub user_id: i64,
    pub chat_id: i64,
    pub text: String,
}

/// The cancel keyword is accepted in any case, with or without the slash.
pub fn is_cancel_keyword(text: &str) -> bool {
    let text = text.trim();
    let text = text.strip_prefix('/').unwrap_or(text);
    text.eq_ignore_ascii_case("cancel")
}

/// Split `/reject` arguments into the request code and an optional reason.
pub fn parse_reject_args(args: &str) -> Option<(&str, Option<&str>)> {
    let args = args.trim();
    if args.is_empty() {
        return None;
    }
    match args.split_once(char::is_whitespace) {
        Some((code, reason)) => {
            let reason = reason.trim();
            Some((code, (!reason.is_empty()).then_some(reason)))
        }
        None => Some((args, None)),
    }
}

pub struct Interaction {
    store: Arc<dyn Store>,
    messenger: Arc<dyn Messenger>,
    pending: Arc<dyn PendingReplies>,
    clicks: Arc<dyn ClickDedup>,
}

impl Interaction {
    pub fn new(
        store: Arc<dyn Store>,
        messenger: Arc<dyn Messenger>,
        pending: Arc<dyn PendingReplies>,
        clicks: Arc<dyn ClickDedup>,
    ) -> Self {
        Self {
            store,
            messenger,
            pending,
            clicks,
        }
    }

    /// Handle an inline-button click.
    pub async fn on_callback(&self, event: CallbackEvent) -> AppResult<()> {
        let key = ClickKey::new(event.message_id, event.user_id, event.data.as_str());
        let first = match self.clicks.first_seen(&key).await {
            Ok(first) => first,
            Err(e) => {
                // A broken dedup store must not block the buttons
                log::warn!("Click dedup unavailable, letting click through: {}", e);
                true
            }
        };
        if !first {
            log::debug!("Duplicate click from {} ignored: {}", event.user_id, event.data);
            metrics::CLICKS_DEDUPLICATED.inc();
            return self.messenger.answer_callback(&event.callback_id, None).await;
        }

        let Some(action) = CallbackAction::parse(&event.data) else {
            log::warn!("Unknown callback payload from {}: {:?}", event.user_id, event.data);
            return self.messenger.answer_callback(&event.callback_id, None).await;
        };

        let Some(guide) = self.store.guide_by_telegram_id(event.user_id).await? else {
            return self.messenger.answer_callback(&event.callback_id, None).await;
        };

        match action {
            CallbackAction::Reply(request_id) => self.start_reply(&guide, &event, request_id).await,
            CallbackAction::Reject(request_id) => self.reject_from_card(&guide, &event, request_id).await,
            CallbackAction::Browse(position) => {
                self.show_browse(&guide, event.chat_id, event.message_id, position).await?;
                self.messenger.answer_callback(&event.callback_id, None).await
            }
            CallbackAction::Cancel => {
                let cancelled = self.cancel_pending(event.user_id, event.chat_id).await?;
                if let Some(message_id) = event.message_id {
                    self.clear_keyboard_quietly(event.chat_id, message_id).await;
                }
                let toast = if cancelled { REPLY_CANCELLED } else { NOTHING_TO_CANCEL };
                self.messenger.answer_callback(&event.callback_id, Some(toast)).await
            }
        }
    }

    /// Handle a text message that is not a known bot command.
    pub async fn on_text(&self, event: TextEvent) -> AppResult<()> {
        if self.store.guide_by_telegram_id(event.user_id).await?.is_none() {
            self.messenger.send_text(event.chat_id, NOT_A_GUIDE, None).await?;
            return Ok(());
        }

        if is_cancel_keyword(&event.text) {
            let cancelled = self.cancel_pending(event.user_id, event.chat_id).await?;
            let text = if cancelled { REPLY_CANCELLED } else { NOTHING_TO_CANCEL };
            self.messenger.send_text(event.chat_id, text, None).await?;
            return Ok(());
        }

        let Some(pending) = self.pending.get(event.user_id).await? else {
            self.messenger.send_text(event.chat_id, IDLE_HINT, None).await?;
            return Ok(());
        };

        let text = event.text.trim();
        if text.is_empty() {
            self.messenger
                .send_text(event.chat_id, EMPTY_REPLY, Some(cancel_keyboard()))
                .await?;
            return Ok(());
        }
        if text.starts_with('/') {
            self.messenger
                .send_text(event.chat_id, COMMAND_AS_REPLY, Some(cancel_keyboard()))
                .await?;
            return Ok(());
        }

        match self.store.record_reply(pending.request_id, pending.guide_id, text).await {
            Ok(response) => {
                log::info!(
                    "Guide {} replied to request {} (response {})",
                    pending.guide_id,
                    pending.request_id,
                    response.id
                );
                metrics::RESPONSES_RECORDED
                    .with_label_values(&[ResponseStatus::Sent.as_ref()])
                    .inc();
                self.pending.take(event.user_id).await?;
                if let Some(prompt) = pending.prompt_message_id {
                    self.clear_keyboard_quietly(event.chat_id, prompt).await;
                }
                self.messenger.send_text(event.chat_id, REPLY_SENT, None).await?;
            }
            Err(e) => {
                log_failure("record reply", pending.request_id, &e);
                self.messenger
                    .send_text(event.chat_id, e.user_message(), Some(cancel_keyboard()))
                    .await?;
            }
        }
        Ok(())
    }

    /// Handle a parsed bot command.
    pub async fn on_command(&self, user_id: i64, chat_id: i64, command: Command) -> AppResult<()> {
        if let Command::Help = command {
            self.messenger
                .send_text(chat_id, &Command::descriptions().to_string(), None)
                .await?;
            return Ok(());
        }

        let Some(guide) = self.store.guide_by_telegram_id(user_id).await? else {
            self.messenger.send_text(chat_id, NOT_A_GUIDE, None).await?;
            return Ok(());
        };

        match command {
            Command::Start => {
                let greeting = format!(
                    "Hi, {}! New requests matching your categories will arrive here as they are posted.",
                    guide.name
                );
                self.messenger.send_text(chat_id, &greeting, None).await?;
                self.show_browse(&guide, chat_id, None, 0).await
            }
            Command::Next => self.show_browse(&guide, chat_id, None, 0).await,
            Command::Reject(args) => self.reject_by_code(&guide, user_id, chat_id, &args).await,
            Command::Cancel => {
                let cancelled = self.cancel_pending(user_id, chat_id).await?;
                let text = if cancelled { REPLY_CANCELLED } else { NOTHING_TO_CANCEL };
                self.messenger.send_text(chat_id, text, None).await?;
                Ok(())
            }
            Command::Help => Ok(()),
        }
    }

    async fn start_reply(&self, guide: &Guide, event: &CallbackEvent, request_id: Uuid) -> AppResult<()> {
        let request = match self.visible_request(guide, request_id).await? {
            Some(request) if request.status.is_active() => request,
            Some(_) => return self.toast_error(event, AppError::RequestInactive(request_id)).await,
            None => return self.toast_error(event, AppError::RequestNotFound(request_id)).await,
        };

        let prompt_id = self
            .messenger
            .send_text(event.chat_id, &reply_prompt(&request), Some(cancel_keyboard()))
            .await?;

        let previous = self.pending.get(event.user_id).await?;
        self.pending
            .set(
                event.user_id,
                PendingReply {
                    request_id,
                    guide_id: guide.id,
                    prompt_message_id: Some(prompt_id),
                },
            )
            .await?;

        // Only one reply can be composed at a time; retire the older prompt's button
        if let Some(old_prompt) = previous.and_then(|p| p.prompt_message_id) {
            self.clear_keyboard_quietly(event.chat_id, old_prompt).await;
        }

        log::debug!("Guide {} is composing a reply to {}", guide.id, request.code);
        self.messenger.answer_callback(&event.callback_id, None).await
    }

    async fn reject_from_card(&self, guide: &Guide, event: &CallbackEvent, request_id: Uuid) -> AppResult<()> {
        if self.visible_request(guide, request_id).await?.is_none() {
            return self.toast_error(event, AppError::RequestNotFound(request_id)).await;
        }
        if let Err(e) = self.reject(guide, event.user_id, event.chat_id, request_id, None).await {
            return self.toast_error(event, e).await;
        }
        if let Some(message_id) = event.message_id {
            self.messenger.edit_text(event.chat_id, message_id, REJECTED, None).await?;
        }
        self.messenger
            .answer_callback(&event.callback_id, Some("Request rejected"))
            .await
    }

    async fn reject_by_code(&self, guide: &Guide, user_id: i64, chat_id: i64, args: &str) -> AppResult<()> {
        let Some((code, reason)) = parse_reject_args(args) else {
            self.messenger.send_text(chat_id, REJECT_USAGE, None).await?;
            return Ok(());
        };

        let request = self
            .store
            .request_by_code(code)
            .await?
            .filter(|request| is_eligible(guide, request, Utc::now()));
        let Some(request) = request else {
            self.messenger
                .send_text(chat_id, &format!("No request with code {} was found.", code), None)
                .await?;
            return Ok(());
        };

        let text = match self.reject(guide, user_id, chat_id, request.id, reason).await {
            Ok(()) => format!("❌ Request {} rejected.", request.code),
            Err(e) => e.user_message().to_string(),
        };
        self.messenger.send_text(chat_id, &text, None).await?;
        Ok(())
    }

    /// Record the rejection and drop a pending reply to the same request.
    async fn reject(
        &self,
        guide: &Guide,
        user_id: i64,
        chat_id: i64,
        request_id: Uuid,
        reason: Option<&str>,
    ) -> AppResult<()> {
        match self.store.record_rejection(request_id, guide.id, reason).await {
            Ok(_) => {
                log::info!("Guide {} rejected request {}", guide.id, request_id);
                metrics::RESPONSES_RECORDED
                    .with_label_values(&[ResponseStatus::Rejected.as_ref()])
                    .inc();
            }
            Err(e) => {
                log_failure("record rejection", request_id, &e);
                return Err(e);
            }
        }

        if let Some(pending) = self.pending.get(user_id).await? {
            if pending.request_id == request_id {
                self.pending.take(user_id).await?;
                if let Some(prompt) = pending.prompt_message_id {
                    self.clear_keyboard_quietly(chat_id, prompt).await;
                }
            }
        }
        Ok(())
    }

    /// The request, unless this guide is not meant to see it at all.
    async fn visible_request(&self, guide: &Guide, request_id: Uuid) -> AppResult<Option<Request>> {
        let request = self.store.request(request_id).await?;
        Ok(request.filter(|request| is_eligible(guide, request, Utc::now())))
    }

    /// Drop the pending reply, if any. Returns whether there was one.
    async fn cancel_pending(&self, user_id: i64, chat_id: i64) -> AppResult<bool> {
        let Some(pending) = self.pending.take(user_id).await? else {
            return Ok(false);
        };
        if let Some(prompt) = pending.prompt_message_id {
            self.clear_keyboard_quietly(chat_id, prompt).await;
        }
        Ok(true)
    }

    /// Render the browsable request at `position` (clamped), editing `message_id` in
    /// place when given.
    async fn show_browse(&self, guide: &Guide, chat_id: i64, message_id: Option<i32>, position: usize) -> AppResult<()> {
        let now = Utc::now();
        let total = self.store.count_browsable(guide, now).await?;

        let mut card = None;
        if total > 0 {
            let position = position.min(total - 1);
            if let Some(request) = self.store.browsable_at(guide, now, position).await? {
                card = Some((request, position));
            }
        }

        let (text, keyboard) = match card {
            Some((request, position)) => (
                browse_card_text(&request, position, total),
                Some(browse_keyboard(request.id, position, total)),
            ),
            None => (NO_BROWSABLE_REQUESTS.to_string(), None),
        };

        match message_id {
            Some(message_id) => self.messenger.edit_text(chat_id, message_id, &text, keyboard).await,
            None => self.messenger.send_text(chat_id, &text, keyboard).await.map(|_| ()),
        }
    }

    async fn toast_error(&self, event: &CallbackEvent, err: AppError) -> AppResult<()> {
        self.messenger
            .answer_callback(&event.callback_id, Some(err.user_message()))
            .await
    }

    /// Keyboard cleanup is cosmetic; a failure (message deleted, too old) is only logged.
    async fn clear_keyboard_quietly(&self, chat_id: i64, message_id: i32) {
        if let Err(e) = self.messenger.clear_keyboard(chat_id, message_id).await {
            log::debug!("Could not clear keyboard on message {} in {}: {}", message_id, chat_id, e);
        }
    }
}

fn log_failure(action: &str, request_id: Uuid, err: &AppError) {
    if err.is_domain() {
        log::warn!("Failed to {} for request {}: {}", action, request_id, err);
    } else {
        log::error!("Failed to {} for request {}: {}", action, request_id, err);
    }
}
