//! Telegram bot integration: outbound messenger, cards and the guide state machine

pub mod bot;
pub mod cards;
pub mod dedup;
pub mod handlers;
pub mod interaction;
pub mod messenger;
pub mod pending;

// Re-exports for convenience
pub use bot::{create_bot, setup_bot_commands, Command};
pub use dedup::{ClickDedup, ClickKey, DedupSettings, MemoryClickDedup, RedisClickDedup};
pub use handlers::{schema, HandlerDeps};
pub use interaction::{CallbackEvent, Interaction, TextEvent};
pub use messenger::{Button, Keyboard, Messenger, TelegramMessenger};
pub use pending::{MemoryPendingReplies, PendingReplies, PendingReply, RedisPendingReplies};
