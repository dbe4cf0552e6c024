//! guidebot - Telegram notification fanout for guide requests
//!
//! New requests are discovered two ways (a Postgres LISTEN/NOTIFY listener and a
//! backup poller), matched against guide categories and pushed in paced chunks. Guides
//! answer through inline buttons and free text handled by a small state machine.
//!
//! # Module Structure
//!
//! - `core`: Configuration, errors, logging and metrics
//! - `storage`: Postgres store and domain models
//! - `fanout`: Eligibility, dispatcher, listener and poller
//! - `telegram`: Bot commands, cards and the interaction state machine
//! - `testing`: In-memory `Store` and `Messenger` for tests

pub mod cli;
pub mod core;
pub mod fanout;
pub mod storage;
pub mod telegram;
pub mod testing;

// Re-export commonly used types for convenience
pub use crate::core::{config, AppError, AppResult};
pub use fanout::{FanoutDispatcher, Trigger};
pub use storage::{create_pool, PgStore, Store};
