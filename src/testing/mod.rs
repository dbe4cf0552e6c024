//! In-memory stand-ins for the database and Telegram.
//!
//! Used by unit and integration tests to drive the dispatcher and the interaction
//! state machine without Postgres or a bot token.
//!
//! ```rust
//! use std::sync::Arc;
//! use guidebot::fanout::{FanoutDispatcher, FanoutSettings};
//! use guidebot::testing::{MemoryStore, RecordingMessenger};
//!
//! let store = Arc::new(MemoryStore::new());
//! let messenger = Arc::new(RecordingMessenger::new());
//! let dispatcher = FanoutDispatcher::new(store.clone(), messenger.clone(), FanoutSettings::default());
//! # let _ = dispatcher;
//! ```

pub mod memory_store;
pub mod recorder;

pub use memory_store::MemoryStore;
pub use recorder::{Call, RecordingMessenger};
