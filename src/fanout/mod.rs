//! Request discovery and delivery to guides

pub mod discoverer;
pub mod dispatcher;
pub mod eligibility;
pub mod listener;
pub mod poller;

// Re-exports for convenience
pub use discoverer::{spawn_discoverer, Discoverer};
pub use dispatcher::{DispatchReport, FanoutDispatcher, FanoutSettings, Trigger};
pub use listener::ChangeListener;
pub use poller::{BackupPoller, PollerSettings};
