//! Update routing: teloxide updates in, `Interaction` calls out

mod schema;
mod types;

pub use schema::schema;
pub use types::{callback_event, text_event, HandlerDeps, HandlerError};
