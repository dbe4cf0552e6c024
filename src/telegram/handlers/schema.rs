//! Dispatcher schema and handler chain builders

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;

use super::types::{callback_event, sender_id, text_event, HandlerDeps, HandlerError};
use crate::telegram::bot::Command;

/// Creates the dispatcher schema for the guide bot.
///
/// Commands are matched first; any other private message (including unknown
/// `/commands`) goes to the text handler. Errors are logged here and swallowed so
/// one failed update never stops the dispatcher.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_messages = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        .branch(command_handler(deps_commands))
        .branch(message_handler(deps_messages))
        .branch(callback_handler(deps_callback))
}

fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.chat.is_private())
        .branch(dptree::entry().filter_command::<Command>().endpoint(
            move |msg: Message, cmd: Command| {
                let deps = deps.clone();
                async move {
                    let user_id = sender_id(&msg);
                    log::info!("Received command {:?} from {}", cmd, user_id);

                    if let Err(e) = deps.interaction.on_command(user_id, msg.chat.id.0, cmd).await {
                        log::error!("Command from {} failed: {}", user_id, e);
                    }
                    Ok(())
                }
            },
        ))
}

fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.chat.is_private())
        .endpoint(move |msg: Message| {
            let deps = deps.clone();
            async move {
                let event = text_event(&msg);
                let user_id = event.user_id;
                if let Err(e) = deps.interaction.on_text(event).await {
                    log::error!("Message from {} failed: {}", user_id, e);
                }
                Ok(())
            }
        })
}

fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            let event = callback_event(&q);
            let user_id = event.user_id;
            if let Err(e) = deps.interaction.on_callback(event).await {
                log::error!("Callback from {} failed: {}", user_id, e);
            }
            Ok(())
        }
    })
}
