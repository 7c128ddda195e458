//! Gateway events that are not slash commands: passive points, anti-link,
//! message logs, persistent buttons, reaction votes/roles and member departures.

pub mod components;
pub mod members;
pub mod message_log;
pub mod messages;
pub mod reactions;

use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use tracing::error;

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    let result = match event {
        serenity::FullEvent::Message { new_message } => {
            messages::handle_message(ctx, data, new_message).await
        }
        serenity::FullEvent::MessageUpdate { event, .. } => {
            message_log::handle_message_update(ctx, data, event).await
        }
        serenity::FullEvent::MessageDelete {
            channel_id,
            deleted_message_id,
            guild_id,
        } => {
            message_log::handle_message_delete(ctx, data, *channel_id, *deleted_message_id, *guild_id)
                .await
        }
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } => components::handle_component(ctx, data, component).await,
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            reactions::handle_reaction_add(ctx, data, add_reaction).await
        }
        serenity::FullEvent::ReactionRemove { removed_reaction } => {
            reactions::handle_reaction_remove(ctx, data, removed_reaction).await
        }
        serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            members::handle_member_removal(ctx, data, *guild_id, user).await
        }
        _ => Ok(()),
    };

    // Event errors are logged, never returned to the framework
    if let Err(e) = result {
        error!("Error handling {}: {:?}", event.snake_case_name(), e);
    }
    Ok(())
}
