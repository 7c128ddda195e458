use crate::commands::tickets::close_button;
use crate::reply;
use crate::services::tickets;
use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use tracing::{info, warn};

/// Posts a notice in every open ticket opened by a member who just left.
pub async fn handle_member_removal(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: serenity::GuildId,
    user: &serenity::User,
) -> Result<(), Error> {
    let settings = &data.community().tickets;
    let Some(parent) = settings.category.map(serenity::ChannelId::new) else {
        return Ok(());
    };

    let channels = guild_id.channels(ctx).await?;
    let affected = channels.values().filter(|c| {
        c.parent_id == Some(parent)
            && c.kind == serenity::ChannelType::Text
            && c.topic
                .as_deref()
                .is_some_and(|t| tickets::opened_by(t, user.id.get()))
    });

    for channel in affected {
        let embed = reply::embed(data.community().embeds.main).description(tickets::fill_user(
            &settings.messages.creator_left,
            &user.to_string(),
        ));
        match channel
            .id
            .send_message(
                ctx,
                serenity::CreateMessage::new()
                    .embed(embed)
                    .components(vec![close_button()]),
            )
            .await
        {
            Ok(_) => info!("Notified ticket {} that {} left", channel.id, user.name),
            Err(e) => warn!("Failed to notify ticket {}: {}", channel.id, e),
        }
    }
    Ok(())
}
