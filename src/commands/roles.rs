use crate::handlers::components::ComponentRoute;
use crate::reply;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

/// Create a role selection panel
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn roles(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let community = ctx.data().community();
    let selectors = &community.role_selectors;
    if selectors.is_empty() {
        ctx.say("❌ No roles are configured for the selection panel.")
            .await?;
        return Ok(());
    }

    let mut embed = reply::embed(community.embeds.main)
        .title("Role Selection")
        .description("Click the buttons below to get or remove roles!");
    for selector in selectors {
        let name = match &selector.emoji {
            Some(emoji) => format!("{} {}", emoji, selector.label),
            None => selector.label.clone(),
        };
        let value = if selector.description.is_empty() {
            format!("<@&{}>", selector.role_id)
        } else {
            selector.description.clone()
        };
        embed = embed.field(name, value, false);
    }

    // Discord allows five buttons per row and five rows per message
    let buttons: Vec<serenity::CreateButton> = selectors
        .iter()
        .take(25)
        .map(|selector| {
            let mut button =
                serenity::CreateButton::new(ComponentRoute::ToggleRole(selector.id.clone()).custom_id())
                    .label(&selector.label)
                    .style(serenity::ButtonStyle::Secondary);
            if let Some(emoji) = selector
                .emoji
                .as_deref()
                .and_then(|e| serenity::ReactionType::try_from(e).ok())
            {
                button = button.emoji(emoji);
            }
            button
        })
        .collect();
    let rows = buttons
        .chunks(5)
        .map(|chunk| serenity::CreateActionRow::Buttons(chunk.to_vec()))
        .collect();

    ctx.channel_id()
        .send_message(
            ctx.serenity_context(),
            serenity::CreateMessage::new().embed(embed).components(rows),
        )
        .await?;
    info!("{} posted the role selection panel", ctx.author().name);

    ctx.say("✅ Role selection panel has been created!").await?;
    Ok(())
}
