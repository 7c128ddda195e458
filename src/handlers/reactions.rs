use crate::reply;
use crate::services::suggestions::{SuggestionService, Vote};
use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use tracing::{debug, info};

/// The text config files use to name an emoji: the character itself, or a
/// custom emoji's name.
pub fn emoji_key(emoji: &serenity::ReactionType) -> String {
    match emoji {
        serenity::ReactionType::Unicode(s) => s.clone(),
        serenity::ReactionType::Custom { name, .. } => name.clone().unwrap_or_default(),
        _ => String::new(),
    }
}

/// Applies a vote if the message is a suggestion; true when it was one.
async fn record_vote(
    data: &Data,
    reaction: &serenity::Reaction,
    added: bool,
) -> Result<bool, Error> {
    let settings = &data.community().suggestions;
    let Some(vote) = Vote::from_emoji(
        &emoji_key(&reaction.emoji),
        &settings.upvote_emoji,
        &settings.downvote_emoji,
    ) else {
        return Ok(false);
    };
    let counted = SuggestionService::new(data.db.clone())
        .record_vote(reaction.message_id.get(), vote, added)
        .await?;
    if counted {
        debug!("Vote {:?} ({}) on suggestion {}", vote, added, reaction.message_id);
    }
    Ok(counted)
}

fn role_name(ctx: &serenity::Context, guild_id: serenity::GuildId, role_id: u64) -> String {
    ctx.cache
        .guild(guild_id)
        .and_then(|g| {
            g.roles
                .get(&serenity::RoleId::new(role_id))
                .map(|r| r.name.clone())
        })
        .unwrap_or_else(|| format!("<@&{}>", role_id))
}

pub async fn handle_reaction_add(
    ctx: &serenity::Context,
    data: &Data,
    reaction: &serenity::Reaction,
) -> Result<(), Error> {
    let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
        return Ok(());
    };
    if user_id == ctx.cache.current_user().id {
        return Ok(());
    }
    let user = user_id.to_user(ctx).await?;
    if user.bot {
        return Ok(());
    }

    if record_vote(data, reaction, true).await? {
        return Ok(());
    }

    let settings = &data.community().reaction_roles;
    let message = reaction.message(ctx).await?;
    let is_panel = message
        .embeds
        .first()
        .and_then(|e| e.title.as_deref())
        .is_some_and(|title| title == settings.embed_title);
    if !is_panel {
        return Ok(());
    }

    // Panel reactions act as buttons and never accumulate
    reaction.delete(ctx).await?;

    let emoji = emoji_key(&reaction.emoji);
    let Some(role_id) = settings.role_for_emoji(&emoji) else {
        debug!("No reaction role mapped to {}", emoji);
        return Ok(());
    };
    ctx.http
        .add_member_role(
            guild_id,
            user_id,
            serenity::RoleId::new(role_id),
            Some("Reaction role"),
        )
        .await?;

    let community = data.community();
    let name = role_name(ctx, guild_id, role_id);
    let guild_name = ctx
        .cache
        .guild(guild_id)
        .map(|g| g.name.clone())
        .unwrap_or_else(|| "the server".to_string());
    info!("Added reaction role {} to {}", name, user.name);

    let dm = reply::embed(community.embeds.accepted).description(format!(
        "✅ Role **{}** has been added to you in {}!",
        name, guild_name
    ));
    reply::dm_best_effort(&ctx.http, user_id, dm).await;

    let log = reply::embed(community.embeds.accepted)
        .title("Reaction Role Added")
        .field("User", format!("<@{}>", user_id), true)
        .field("Role", name, true)
        .field("Emoji", emoji, true);
    reply::send_log(&ctx.http, community.channels.logging, log).await;
    Ok(())
}

pub async fn handle_reaction_remove(
    ctx: &serenity::Context,
    data: &Data,
    reaction: &serenity::Reaction,
) -> Result<(), Error> {
    let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
        return Ok(());
    };
    if user_id == ctx.cache.current_user().id {
        return Ok(());
    }

    if record_vote(data, reaction, false).await? {
        return Ok(());
    }

    let settings = &data.community().reaction_roles;
    if !settings.message_ids.contains(&reaction.message_id.get()) {
        return Ok(());
    }
    let Some(role_id) = settings.role_for_emoji(&emoji_key(&reaction.emoji)) else {
        return Ok(());
    };
    ctx.http
        .remove_member_role(
            guild_id,
            user_id,
            serenity::RoleId::new(role_id),
            Some("Reaction role removed"),
        )
        .await?;
    info!(
        "Removed reaction role {} from {}",
        role_name(ctx, guild_id, role_id),
        user_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emoji_key() {
        let unicode = serenity::ReactionType::Unicode("👍".to_string());
        assert_eq!(emoji_key(&unicode), "👍");

        let custom = serenity::ReactionType::Custom {
            animated: false,
            id: serenity::EmojiId::new(1),
            name: Some("upvote".to_string()),
        };
        assert_eq!(emoji_key(&custom), "upvote");
    }
}
