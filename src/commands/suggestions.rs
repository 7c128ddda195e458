use crate::config::{EMBED_FIELD_LIMIT, EMBED_TITLE_LIMIT};
use crate::db::{NewSuggestion, SuggestionStatus};
use crate::reply;
use crate::services::suggestions::{SuggestionError, SuggestionService};
use crate::{ApplicationContext, Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use poise::Modal as _;
use tracing::{info, warn};

#[derive(Debug, poise::Modal)]
#[name = "Submit a Suggestion"]
struct SuggestionModal {
    #[name = "Title"]
    #[placeholder = "A short summary of your idea"]
    #[min_length = 1]
    #[max_length = 100]
    title: String,
    #[name = "Suggestion"]
    #[placeholder = "Describe your suggestion in detail"]
    #[paragraph]
    #[min_length = 1]
    #[max_length = 1000]
    content: String,
}

/// Submit a suggestion for the community
#[poise::command(slash_command, guild_only)]
pub async fn suggestion(ctx: ApplicationContext<'_>) -> Result<(), Error> {
    let pctx = Context::Application(ctx);
    let settings = &pctx.data().community().suggestions;
    let Some(channel_id) = settings.channel.map(serenity::ChannelId::new) else {
        reply::ephemeral(pctx, "❌ Suggestions are not set up on this server.").await?;
        return Ok(());
    };
    let guild_id = pctx.guild_id().ok_or("Must be run in a guild")?;

    let Some(form) = SuggestionModal::execute(ctx).await? else {
        return Ok(());
    };
    let author = pctx.author();
    let http = pctx.serenity_context();

    let embed = reply::embed(pctx.data().community().embeds.main)
        .author(serenity::CreateEmbedAuthor::new("New Suggestion").icon_url(author.face()))
        .title(reply::truncate(&form.title, EMBED_TITLE_LIMIT))
        .description(&form.content)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Suggestion by {}",
            author.tag()
        )));
    let mut message = serenity::CreateMessage::new().embed(embed);
    if let Some(role) = settings.ping_role {
        message = message
            .content(format!("<@&{}>", role))
            .allowed_mentions(serenity::CreateAllowedMentions::new().roles(vec![role]));
    }
    let posted = channel_id.send_message(http, message).await?;

    let thread_name = format!("Discussion: {}", form.title.chars().take(50).collect::<String>());
    let thread = channel_id
        .create_thread_from_message(
            http,
            posted.id,
            serenity::CreateThread::new(thread_name)
                .auto_archive_duration(serenity::AutoArchiveDuration::OneDay),
        )
        .await?;

    for emoji in [&settings.upvote_emoji, &settings.downvote_emoji] {
        match serenity::ReactionType::try_from(emoji.as_str()) {
            Ok(reaction) => {
                if let Err(e) = posted.react(http, reaction).await {
                    warn!("Failed to add vote reaction {}: {}", emoji, e);
                }
            }
            Err(_) => warn!("Invalid vote emoji in config: {}", emoji),
        }
    }

    let id = SuggestionService::new(pctx.data().db.clone())
        .create(NewSuggestion {
            message_id: posted.id.get(),
            thread_id: thread.id.get(),
            user_id: author.id.get(),
            guild_id: guild_id.get(),
            title: form.title,
            content: form.content,
            created_at: Utc::now(),
        })
        .await?;
    info!("{} submitted suggestion {}", author.name, id);

    reply::ephemeral(pctx, "✅ Your suggestion has been submitted successfully!").await
}

/// Accept a suggestion (use inside its thread)
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_MESSAGES"
)]
pub async fn accept(
    ctx: Context<'_>,
    #[description = "Reason for accepting the suggestion"] reason: Option<String>,
) -> Result<(), Error> {
    resolve(ctx, SuggestionStatus::Accepted, reason).await
}

/// Deny a suggestion (use inside its thread)
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_MESSAGES"
)]
pub async fn deny(
    ctx: Context<'_>,
    #[description = "Reason for denying the suggestion"] reason: Option<String>,
) -> Result<(), Error> {
    resolve(ctx, SuggestionStatus::Denied, reason).await
}

async fn resolve(
    ctx: Context<'_>,
    status: SuggestionStatus,
    reason: Option<String>,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;

    let community = ctx.data().community();
    let service = SuggestionService::new(ctx.data().db.clone());
    let thread_id = ctx.channel_id();

    let suggestion = match service.pending_in_thread(thread_id.get()).await {
        Ok(suggestion) => suggestion,
        Err(SuggestionError::Storage(e)) => return Err(e.into()),
        Err(e) => {
            ctx.say(format!("❌ {}", e)).await?;
            return Ok(());
        }
    };
    if let Err(e) = service.resolve(&suggestion, status).await {
        ctx.say(format!("❌ {}", e)).await?;
        return Ok(());
    }

    let reason = reason.unwrap_or_else(|| "No reason provided".to_string());
    let (verb, color, icon, tag) = match status {
        SuggestionStatus::Accepted => (
            "Accepted",
            community.embeds.accepted,
            "✅",
            community.suggestions.accepted_tag,
        ),
        _ => (
            "Denied",
            community.embeds.denied,
            "❌",
            community.suggestions.denied_tag,
        ),
    };
    let http = ctx.serenity_context();
    let moderator = ctx.author();

    // The thread hangs off the original suggestion message
    let parent = match ctx.guild_channel().await.and_then(|c| c.parent_id) {
        Some(parent) => Some(parent),
        None => community.suggestions.channel.map(serenity::ChannelId::new),
    };
    if let Some(parent) = parent {
        match parent
            .message(http, serenity::MessageId::new(suggestion.message_id))
            .await
        {
            Ok(mut original) => {
                let base = original
                    .embeds
                    .first()
                    .cloned()
                    .map(serenity::CreateEmbed::from)
                    .unwrap_or_else(|| {
                        serenity::CreateEmbed::new()
                            .title(suggestion.title.clone())
                            .description(suggestion.content.clone())
                    });
                let updated = base.color(color).field(
                    "Status",
                    reply::truncate(
                        &format!("{} {} by {}\nReason: {}", icon, verb, moderator, reason),
                        EMBED_FIELD_LIMIT,
                    ),
                    false,
                );
                if let Err(e) = original
                    .edit(http, serenity::EditMessage::new().embed(updated))
                    .await
                {
                    warn!("Failed to update suggestion {}: {}", suggestion.id, e);
                }
            }
            Err(e) => warn!("Suggestion message {} not found: {}", suggestion.message_id, e),
        }
    }

    let dm = reply::embed(color)
        .title(format!("Suggestion {}!", verb))
        .description(format!("Your suggestion has been {}.", verb.to_lowercase()))
        .field("Suggestion", reply::truncate(&suggestion.content, EMBED_FIELD_LIMIT), false)
        .field(format!("{} By", verb), moderator.to_string(), true)
        .field("Reason", reply::truncate(&reason, EMBED_FIELD_LIMIT), false);
    reply::dm_best_effort(&http.http, serenity::UserId::new(suggestion.user_id), dm).await;

    ctx.say(format!("✅ Suggestion {} successfully!", verb.to_lowercase()))
        .await?;
    info!("{} {} suggestion {}", moderator.name, verb.to_lowercase(), suggestion.id);

    if let Some(tag) = tag {
        if let Err(e) = thread_id
            .edit_thread(
                http,
                serenity::EditThread::new().applied_tags([serenity::ForumTagId::new(tag)]),
            )
            .await
        {
            warn!("Failed to tag suggestion thread {}: {}", thread_id, e);
        }
    }
    thread_id
        .edit_thread(http, serenity::EditThread::new().locked(true).archived(true))
        .await?;
    Ok(())
}
