use crate::commands::{is_staff, pick_reason};
use crate::config::EMBED_FIELD_LIMIT;
use crate::jobs::Unmuted;
use crate::reply;
use crate::services::moderation::{self, ModerationService};
use crate::{Context, Error};
use chrono::{Duration, Utc};
use poise::serenity_prelude as serenity;
use tracing::{error, info};

fn service(ctx: Context<'_>) -> ModerationService {
    ModerationService::new(ctx.data().db.clone(), ctx.data().community().moderation.clone())
}

fn code_block(text: &str) -> String {
    reply::truncate(&format!("```\n{}\n```", text), EMBED_FIELD_LIMIT)
}

fn timestamp(at: chrono::DateTime<Utc>) -> String {
    format!("<t:{}:F>", at.timestamp())
}

/// Rejects targets that can't sensibly be moderated.
async fn check_target(ctx: Context<'_>, user: &serenity::User) -> Result<bool, Error> {
    let message = if user.id == ctx.author().id {
        "❌ You cannot moderate yourself."
    } else if user.id == ctx.framework().bot_id {
        "❌ I cannot moderate myself."
    } else {
        return Ok(true);
    };
    reply::ephemeral(ctx, message).await?;
    Ok(false)
}

/// Warn a user for breaking server rules
#[poise::command(slash_command, guild_only, check = "is_staff")]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "The user to warn"] user: serenity::User,
) -> Result<(), Error> {
    issue_warning(ctx, user, None).await
}

#[poise::command(context_menu_command = "Warn User", guild_only, check = "is_staff")]
pub async fn warn_user(ctx: Context<'_>, user: serenity::User) -> Result<(), Error> {
    issue_warning(ctx, user, None).await
}

#[poise::command(
    context_menu_command = "Warn Message Author",
    guild_only,
    check = "is_staff"
)]
pub async fn warn_message(ctx: Context<'_>, message: serenity::Message) -> Result<(), Error> {
    issue_warning(ctx, message.author.clone(), Some(message.content)).await
}

async fn issue_warning(
    ctx: Context<'_>,
    user: serenity::User,
    message: Option<String>,
) -> Result<(), Error> {
    if !check_target(ctx, &user).await? {
        return Ok(());
    }
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let community = ctx.data().community();
    let settings = &community.moderation;
    let service = service(ctx);

    let current = service
        .active_warnings(user.id.get(), guild_id.get(), Utc::now())
        .await?
        .len();
    let confirm = reply::embed(community.embeds.warning)
        .title("Warning Confirmation")
        .description(format!("You are about to warn **{}**", user.tag()))
        .field("User ID", user.id.to_string(), true)
        .field(
            "Current Warnings",
            format!("{}/{}", current, settings.max_warnings),
            true,
        )
        .field(
            "Warning Expiration",
            format!("{} days", settings.warning_expiration_days),
            true,
        );

    let Some(picked) = pick_reason(
        ctx,
        confirm,
        &settings.warning_reasons,
        "Select a reason for the warning",
    )
    .await?
    else {
        return Ok(());
    };
    picked.answer.defer(ctx.serenity_context()).await?;

    let now = Utc::now();
    let outcome = service
        .warn(
            user.id.get(),
            guild_id.get(),
            &ctx.author().id.to_string(),
            &picked.title,
            now,
        )
        .await?;
    let expires = now + Duration::days(settings.warning_expiration_days);
    let reason_text = picked.full_text();

    let dm = reply::embed(community.embeds.denied)
        .title(format!("You got a warning in {}", guild_name(ctx)))
        .description(format!(
            "Warned By: {}\nReason:\n{}\nDate: {}\nExpire: {}",
            ctx.author(),
            code_block(&reason_text),
            timestamp(now),
            timestamp(expires)
        ));
    reply::dm_best_effort(&ctx.serenity_context().http, user.id, dm).await;

    let mut log = reply::embed(community.embeds.denied)
        .title("Warning Issued")
        .field("Warning given to:", format!("{} ({})", user, user.name), false)
        .field("Given by:", ctx.author().to_string(), false)
        .field(
            "Warnings",
            format!("{}/{}", outcome.active_count, settings.max_warnings),
            false,
        )
        .field("Date Given", timestamp(now), false)
        .field("Expire", timestamp(expires), false)
        .field("Reason", code_block(&reason_text), false);
    if let Some(content) = &message {
        log = log.field("Message", code_block(content), false);
    }

    if outcome.auto_mute {
        let duration = service.auto_mute_duration();
        let reason = format!(
            "Automatic mute after reaching {} warnings",
            settings.max_warnings
        );
        let record = moderation::new_mute(
            guild_id.get(),
            user.id.get(),
            ctx.framework().bot_id.get(),
            &reason,
            duration,
            now,
        );
        match ctx.data().mutes.mute(record).await {
            Ok(()) => {
                log = log.field(
                    "🔇 Auto-Mute Applied",
                    format!(
                        "User has been muted for {} after reaching {} warnings",
                        moderation::format_duration(duration),
                        settings.max_warnings
                    ),
                    false,
                );
                let mute_dm = reply::embed(community.embeds.denied)
                    .title("🔇 You have been muted")
                    .description(format!(
                        "You have been automatically muted in {} for reaching {} warnings",
                        guild_name(ctx),
                        settings.max_warnings
                    ))
                    .field("Duration", moderation::format_duration(duration), true);
                reply::dm_best_effort(&ctx.serenity_context().http, user.id, mute_dm).await;
            }
            Err(e) => {
                error!("Auto-mute for {} failed: {:?}", user.id, e);
                log = log.field(
                    "❌ Auto-Mute Failed",
                    "Failed to apply automatic mute. Please mute user manually.",
                    false,
                );
            }
        }
    }
    reply::send_log(
        &ctx.serenity_context().http,
        community.channels.warnings_log,
        log,
    )
    .await;

    let reason_display = match &picked.emoji {
        Some(emoji) => format!("{} {}", emoji, reason_text),
        None => reason_text,
    };
    let confirmation = reply::embed(community.embeds.accepted)
        .title("Warning Issued")
        .description(format!("{} has been warned", user.tag()))
        .field("Reason", reply::truncate(&reason_display, EMBED_FIELD_LIMIT), false)
        .field("Warned by", ctx.author().tag(), true)
        .field(
            "Warning Expiration",
            format!("{} days", settings.warning_expiration_days),
            true,
        );
    info!("{} warned {} ({})", ctx.author().name, user.id, picked.title);
    picked.answer.finish(ctx.serenity_context(), "", Some(confirmation)).await
}

fn guild_name(ctx: Context<'_>) -> String {
    ctx.guild()
        .map(|g| g.name.clone())
        .unwrap_or_else(|| "the server".to_string())
}

/// Mute a user
#[poise::command(slash_command, guild_only, check = "is_staff")]
pub async fn mute(
    ctx: Context<'_>,
    #[description = "The user to mute"] user: serenity::User,
    #[description = "How long, e.g. 2h, 90m or 1day (a plain number means hours)"]
    duration: Option<String>,
) -> Result<(), Error> {
    let duration = match duration {
        Some(input) => match moderation::parse_mute_duration(&input) {
            Ok(duration) => duration,
            Err(e) => {
                reply::ephemeral(ctx, format!("❌ {}", e)).await?;
                return Ok(());
            }
        },
        None => default_mute_duration(ctx),
    };
    apply_mute(ctx, user, duration, None).await
}

#[poise::command(context_menu_command = "Mute User", guild_only, check = "is_staff")]
pub async fn mute_message(ctx: Context<'_>, message: serenity::Message) -> Result<(), Error> {
    let duration = default_mute_duration(ctx);
    apply_mute(ctx, message.author.clone(), duration, Some(message.content)).await
}

fn default_mute_duration(ctx: Context<'_>) -> Duration {
    moderation::configured_mute(ctx.data().community().moderation.default_mute_hours)
}

async fn apply_mute(
    ctx: Context<'_>,
    user: serenity::User,
    duration: Duration,
    message: Option<String>,
) -> Result<(), Error> {
    if !check_target(ctx, &user).await? {
        return Ok(());
    }
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let community = ctx.data().community();
    let shown = moderation::format_duration(duration);

    let confirm = reply::embed(community.embeds.warning)
        .title("Mute Confirmation")
        .description(format!("You are about to mute {} ({})", user.tag(), user.id))
        .field("Duration", &shown, true);
    let Some(picked) = pick_reason(
        ctx,
        confirm,
        &community.moderation.mute_reasons,
        "Select a reason for the mute",
    )
    .await?
    else {
        return Ok(());
    };
    picked.answer.defer(ctx.serenity_context()).await?;

    let now = Utc::now();
    let record = moderation::new_mute(
        guild_id.get(),
        user.id.get(),
        ctx.author().id.get(),
        &picked.title,
        duration,
        now,
    );
    let expires = record.expires_at;
    if let Err(e) = ctx.data().mutes.mute(record).await {
        error!("Muting {} failed: {:?}", user.id, e);
        return picked
            .answer
            .finish(ctx.serenity_context(), "❌ There was an error muting the user. Please try again.", None)
            .await;
    }

    let mut log = reply::embed(community.embeds.warning)
        .title("User Muted")
        .thumbnail(user.face())
        .field("User muted:", format!("{} ({})", user, user.name), false)
        .field("Muted by:", ctx.author().to_string(), false)
        .field("Duration", &shown, true)
        .field("Date", timestamp(now), true)
        .field("Expire", timestamp(expires), true)
        .field("Reason", code_block(&picked.title), false);
    if let Some(content) = &message {
        log = log.field("Message Content", code_block(content), false);
    }
    reply::send_log(&ctx.serenity_context().http, community.channels.mute_log, log).await;

    let dm = reply::embed(community.embeds.warning)
        .title("You have been muted")
        .description(format!("You have been muted in {}", guild_name(ctx)))
        .field("Reason", reply::truncate(&picked.title, EMBED_FIELD_LIMIT), false)
        .field("Duration", &shown, false)
        .field("Muted by", ctx.author().tag(), false);
    reply::dm_best_effort(&ctx.serenity_context().http, user.id, dm).await;

    info!("{} muted {} for {}", ctx.author().name, user.id, shown);
    picked
        .answer
        .finish(
            ctx.serenity_context(),
            format!("✅ Successfully muted {} for {}", user.tag(), shown),
            None,
        )
        .await
}

/// Unmute a user
#[poise::command(slash_command, guild_only, check = "is_staff")]
pub async fn unmute(
    ctx: Context<'_>,
    #[description = "The user to unmute"] user: serenity::User,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let community = ctx.data().community();

    let recorded = ctx.data().mutes.is_muted(guild_id.get(), user.id.get()).await?;
    let timed_out = match guild_id.member(ctx.serenity_context(), user.id).await {
        Ok(member) => {
            let now = serenity::Timestamp::now();
            let has_role = community
                .roles
                .mute
                .is_some_and(|role| member.roles.contains(&serenity::RoleId::new(role)));
            member
                .communication_disabled_until
                .is_some_and(|until| until > now)
                || has_role
        }
        Err(_) => false,
    };
    if !recorded && !timed_out {
        ctx.say(format!("❌ {} is not currently muted or timed out.", user.tag()))
            .await?;
        return Ok(());
    }

    let reason = format!("Manually unmuted by {}", ctx.author().tag());
    match ctx
        .data()
        .mutes
        .unmute(guild_id.get(), user.id.get(), &reason)
        .await?
    {
        Unmuted::MemberGone => {
            ctx.say("⚠️ That user could not be found in this server. Their mute has been cleared from the database.")
                .await?;
            return Ok(());
        }
        Unmuted::Lifted => {}
    }

    let log = reply::embed(community.embeds.accepted)
        .title("User Unmuted (Manual)")
        .thumbnail(user.face())
        .description(format!("{} has been manually unmuted.", user))
        .field("Unmuted by", ctx.author().to_string(), false)
        .field("Timestamp", timestamp(Utc::now()), false);
    reply::send_log(&ctx.serenity_context().http, community.channels.mute_log, log).await;

    let dm = reply::embed(community.embeds.accepted)
        .title("You have been unmuted")
        .description(format!(
            "You have been manually unmuted in {} by a staff member.",
            guild_name(ctx)
        ));
    reply::dm_best_effort(&ctx.serenity_context().http, user.id, dm).await;

    info!("{} unmuted {}", ctx.author().name, user.id);
    ctx.say(format!("✅ Successfully unmuted {}", user.tag())).await?;
    Ok(())
}

/// Ban a user from the server
#[poise::command(slash_command, guild_only, check = "is_staff")]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "The user to ban"] user: serenity::User,
) -> Result<(), Error> {
    apply_ban(ctx, user, None).await
}

#[poise::command(context_menu_command = "Ban User", guild_only, check = "is_staff")]
pub async fn ban_message(ctx: Context<'_>, message: serenity::Message) -> Result<(), Error> {
    apply_ban(ctx, message.author.clone(), Some(message.content)).await
}

async fn apply_ban(
    ctx: Context<'_>,
    user: serenity::User,
    message: Option<String>,
) -> Result<(), Error> {
    if !check_target(ctx, &user).await? {
        return Ok(());
    }
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let community = ctx.data().community();
    let service = service(ctx);

    let warnings = service
        .active_warnings(user.id.get(), guild_id.get(), Utc::now())
        .await?
        .len();
    let previous = service.previous_bans(user.id.get(), guild_id.get()).await?;
    let confirm = reply::embed(community.embeds.denied)
        .title("Ban Confirmation")
        .description(format!("You are about to ban {} ({})", user.tag(), user.id))
        .field("Current Warnings", warnings.to_string(), true)
        .field("Previous Bans", previous.to_string(), true);

    let Some(picked) = pick_reason(
        ctx,
        confirm,
        &community.moderation.ban_reasons,
        "Select a reason for the ban",
    )
    .await?
    else {
        return Ok(());
    };
    picked.answer.defer(ctx.serenity_context()).await?;

    if let Err(e) = guild_id
        .ban_with_reason(ctx.serenity_context(), user.id, 0, &picked.title)
        .await
    {
        error!("Banning {} failed: {}", user.id, e);
        return picked
            .answer
            .finish(ctx.serenity_context(), "❌ There was an error banning the user. Please try again.", None)
            .await;
    }

    let now = Utc::now();
    service
        .record_ban(
            user.id.get(),
            guild_id.get(),
            ctx.author().id.get(),
            &picked.title,
            now,
        )
        .await?;

    let mut log = reply::embed(community.embeds.denied)
        .title("User Banned")
        .field("User banned:", format!("{} ({})", user, user.tag()), false)
        .field("Banned by:", ctx.author().to_string(), false)
        .field("Reason", reply::truncate(&picked.full_text(), EMBED_FIELD_LIMIT), false)
        .field("Timestamp", timestamp(now), false);
    if let Some(content) = &message {
        log = log.field("Message Content", code_block(content), false);
    }
    reply::send_log(&ctx.serenity_context().http, community.channels.ban_log, log).await;

    info!("{} banned {} ({})", ctx.author().name, user.id, picked.title);
    picked
        .answer
        .finish(ctx.serenity_context(), format!("✅ Successfully banned {}", user.tag()), None)
        .await
}
