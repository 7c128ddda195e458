use crate::community::LinkAction;
use crate::economy;
use crate::handlers::message_log;
use crate::reply;
use crate::services::moderation::{self, ModerationService};
use crate::services::points::PointsService;
use crate::{Data, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const LINK_REASON: &str = "Unauthorized Link";
const LINK_MODERATOR: &str = "anti-link";

pub async fn handle_message(
    ctx: &serenity::Context,
    data: &Data,
    message: &serenity::Message,
) -> Result<(), Error> {
    if message.author.bot {
        return Ok(());
    }
    let Some(guild_id) = message.guild_id else {
        return Ok(());
    };
    data.messages
        .insert(message.id.get(), message_log::cached(message));

    let channel_id = message.channel_id.get();
    if data.tickets.has_alert(channel_id) {
        if let Err(e) = data.tickets.withdraw_alert(channel_id).await {
            warn!("Failed to withdraw alert in ticket {}: {:?}", channel_id, e);
        }
    }

    let role_ids: Vec<u64> = message
        .member
        .as_ref()
        .map(|m| m.roles.iter().map(|r| r.get()).collect())
        .unwrap_or_default();
    if let Some(url) = data
        .link_filter
        .check(&message.content, message.channel_id.get(), &role_ids)
    {
        return enforce_link_policy(ctx, data, message, guild_id, &url).await;
    }

    award_message_point(data, guild_id.get(), message.author.id.get()).await
}

async fn award_message_point(data: &Data, guild_id: u64, user_id: u64) -> Result<(), Error> {
    let now = Instant::now();
    if !data.cooldowns.is_ready(guild_id, user_id, now) {
        return Ok(());
    }
    let earned = {
        let mut rng = rand::thread_rng();
        economy::message_earns_point(&data.community().points, &mut rng)
    };
    if !earned {
        return Ok(());
    }

    let balance = PointsService::new(data.db.clone(), data.community().points.clone())
        .award_message_point(user_id, guild_id)
        .await?;
    data.cooldowns.record(guild_id, user_id, now);
    debug!("{} earned a message point ({})", user_id, balance);
    Ok(())
}

async fn enforce_link_policy(
    ctx: &serenity::Context,
    data: &Data,
    message: &serenity::Message,
    guild_id: serenity::GuildId,
    url: &str,
) -> Result<(), Error> {
    let community = data.community();
    let action = data.link_filter.action();
    let user = &message.author;
    info!("Blocked link from {} in {}: {}", user.id, message.channel_id, url);

    message.delete(ctx).await?;

    let action_taken = match action {
        LinkAction::Delete => "Message deleted",
        LinkAction::Warn => "Message deleted, warning issued",
        LinkAction::Mute => "Message deleted, user muted",
    };
    let log = reply::embed(community.embeds.denied)
        .title("Blocked Link Detected")
        .description(format!(
            "User {} ({}) attempted to send a blocked link",
            user.tag(),
            user.id
        ))
        .field("Channel", format!("<#{}>", message.channel_id), false)
        .field(
            "Message Content",
            reply::truncate(&message.content, crate::config::EMBED_FIELD_LIMIT),
            false,
        )
        .field("Action Taken", action_taken, false);
    reply::send_log(&ctx.http, community.channels.anti_link_log, log).await;

    let service = ModerationService::new(data.db.clone(), community.moderation.clone());
    let now = Utc::now();
    service
        .record_link(
            user.id.get(),
            guild_id.get(),
            message.channel_id.get(),
            &message.content,
            now,
        )
        .await?;

    let reason_detail = format!(
        "{} - Your message was deleted because it contained a blocked link",
        LINK_REASON
    );
    match action {
        LinkAction::Delete => {}
        LinkAction::Warn => {
            service
                .warn(user.id.get(), guild_id.get(), LINK_MODERATOR, LINK_REASON, now)
                .await?;
            let dm = reply::embed(community.embeds.denied)
                .title("⚠️ Warning Received")
                .description("You have received a warning for posting a blocked link")
                .field("Reason", &reason_detail, false)
                .field("Channel", format!("<#{}>", message.channel_id), false)
                .field(
                    "Warning Expiration",
                    format!("{} days", community.moderation.warning_expiration_days),
                    false,
                );
            reply::dm_best_effort(&ctx.http, user.id, dm).await;
        }
        LinkAction::Mute => {
            let duration = moderation::configured_mute(community.moderation.default_mute_hours);
            let record = moderation::new_mute(
                guild_id.get(),
                user.id.get(),
                ctx.cache.current_user().id.get(),
                LINK_REASON,
                duration,
                now,
            );
            if let Err(e) = data.mutes.mute(record).await {
                error!("Anti-link mute for {} failed: {:?}", user.id, e);
                return Ok(());
            }
            let dm = reply::embed(community.embeds.denied)
                .title("🔇 You have been muted")
                .description("You have been muted for posting a blocked link")
                .field("Reason", &reason_detail, false)
                .field("Channel", format!("<#{}>", message.channel_id), false)
                .field("Duration", moderation::format_duration(duration), false);
            reply::dm_best_effort(&ctx.http, user.id, dm).await;
        }
    }
    Ok(())
}
