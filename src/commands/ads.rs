use crate::handlers::components::ComponentRoute;
use crate::db::{AdStatus, NewAd};
use crate::reply;
use crate::services::ads::{self, AdRejection, AdService};
use crate::{ApplicationContext, Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use poise::Modal as _;
use tracing::{info, warn};

#[derive(Debug, poise::Modal)]
#[name = "Create Advertisement"]
struct AdModal {
    #[name = "Community Name"]
    #[placeholder = "Your realm/server name"]
    #[min_length = 1]
    #[max_length = 100]
    community: String,
    #[name = "Description"]
    #[placeholder = "Describe your community (no IPs or invite links)"]
    #[paragraph]
    #[min_length = 10]
    #[max_length = 4000]
    description: String,
    #[name = "How to Join"]
    #[placeholder = "Explain how to join (no invite links or IPs)"]
    #[paragraph]
    #[min_length = 5]
    #[max_length = 200]
    how_to_join: String,
}

fn service(ctx: Context<'_>) -> AdService {
    AdService::new(ctx.data().db.clone(), ctx.data().community().ads.clone())
}

async fn reject(ctx: Context<'_>, rejection: AdRejection, is_booster: bool) -> Result<(), Error> {
    let rejection = match rejection {
        AdRejection::Storage(e) => return Err(e.into()),
        other => other,
    };
    let mut embed = reply::embed(ctx.data().community().embeds.denied).description(rejection.to_string());
    if matches!(rejection, AdRejection::UserCooldown { .. }) {
        let footer = if is_booster {
            "✨ Server Boosters can post every 12 hours!"
        } else {
            "✨ Boost the server to post ads every 12 hours!"
        };
        embed = embed.footer(serenity::CreateEmbedFooter::new(footer));
    }
    reply::ephemeral_embed(ctx, embed).await
}

/// Create and post an advertisement
#[poise::command(slash_command, guild_only)]
pub async fn ad(ctx: ApplicationContext<'_>) -> Result<(), Error> {
    let pctx = Context::Application(ctx);
    let guild_id = pctx.guild_id().ok_or("Must be run in a guild")?.get();
    let user = pctx.author().clone();
    let is_booster = pctx
        .author_member()
        .await
        .map(|m| reply::is_booster(&m))
        .unwrap_or(false);
    let service = service(pctx);

    if let Err(rejection) = service.check(user.id.get(), guild_id, is_booster, Utc::now()).await {
        return reject(pctx, rejection, is_booster).await;
    }

    let Some(form) = AdModal::execute(ctx).await? else {
        return Ok(());
    };

    let settings = &pctx.data().community().ads;
    if form.description.chars().count() > settings.max_length as usize {
        reply::ephemeral(
            pctx,
            format!(
                "❌ Your description is too long (max {} characters).",
                settings.max_length
            ),
        )
        .await?;
        return Ok(());
    }

    // Time may have passed while the form was open
    if let Err(rejection) = service.check(user.id.get(), guild_id, is_booster, Utc::now()).await {
        return reject(pctx, rejection, is_booster).await;
    }
    if let Err(rejection) = service.reserve_cost(user.id.get(), guild_id).await {
        return reject(pctx, rejection, is_booster).await;
    }

    let content = ads::format_ad_content(&form.community, &form.description, &form.how_to_join);
    let footer = if is_booster {
        "ℹ️ This ad was purchased with points. Type /ads for more information. • Server Booster"
    } else {
        "ℹ️ This ad was purchased with points. Type /ads for more information."
    };
    let embed = reply::embed(pctx.data().community().embeds.main)
        .author(serenity::CreateEmbedAuthor::new(user.tag()).icon_url(user.face()))
        .description(&content)
        .footer(serenity::CreateEmbedFooter::new(footer));
    let buttons = serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(ComponentRoute::DmUser(user.id.get()).custom_id())
            .label("DM User")
            .style(serenity::ButtonStyle::Primary),
        serenity::CreateButton::new(ComponentRoute::ReportAd(user.id.get()).custom_id())
            .label("Report")
            .style(serenity::ButtonStyle::Danger),
    ]);

    let mut message_ids = Vec::new();
    let mut channels_posted_in = Vec::new();
    for channel_id in &settings.channels {
        match serenity::ChannelId::new(*channel_id)
            .send_message(
                pctx.serenity_context(),
                serenity::CreateMessage::new()
                    .embed(embed.clone())
                    .components(vec![buttons.clone()]),
            )
            .await
        {
            Ok(message) => {
                message_ids.push(message.id.get());
                channels_posted_in.push(*channel_id);
            }
            Err(e) => warn!("Failed to post ad in channel {}: {}", channel_id, e),
        }
    }

    if message_ids.is_empty() {
        service.refund_cost(user.id.get(), guild_id).await?;
        reply::ephemeral(pctx, "❌ Your ad could not be posted. You have not been charged.").await?;
        return Ok(());
    }

    let posted = channels_posted_in.len();
    let ad_id = service
        .record(NewAd {
            user_id: user.id.get(),
            guild_id,
            title: form.community.trim().to_string(),
            content,
            message_ids,
            channels_posted_in,
            cost: settings.cost,
            was_booster: is_booster,
            created_at: Utc::now(),
        })
        .await?;
    info!("{} purchased ad {}", user.name, ad_id);

    let confirmation = reply::embed(pctx.data().community().embeds.accepted).description(format!(
        "✅ Your advertisement has been posted in {} channel(s)! **{}** points have been deducted.",
        posted, settings.cost
    ));
    reply::ephemeral_embed(pctx, confirmation).await
}

/// Show advertisement information
#[poise::command(slash_command, guild_only)]
pub async fn ads(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?.get();
    let community = ctx.data().community();
    let settings = &community.ads;
    let is_booster = ctx
        .author_member()
        .await
        .map(|m| reply::is_booster(&m))
        .unwrap_or(false);

    let last_ad = service(ctx)
        .latest_for_user(ctx.author().id.get(), guild_id)
        .await?;
    let last_ad = match last_ad {
        Some(ad) if ad.status == AdStatus::Deleted => {
            format!("{} (removed)", reply::relative_time(ad.created_at))
        }
        Some(ad) if ad.is_expired(Utc::now()) => format!("{} (expired)", reply::relative_time(ad.created_at)),
        Some(ad) => reply::relative_time(ad.created_at),
        None => "Never".to_string(),
    };

    let cooldown = ads::user_cooldown(is_booster).num_hours();
    let channels = if settings.channels.is_empty() {
        "None configured".to_string()
    } else {
        settings
            .channels
            .iter()
            .map(|c| format!("<#{}>", c))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let embed = reply::embed(community.embeds.main)
        .title("📢 Advertisements")
        .description("Use `/ad` to post an advertisement for your community.")
        .field("Cost", format!("{} points", settings.cost), true)
        .field("Your Cooldown", format!("{} hours", cooldown), true)
        .field("Max Description", format!("{} characters", settings.max_length), true)
        .field("Your Last Ad", last_ad, true)
        .field("Posted In", channels, false)
        .field("Rules", reply::truncate(&settings.rules, crate::config::EMBED_FIELD_LIMIT), false);
    reply::ephemeral_embed(ctx, embed).await
}
