use crate::economy::PointsError;
use crate::reply;
use crate::services::points::PointsService;
use crate::{Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use tracing::info;

async fn author_is_booster(ctx: Context<'_>) -> bool {
    ctx.author_member()
        .await
        .map(|m| reply::is_booster(&m))
        .unwrap_or(false)
}

fn service(ctx: Context<'_>) -> PointsService {
    PointsService::new(ctx.data().db.clone(), ctx.data().community().points.clone())
}

/// Claim your daily points
#[poise::command(slash_command, guild_only)]
pub async fn daily(ctx: Context<'_>) -> Result<(), Error> {
    let community = ctx.data().community();
    if let Some(channel) = community.channels.daily {
        if ctx.channel_id().get() != channel {
            reply::ephemeral(ctx, format!("❌ Daily rewards can only be claimed in <#{}>.", channel))
                .await?;
            return Ok(());
        }
    }

    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let is_booster = author_is_booster(ctx).await;

    let (outcome, balance) = match service(ctx)
        .claim_daily(ctx.author().id.get(), guild_id.get(), is_booster, Utc::now())
        .await
    {
        Ok(result) => result,
        Err(PointsError::DailyCooldown { hours_left }) => {
            reply::ephemeral(
                ctx,
                format!("⏳ You can claim your daily reward again in {} hours.", hours_left),
            )
            .await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let mut lines = vec![format!("You received **{}** points!", outcome.base)];
    if outcome.streak_bonus > 0 {
        lines.push(format!("🔥 Streak bonus: **+{}**", outcome.streak_bonus));
    }
    if outcome.booster_bonus > 0 {
        lines.push(format!("💎 Booster bonus: **+{}**", outcome.booster_bonus));
    }
    lines.push(format!("Total: **{}** • Balance: **{}**", outcome.total(), balance));

    let mut embed = reply::embed(community.embeds.accepted)
        .title("📅 Daily Reward")
        .description(lines.join("\n"));
    if outcome.streak >= 2 {
        embed = embed.footer(serenity::CreateEmbedFooter::new(format!(
            "{} day streak!",
            outcome.streak
        )));
    }

    // Streaks and booster bonuses are announced publicly
    let public = outcome.streak >= 2 || outcome.booster_bonus > 0;
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(!public))
        .await?;
    Ok(())
}

/// Roll for a chance to win 1-5 points
#[poise::command(slash_command, guild_only)]
pub async fn roll(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let is_booster = author_is_booster(ctx).await;
    let community = ctx.data().community();

    let (won, balance) = match service(ctx)
        .roll(ctx.author().id.get(), guild_id.get(), is_booster, Utc::now())
        .await
    {
        Ok(result) => result,
        Err(PointsError::RollCooldown { hours_left }) => {
            let hint = if is_booster {
                ""
            } else {
                "\n*💎 Boosters can roll every 12 hours!*"
            };
            reply::ephemeral(
                ctx,
                format!("⏳ You can roll again in {} hours.{}", hours_left, hint),
            )
            .await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let embed = if won > 0 {
        reply::embed(community.embeds.accepted)
            .title("🎲 You won!")
            .description(format!("You rolled **{}** points! Balance: **{}**", won, balance))
    } else {
        reply::embed(community.embeds.denied)
            .title("🎲 No luck")
            .description(format!("Better luck next time. Balance: **{}**", balance))
    };
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

async fn show_points(ctx: Context<'_>, user: &serenity::User) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let standing = service(ctx).standing(user.id.get(), guild_id.get()).await?;

    let embed = reply::embed(ctx.data().community().embeds.main)
        .title(format!("💰 {}'s Points", user.name))
        .field("Points", standing.points.to_string(), true)
        .field("Daily Streak", format!("{} days", standing.daily_streak), true);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Check your points balance
#[poise::command(slash_command, guild_only)]
pub async fn points(ctx: Context<'_>) -> Result<(), Error> {
    show_points(ctx, ctx.author()).await
}

/// Check another user's points balance
#[poise::command(slash_command, guild_only)]
pub async fn pointsview(
    ctx: Context<'_>,
    #[description = "User to view"] user: serenity::User,
) -> Result<(), Error> {
    show_points(ctx, &user).await
}

/// Show the points leaderboard
#[poise::command(slash_command, guild_only)]
pub async fn pointstop(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let limit = ctx.data().community().leaderboard.display_limit;
    let top = service(ctx).leaderboard(guild_id.get(), limit).await?;

    if top.is_empty() {
        ctx.say("📭 Nobody has earned any points yet.").await?;
        return Ok(());
    }

    let lines: Vec<String> = top
        .iter()
        .enumerate()
        .map(|(i, user)| {
            let medal = match i {
                0 => "🥇".to_string(),
                1 => "🥈".to_string(),
                2 => "🥉".to_string(),
                n => format!("**{}.**", n + 1),
            };
            format!("{} <@{}> — **{}** points", medal, user.user_id, user.points)
        })
        .collect();

    let embed = reply::embed(ctx.data().community().embeds.main)
        .title("🏆 Points Leaderboard")
        .description(lines.join("\n"));
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Manage user points
#[poise::command(
    slash_command,
    subcommands("give", "remove"),
    required_permissions = "MODERATE_MEMBERS",
    guild_only
)]
pub async fn pointsadmin(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Give points to a user
#[poise::command(slash_command, guild_only)]
pub async fn give(
    ctx: Context<'_>,
    #[description = "User to give points to"] user: serenity::User,
    #[description = "Amount of points"]
    #[min = 1]
    amount: i64,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let balance = match service(ctx).give(user.id.get(), guild_id.get(), amount).await {
        Ok(balance) => balance,
        Err(PointsError::InvalidAmount) => {
            reply::ephemeral(ctx, "❌ Amount must be at least 1.").await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    info!("{} gave {} points to {}", ctx.author().name, amount, user.id);
    ctx.say(format!(
        "✅ Gave **{}** points to {}. New balance: **{}**",
        amount, user, balance
    ))
    .await?;
    announce_adjustment(ctx, &user, amount, balance, "added to").await;
    Ok(())
}

/// Remove points from a user
#[poise::command(slash_command, guild_only)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "User to remove points from"] user: serenity::User,
    #[description = "Amount of points"]
    #[min = 1]
    amount: i64,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let balance = match service(ctx).take(user.id.get(), guild_id.get(), amount).await {
        Ok(balance) => balance,
        Err(PointsError::InsufficientPoints { balance, .. }) => {
            reply::ephemeral(
                ctx,
                format!("❌ {} only has **{}** points.", user, balance),
            )
            .await?;
            return Ok(());
        }
        Err(PointsError::InvalidAmount) => {
            reply::ephemeral(ctx, "❌ Amount must be at least 1.").await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    info!("{} removed {} points from {}", ctx.author().name, amount, user.id);
    ctx.say(format!(
        "✅ Removed **{}** points from {}. New balance: **{}**",
        amount, user, balance
    ))
    .await?;
    announce_adjustment(ctx, &user, amount, balance, "removed from").await;
    Ok(())
}

async fn announce_adjustment(
    ctx: Context<'_>,
    user: &serenity::User,
    amount: i64,
    balance: i64,
    verb: &str,
) {
    let community = ctx.data().community();
    let http = &ctx.serenity_context().http;

    let log = reply::embed(community.embeds.main)
        .title("Points Adjusted")
        .description(format!(
            "{} {} points {} {}",
            ctx.author(),
            amount,
            verb,
            user
        ))
        .field("New Balance", balance.to_string(), true);
    reply::send_log(http, community.channels.logging, log).await;

    let dm = reply::embed(community.embeds.main)
        .title("Points Update")
        .description(format!(
            "**{}** points were {} your balance by a moderator.\nNew balance: **{}**",
            amount, verb, balance
        ));
    reply::dm_best_effort(http, user.id, dm).await;
}
