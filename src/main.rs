use mcb::anti_link::LinkFilter;
use mcb::cache::{CooldownCache, MessageCache};
use mcb::jobs::{MuteManager, TicketCloser};
use mcb::{commands, config::Config, db::Database, handlers, Data, Error};
use poise::serenity_prelude as serenity;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// How often stale message cooldowns are swept from memory
const COOLDOWN_PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command `{}`: {:?}", ctx.command().name, error);
            let reply = poise::CreateReply::default()
                .content("❌ There was an error while executing this command!")
                .ephemeral(true);
            if let Err(e) = ctx.send(reply).await {
                warn!("Failed to report command error: {}", e);
            }
        }
        // Checks reply on their own before returning false
        poise::FrameworkError::CommandCheckFailed { error: None, .. } => {}
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            on_error: |error| Box::pin(on_error(error)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(handlers::event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);

                if config.register_commands {
                    match config.dev_guild_id {
                        Some(guild_id) => {
                            poise::builtins::register_in_guild(
                                ctx,
                                &framework.options().commands,
                                serenity::GuildId::new(guild_id),
                            )
                            .await?;
                            info!("Registered commands in guild {}", guild_id);
                        }
                        None => {
                            poise::builtins::register_globally(ctx, &framework.options().commands)
                                .await?;
                            info!("Registered commands globally");
                        }
                    }
                }

                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let db = Database::new(&config)?;
                db.execute_init()?;

                let community = &config.community;
                let link_filter = LinkFilter::new(&community.anti_link)?;
                let mutes = MuteManager::new(ctx.http.clone(), db.clone(), community);
                let tickets = TicketCloser::new(ctx.http.clone(), db.clone(), community);

                match mutes.replay().await {
                    Ok(count) => info!("Restored {} mute timer(s)", count),
                    Err(e) => error!("Failed to restore mute timers: {:?}", e),
                }
                match tickets.replay().await {
                    Ok(count) => info!("Restored {} ticket timer(s)", count),
                    Err(e) => error!("Failed to restore ticket timers: {:?}", e),
                }

                let cooldowns = CooldownCache::new(
                    config.cooldown_cache_capacity,
                    Duration::from_secs(community.points.message_cooldown_secs),
                );
                let sweeper = cooldowns.clone();
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(COOLDOWN_PURGE_INTERVAL);
                    loop {
                        interval.tick().await;
                        let purged = sweeper.purge_expired(Instant::now());
                        if purged > 0 {
                            debug!("Purged {} expired message cooldown(s)", purged);
                        }
                    }
                });

                let messages = MessageCache::new(config.message_cache_capacity);

                Ok(Data {
                    config,
                    http_client: reqwest::Client::new(),
                    db,
                    cooldowns,
                    messages,
                    link_filter,
                    mutes,
                    tickets,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
