use crate::{Context, Error};
use tracing::info;

/// Shut down the bot (Owner only)
#[poise::command(slash_command, owners_only, hide_in_help)]
pub async fn shutdown(ctx: Context<'_>) -> Result<(), Error> {
    info!("Shutdown requested by owner {}", ctx.author().name);
    let pending = ctx.data().mutes.pending() + ctx.data().tickets.pending();
    ctx.say(format!(
        "👋 Shutting down... {} pending timer(s) will be restored on the next start.",
        pending
    ))
    .await?;
    ctx.framework().shard_manager().shutdown_all().await;
    Ok(())
}
