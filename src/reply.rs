//! Shared message helpers: ephemeral replies, best-effort DMs and log posts.

use crate::community::Color;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::warn;

/// Discord error codes for entities that no longer exist.
const UNKNOWN_CHANNEL: isize = 10003;
const UNKNOWN_MESSAGE: isize = 10008;
const UNKNOWN_MEMBER: isize = 10007;
const UNKNOWN_USER: isize = 10013;

pub fn embed(color: Color) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .color(color)
        .timestamp(serenity::Timestamp::now())
}

pub async fn ephemeral(ctx: Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(content)
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

pub async fn ephemeral_embed(ctx: Context<'_>, embed: serenity::CreateEmbed) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Replies to a component or modal interaction with an ephemeral message.
pub fn ephemeral_response(content: impl Into<String>) -> serenity::CreateInteractionResponse {
    serenity::CreateInteractionResponse::Message(
        serenity::CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
    )
}

/// Sends a DM, logging instead of failing when the user has DMs closed.
pub async fn dm_best_effort(
    http: &serenity::Http,
    user_id: serenity::UserId,
    embed: serenity::CreateEmbed,
) -> bool {
    dm_message_best_effort(http, user_id, serenity::CreateMessage::new().embed(embed)).await
}

pub async fn dm_message_best_effort(
    http: &serenity::Http,
    user_id: serenity::UserId,
    message: serenity::CreateMessage,
) -> bool {
    match user_id.direct_message(http, message).await {
        Ok(_) => true,
        Err(e) => {
            warn!("Could not DM user {}: {}", user_id, e);
            false
        }
    }
}

/// Posts to a configured log channel; unset channels are skipped.
pub async fn send_log(http: &serenity::Http, channel: Option<u64>, embed: serenity::CreateEmbed) {
    send_log_message(http, channel, serenity::CreateMessage::new().embed(embed)).await
}

pub async fn send_log_message(
    http: &serenity::Http,
    channel: Option<u64>,
    message: serenity::CreateMessage,
) {
    let Some(channel_id) = channel else {
        return;
    };
    if let Err(e) = serenity::ChannelId::new(channel_id)
        .send_message(http, message)
        .await
    {
        warn!("Failed to post to log channel {}: {}", channel_id, e);
    }
}

pub fn is_unknown_entity(err: &serenity::Error) -> bool {
    match err {
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response)) => {
            response.status_code.as_u16() == 404
                || matches!(
                    response.error.code,
                    UNKNOWN_CHANNEL | UNKNOWN_MESSAGE | UNKNOWN_MEMBER | UNKNOWN_USER
                )
        }
        _ => false,
    }
}

pub fn is_booster(member: &serenity::Member) -> bool {
    member.premium_since.is_some()
}

/// Cuts `text` to at most `limit` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn relative_time(at: chrono::DateTime<chrono::Utc>) -> String {
    format!("<t:{}:R>", at.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("héllo wörld", 5).chars().count(), 5);
    }

    #[test]
    fn test_relative_time() {
        let at = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(relative_time(at), "<t:1700000000:R>");
    }
}
