//! Edit and delete logs for guild messages, built from the in-memory message cache.

use crate::cache::CachedMessage;
use crate::config::EMBED_FIELD_LIMIT;
use crate::reply;
use crate::services::ads::AdService;
use crate::{Data, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use tracing::debug;

/// Room left for the code fence around a chunk in a 2000 character message.
const CHUNK_LIMIT: usize = 1980;

pub fn cached(message: &serenity::Message) -> CachedMessage {
    CachedMessage {
        channel_id: message.channel_id.get(),
        author_id: message.author.id.get(),
        author_name: message.author.name.clone(),
        content: message.content.clone(),
        attachments: message
            .attachments
            .iter()
            .map(|a| format!("{} ({} KB)", a.filename, a.size / 1024))
            .collect(),
        sent_at: message.timestamp.unix_timestamp(),
    }
}

/// Splits long content into message-sized pieces, on line breaks where possible.
pub fn split_content(content: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in content.lines() {
        let mut line = line;
        while line.chars().count() > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let cut = line
                .char_indices()
                .nth(limit)
                .map(|(i, _)| i)
                .unwrap_or(line.len());
            chunks.push(line[..cut].to_string());
            line = &line[cut..];
        }
        if !current.is_empty() && current.chars().count() + line.chars().count() + 1 > limit {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn fits_field(content: &str) -> bool {
    // Leaves room for the code fence
    content.chars().count() <= EMBED_FIELD_LIMIT - 12
}

fn code_block(content: &str) -> String {
    format!("```\n{}\n```", content)
}

async fn send_chunks(http: &serenity::Http, channel: Option<u64>, content: &str) {
    for chunk in split_content(content, CHUNK_LIMIT) {
        reply::send_log_message(
            http,
            channel,
            serenity::CreateMessage::new().content(code_block(&chunk)),
        )
        .await;
    }
}

pub async fn handle_message_update(
    ctx: &serenity::Context,
    data: &Data,
    event: &serenity::MessageUpdateEvent,
) -> Result<(), Error> {
    let Some(guild_id) = event.guild_id else {
        return Ok(());
    };
    if event.author.as_ref().is_some_and(|a| a.bot) {
        return Ok(());
    }
    // Embed unfurls arrive as updates without content
    let Some(after) = event.content.as_deref() else {
        return Ok(());
    };
    let Some(before) = data.messages.replace_content(event.id.get(), after) else {
        return Ok(());
    };
    if before.content == after {
        return Ok(());
    }

    let community = data.community();
    let log = community.channels.message_log;
    let old = if before.content.is_empty() { "*No content*" } else { before.content.as_str() };
    let new = if after.is_empty() { "*No content*" } else { after };

    let mut embed = reply::embed(community.embeds.main)
        .title("Message Edited")
        .field("Author", format!("<@{}> ({})", before.author_id, before.author_name), true)
        .field("Channel", format!("<#{}>", event.channel_id), true)
        .field(
            "Message Link",
            format!(
                "[Jump to Message](https://discord.com/channels/{}/{}/{})",
                guild_id, event.channel_id, event.id
            ),
            true,
        )
        .field("Sent At", format!("<t:{}:F>", before.sent_at), true)
        .field("Edited At", format!("<t:{}:F>", Utc::now().timestamp()), true);

    if fits_field(old) && fits_field(new) {
        embed = embed
            .field("Before", code_block(old), false)
            .field("After", code_block(new), false);
        reply::send_log(&ctx.http, log, embed).await;
    } else {
        reply::send_log(&ctx.http, log, embed).await;
        reply::send_log_message(&ctx.http, log, serenity::CreateMessage::new().content("**Before:**")).await;
        send_chunks(&ctx.http, log, old).await;
        reply::send_log_message(&ctx.http, log, serenity::CreateMessage::new().content("**After:**")).await;
        send_chunks(&ctx.http, log, new).await;
    }
    debug!("Logged edit of message {} by {}", event.id, before.author_id);
    Ok(())
}

pub async fn handle_message_delete(
    ctx: &serenity::Context,
    data: &Data,
    channel_id: serenity::ChannelId,
    message_id: serenity::MessageId,
    guild_id: Option<serenity::GuildId>,
) -> Result<(), Error> {
    if guild_id.is_none() {
        return Ok(());
    }
    AdService::new(data.db.clone(), data.community().ads.clone())
        .message_deleted(message_id.get())
        .await?;

    let Some(message) = data.messages.remove(message_id.get()) else {
        return Ok(());
    };

    let community = data.community();
    let log = community.channels.message_log;
    let content = if message.content.is_empty() {
        "*No text content*".to_string()
    } else if message.content.chars().count() <= EMBED_FIELD_LIMIT {
        message.content.clone()
    } else {
        "*Content is too long and is sent below.*".to_string()
    };

    let mut embed = reply::embed(community.embeds.denied)
        .title("Message Deleted")
        .field("Author", format!("<@{}> ({})", message.author_id, message.author_name), true)
        .field("Channel", format!("<#{}>", channel_id), true)
        .field("Sent At", format!("<t:{}:F>", message.sent_at), true)
        .field("Deleted At", format!("<t:{}:F>", Utc::now().timestamp()), true)
        .field("Content", content, false);
    if !message.attachments.is_empty() {
        let list = message
            .attachments
            .iter()
            .map(|a| format!("• {}", a))
            .collect::<Vec<_>>()
            .join("\n");
        embed = embed.field("Attachments", reply::truncate(&list, EMBED_FIELD_LIMIT), false);
    }
    reply::send_log(&ctx.http, log, embed).await;

    if message.content.chars().count() > EMBED_FIELD_LIMIT {
        send_chunks(&ctx.http, log, &message.content).await;
    }
    debug!("Logged deletion of message {} by {}", message_id, message.author_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_content_is_one_chunk() {
        assert_eq!(split_content("hello\nworld", 100), vec!["hello\nworld"]);
        assert_eq!(split_content("", 100), vec![""]);
    }

    #[test]
    fn test_split_on_line_breaks() {
        let chunks = split_content("aaaa\nbbbb\ncccc", 9);
        assert_eq!(chunks, vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn test_long_line_is_hard_split() {
        let line = "é".repeat(25);
        let chunks = split_content(&line, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), line);
    }

    #[test]
    fn test_field_fit_leaves_room_for_fence() {
        assert!(fits_field(&"a".repeat(1000)));
        assert!(!fits_field(&"a".repeat(1020)));
    }
}
