use crate::config::EMBED_TITLE_LIMIT;
use crate::reply;
use crate::{Context, Error};
use backon::BackoffBuilder;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const MEME_API: &str = "https://meme-api.com/gimme";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Meme {
    title: String,
    post_link: String,
    url: String,
    #[serde(default)]
    ups: i64,
    #[serde(default)]
    author: Option<String>,
}

/// Delays between the three attempts made per subreddit.
fn meme_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_factor(2.0)
        .with_max_times(2)
        .build()
}

async fn fetch_meme(client: &reqwest::Client, subreddit: &str) -> anyhow::Result<Meme> {
    let url = format!("{}/{}", MEME_API, subreddit);
    let mut backoff = meme_backoff();
    loop {
        let attempt = async {
            let response = client.get(&url).send().await?.error_for_status()?;
            Ok::<_, anyhow::Error>(response.json::<Meme>().await?)
        };
        match attempt.await {
            Ok(meme) => return Ok(meme),
            Err(e) => match backoff.next() {
                Some(delay) => {
                    debug!("Meme fetch from r/{} failed ({}), retrying in {:?}", subreddit, e, delay);
                    tokio::time::sleep(delay).await;
                }
                None => return Err(e),
            },
        }
    }
}

/// Get a random meme
#[poise::command(slash_command, guild_only)]
pub async fn meme(ctx: Context<'_>) -> Result<(), Error> {
    let community = ctx.data().community();
    let settings = &community.memes;
    if let Some(channel) = settings.channel {
        if ctx.channel_id().get() != channel {
            reply::ephemeral(ctx, format!("❌ This command can only be used in <#{}>!", channel))
                .await?;
            return Ok(());
        }
    }

    ctx.defer().await?;
    let client = &ctx.data().http_client;
    let meme = match fetch_meme(client, &settings.subreddit).await {
        Ok(meme) => Ok(meme),
        Err(e) => {
            warn!(
                "Failed to fetch from r/{}, trying r/{}: {}",
                settings.subreddit, settings.fallback_subreddit, e
            );
            fetch_meme(client, &settings.fallback_subreddit).await
        }
    };

    let meme = match meme {
        Ok(meme) if !meme.url.is_empty() && !meme.title.is_empty() => meme,
        _ => {
            ctx.say("😔 Sorry, I was unable to fetch a meme at this time. Please try again later.")
                .await?;
            return Ok(());
        }
    };

    let embed = reply::embed(community.embeds.accepted)
        .title(reply::truncate(&meme.title, EMBED_TITLE_LIMIT))
        .url(&meme.post_link)
        .image(&meme.url)
        .footer(poise::serenity_prelude::CreateEmbedFooter::new(format!(
            "👍 {} | Posted by u/{}",
            meme.ups,
            meme.author.as_deref().unwrap_or("unknown")
        )));
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meme_payload() {
        let json = r#"{
            "postLink": "https://redd.it/abc",
            "subreddit": "MinecraftMemes",
            "title": "Creeper aww man",
            "url": "https://i.redd.it/abc.png",
            "nsfw": false,
            "ups": 42
        }"#;
        let meme: Meme = serde_json::from_str(json).unwrap();
        assert_eq!(meme.post_link, "https://redd.it/abc");
        assert_eq!(meme.ups, 42);
        assert!(meme.author.is_none());
    }

    #[test]
    fn test_backoff_allows_three_attempts() {
        let delays: Vec<Duration> = meme_backoff().collect();
        assert_eq!(delays, vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }
}
