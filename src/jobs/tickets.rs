use crate::community::{CommunityConfig, EmbedColors, TicketMessages};
use crate::db::{Database, TicketAlertRecord, TicketClosureRecord};
use crate::reply;
use crate::scheduler::{self, ExpiryScheduler};
use crate::services::tickets::{self, ClosureService, TicketTopic, TranscriptEntry};
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const AUTO_CLOSE_REASON: &str = "Ticket automatically closed after the scheduled closure time.";

const TRANSCRIPT_PAGE: u8 = 100;
const MAX_TRANSCRIPT_MESSAGES: usize = 5000;

/// Closes ticket channels, immediately, on a persisted schedule or after an
/// unanswered inactivity alert.
#[derive(Clone)]
pub struct TicketCloser {
    http: Arc<serenity::Http>,
    closures: Arc<ClosureService>,
    timers: ExpiryScheduler<u64>,
    alerts: ExpiryScheduler<u64>,
    transcripts: Option<u64>,
    close_delay: Duration,
    colors: EmbedColors,
    messages: TicketMessages,
}

impl TicketCloser {
    pub fn new(http: Arc<serenity::Http>, db: Database, community: &CommunityConfig) -> Self {
        Self {
            http,
            closures: Arc::new(ClosureService::new(db)),
            timers: ExpiryScheduler::new("ticket-closure"),
            alerts: ExpiryScheduler::new("ticket-alert"),
            transcripts: community.channels.transcripts,
            close_delay: Duration::from_secs(community.tickets.close_delay_secs),
            colors: community.embeds.clone(),
            messages: community.tickets.messages.clone(),
        }
    }

    /// Posts the closing notice, waits the close delay, records the closure and
    /// deletes the channel. `closed_by` is `None` for automatic closures.
    pub async fn close(
        &self,
        channel_id: serenity::ChannelId,
        closed_by: Option<serenity::UserId>,
        reason: Option<&str>,
    ) -> anyhow::Result<()> {
        let channel = channel_id
            .to_channel(&*self.http)
            .await
            .with_context(|| format!("Failed to fetch ticket channel {}", channel_id))?
            .guild()
            .with_context(|| format!("Channel {} is not a guild channel", channel_id))?;
        let topic = channel.topic.as_deref().and_then(TicketTopic::parse);

        let notice = reply::embed(self.colors.warning).description(&self.messages.ticket_closing);
        if let Err(e) = channel_id
            .send_message(&*self.http, serenity::CreateMessage::new().embed(notice))
            .await
        {
            warn!("Failed to post closing notice in {}: {}", channel_id, e);
        }

        tokio::time::sleep(self.close_delay).await;

        let transcript = match self.transcript(channel_id, &channel.name).await {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("Failed to build transcript for {}: {:?}", channel_id, e);
                None
            }
        };

        let closer = closed_by
            .map(|id| format!("<@{}>", id))
            .unwrap_or_else(|| "Automatic closure".to_string());
        let now = Utc::now();

        let mut record = reply::embed(self.colors.main)
            .title("Ticket Closed")
            .field("Ticket", format!("#{}", channel.name), true)
            .field("Closed by", &closer, true)
            .field("Closed at", format!("<t:{}:F>", now.timestamp()), true);
        if let Some(topic) = &topic {
            record = record.field("Opened by", format!("<@{}>", topic.creator_id), true);
            if let Some(opened) = topic.opened_at {
                record = record.field("Opened at", format!("<t:{}:F>", opened.timestamp()), true);
            }
        }
        if let Some(reason) = reason {
            record = record.field("Reason", reply::truncate(reason, crate::config::EMBED_FIELD_LIMIT), false);
        }

        let notified = match &topic {
            Some(topic) => {
                let mut dm = reply::embed(self.colors.main)
                    .title("Ticket Closed")
                    .description(&self.messages.ticket_closed)
                    .field("Ticket", format!("#{}", channel.name), true)
                    .field("Closed by", &closer, true);
                if let Some(reason) = reason {
                    dm = dm.field("Reason", reply::truncate(reason, crate::config::EMBED_FIELD_LIMIT), false);
                }
                let mut message = serenity::CreateMessage::new().embed(dm);
                if let Some(file) = &transcript {
                    message = message.add_file(file.clone());
                }
                reply::dm_message_best_effort(&self.http, serenity::UserId::new(topic.creator_id), message)
                    .await
            }
            None => false,
        };
        record = record.field(
            "User Notified",
            if notified { "Yes" } else { "No (Unable to send DM)" },
            true,
        );
        let mut log = serenity::CreateMessage::new().embed(record);
        if let Some(file) = transcript {
            log = log.add_file(file);
        }
        reply::send_log_message(&self.http, self.transcripts, log).await;

        match channel_id.delete(&*self.http).await {
            Ok(_) => {}
            Err(e) if reply::is_unknown_entity(&e) => {}
            Err(e) => return Err(e).with_context(|| format!("Failed to delete ticket {}", channel_id)),
        }

        self.timers.disarm(&channel_id.get());
        self.alerts.disarm(&channel_id.get());
        self.closures.cancel(channel_id.get()).await?;
        self.closures.clear_alert(channel_id.get()).await?;
        info!("Ticket {} closed by {}", channel_id, closer);
        Ok(())
    }

    /// Renders the channel history, oldest first, as a text attachment.
    async fn transcript(
        &self,
        channel_id: serenity::ChannelId,
        name: &str,
    ) -> anyhow::Result<serenity::CreateAttachment> {
        let mut entries = Vec::new();
        let mut before: Option<serenity::MessageId> = None;
        loop {
            let mut request = serenity::GetMessages::new().limit(TRANSCRIPT_PAGE);
            if let Some(id) = before {
                request = request.before(id);
            }
            let page = channel_id
                .messages(&*self.http, request)
                .await
                .with_context(|| format!("Failed to read history of {}", channel_id))?;
            let full = page.len() == usize::from(TRANSCRIPT_PAGE);
            before = page.last().map(|m| m.id);
            entries.extend(page.iter().map(transcript_entry));
            if !full || entries.len() >= MAX_TRANSCRIPT_MESSAGES {
                break;
            }
        }
        entries.reverse();

        let text = tickets::render_transcript(name, &entries);
        Ok(serenity::CreateAttachment::bytes(
            text.into_bytes(),
            tickets::transcript_file_name(name),
        ))
    }

    pub async fn schedule(
        &self,
        channel_id: u64,
        guild_id: u64,
        close_at: chrono::DateTime<Utc>,
    ) -> anyhow::Result<TicketClosureRecord> {
        let record = self.closures.schedule(channel_id, guild_id, close_at).await?;
        self.arm(&record);
        Ok(record)
    }

    /// Returns whether a closure was pending.
    pub async fn cancel(&self, channel_id: u64) -> anyhow::Result<bool> {
        self.timers.disarm(&channel_id);
        self.closures.cancel(channel_id).await
    }

    /// Number of armed closure timers.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Starts the inactivity countdown for an alert already posted in the ticket.
    pub async fn raise_alert(&self, alert: TicketAlertRecord) -> anyhow::Result<()> {
        let alert = self.closures.raise_alert(alert).await?;
        self.arm_alert(&alert);
        Ok(())
    }

    pub fn has_alert(&self, channel_id: u64) -> bool {
        self.alerts.is_armed(&channel_id)
    }

    /// Activity in the ticket: drops the countdown and deletes the alert message.
    pub async fn withdraw_alert(&self, channel_id: u64) -> anyhow::Result<bool> {
        self.alerts.disarm(&channel_id);
        let Some(alert) = self.closures.clear_alert(channel_id).await? else {
            return Ok(false);
        };

        match serenity::ChannelId::new(channel_id)
            .delete_message(&*self.http, serenity::MessageId::new(alert.alert_message_id))
            .await
        {
            Ok(()) => {}
            Err(e) if reply::is_unknown_entity(&e) => {}
            Err(e) => warn!("Failed to delete alert message in {}: {}", channel_id, e),
        }
        info!("Inactivity alert in ticket {} withdrawn after activity", channel_id);
        Ok(true)
    }

    /// Re-arms stored closures and alerts. Returns how many timers were armed.
    pub async fn replay(&self) -> anyhow::Result<usize> {
        let closures = self.closures.all().await?;
        for closure in &closures {
            self.arm(closure);
        }
        let alerts = self.closures.alerts().await?;
        for alert in &alerts {
            self.arm_alert(alert);
        }
        info!(
            "Replayed {} ticket closure timers and {} inactivity alerts",
            closures.len(),
            alerts.len()
        );
        Ok(closures.len() + alerts.len())
    }

    fn arm_alert(&self, alert: &TicketAlertRecord) {
        let closer = self.clone();
        let channel_id = alert.channel_id;
        self.alerts.arm(channel_id, alert.close_at, move || async move {
            if let Err(e) = closer.run_alert(channel_id).await {
                error!("Inactivity closure of ticket {} failed: {}", channel_id, e);
            }
        });
    }

    async fn run_alert(&self, channel_id: u64) -> anyhow::Result<()> {
        let Some(alert) = self.closures.alert(channel_id).await? else {
            return Ok(());
        };
        if !scheduler::is_due(Some(alert.close_at), Utc::now()) {
            return Ok(());
        }
        self.closures.clear_alert(channel_id).await?;

        let reason = tickets::inactivity_reason(alert.requested_by);
        match self
            .close(
                serenity::ChannelId::new(channel_id),
                Some(serenity::UserId::new(alert.requested_by)),
                Some(&reason),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.downcast_ref::<serenity::Error>().is_some_and(reply::is_unknown_entity) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn arm(&self, record: &TicketClosureRecord) {
        let closer = self.clone();
        let channel_id = record.channel_id;
        self.timers.arm(channel_id, record.close_at, move || async move {
            if let Err(e) = closer.run_scheduled(channel_id).await {
                error!("Scheduled closure of ticket {} failed: {}", channel_id, e);
            }
        });
    }

    async fn run_scheduled(&self, channel_id: u64) -> anyhow::Result<()> {
        let due = self.closures.get(channel_id).await?.map(|c| c.close_at);
        if !scheduler::is_due(due, Utc::now()) {
            return Ok(());
        }

        match self
            .close(serenity::ChannelId::new(channel_id), None, Some(AUTO_CLOSE_REASON))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                let gone = e
                    .downcast_ref::<serenity::Error>()
                    .is_some_and(reply::is_unknown_entity);
                // The channel was deleted by hand; drop the stale schedule
                self.closures.cancel(channel_id).await?;
                if gone {
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }
}

fn transcript_entry(message: &serenity::Message) -> TranscriptEntry {
    TranscriptEntry {
        sent_at: DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0).unwrap_or_default(),
        author: message.author.name.clone(),
        content: message.content.clone(),
        attachments: message.attachments.iter().map(|a| a.url.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn offline_closer() -> (TicketCloser, Database) {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        let http = serenity::HttpBuilder::new("offline")
            .proxy("http://127.0.0.1:9")
            .ratelimiter_disabled(true)
            .build();
        let closer = TicketCloser::new(Arc::new(http), db.clone(), &CommunityConfig::default());
        (closer, db)
    }

    fn alert(channel_id: u64) -> TicketAlertRecord {
        TicketAlertRecord {
            channel_id,
            guild_id: 100,
            alert_message_id: 55,
            requested_by: 9,
            close_at: Utc::now() + ChronoDuration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_replay_arms_closures_and_alerts() {
        let (closer, db) = offline_closer();
        db.schedule_closure(&TicketClosureRecord {
            channel_id: 10,
            guild_id: 100,
            close_at: Utc::now() + ChronoDuration::hours(1),
        })
        .unwrap();
        db.upsert_alert(&alert(11)).unwrap();

        assert_eq!(closer.replay().await.unwrap(), 2);
        assert_eq!(closer.pending(), 1);
        assert!(closer.has_alert(11));
        assert!(!closer.has_alert(10));
    }

    #[tokio::test]
    async fn test_activity_withdraws_alert() {
        let (closer, db) = offline_closer();
        closer.raise_alert(alert(11)).await.unwrap();
        assert!(closer.has_alert(11));

        // The alert message cannot be deleted offline; the countdown still goes
        assert!(closer.withdraw_alert(11).await.unwrap());
        assert!(!closer.has_alert(11));
        assert!(db.get_alert(11).unwrap().is_none());
        assert!(!closer.withdraw_alert(11).await.unwrap());
    }

    #[tokio::test]
    async fn test_alert_not_yet_due_keeps_ticket_open() {
        let (closer, db) = offline_closer();
        db.upsert_alert(&alert(11)).unwrap();

        closer.run_alert(11).await.unwrap();
        assert!(db.get_alert(11).unwrap().is_some());
    }
}
