use crate::db::{millis_to_utc, Database, TicketAlertRecord, TicketClosureRecord};
use chrono::{DateTime, Utc};
use tracing::info;

/// Ticket metadata kept in the channel topic: `"<user_id> | <opened_ms>[ | claimed: <name>]"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketTopic {
    pub creator_id: u64,
    pub opened_at: Option<DateTime<Utc>>,
}

impl TicketTopic {
    pub fn new(creator_id: u64, opened_at: DateTime<Utc>) -> Self {
        Self {
            creator_id,
            opened_at: Some(opened_at),
        }
    }

    pub fn parse(topic: &str) -> Option<Self> {
        let mut parts = topic.split('|').map(str::trim);
        let creator_id = parts.next()?.parse().ok()?;
        let opened_at = parts
            .next()
            .and_then(|ms| ms.parse::<i64>().ok())
            .map(millis_to_utc);
        Some(Self {
            creator_id,
            opened_at,
        })
    }

    pub fn render(&self) -> String {
        match self.opened_at {
            Some(at) => format!("{} | {}", self.creator_id, at.timestamp_millis()),
            None => self.creator_id.to_string(),
        }
    }
}

pub fn claimed_topic(topic: &str, claimer: &str) -> String {
    format!("{} | claimed: {}", topic, claimer)
}

/// Fills the category's channel name template for `username`.
pub fn channel_name(template: &str, username: &str) -> String {
    template
        .replace("<username>", username)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Counts tickets opened by `user_id` among the given channel topics.
pub fn count_open_tickets<'a, I>(topics: I, user_id: u64) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    topics
        .into_iter()
        .filter_map(TicketTopic::parse)
        .filter(|t| t.creator_id == user_id)
        .count()
}

/// Whether the ticket behind `topic` was opened by `user_id`.
pub fn opened_by(topic: &str, user_id: u64) -> bool {
    TicketTopic::parse(topic).is_some_and(|t| t.creator_id == user_id)
}

pub fn fill_user(template: &str, mention: &str) -> String {
    template.replace("{user}", mention)
}

/// Fills an inactivity message: `{user}`, `{ticket}` and `{time}` (relative).
pub fn fill_alert(template: &str, mention: &str, ticket: &str, close_at: DateTime<Utc>) -> String {
    fill_user(template, mention)
        .replace("{ticket}", ticket)
        .replace("{time}", &format!("<t:{}:R>", close_at.timestamp()))
}

/// Reason recorded when an `/alert` runs out without a reply.
pub fn inactivity_reason(requested_by: u64) -> String {
    format!("Automatically closed due to inactivity (/alert ran by <@{}>)", requested_by)
}

/// One message as it appears in a closed ticket's transcript.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub sent_at: DateTime<Utc>,
    pub author: String,
    pub content: String,
    pub attachments: Vec<String>,
}

/// Plain-text transcript, oldest message first.
pub fn render_transcript(channel_name: &str, entries: &[TranscriptEntry]) -> String {
    let mut out = format!("Transcript of #{}\n{} message(s)\n\n", channel_name, entries.len());
    for entry in entries {
        let content = if entry.content.is_empty() && entry.attachments.is_empty() {
            "(no text content)"
        } else {
            entry.content.as_str()
        };
        out.push_str(&format!(
            "[{}] {}: {}\n",
            entry.sent_at.format("%Y-%m-%d %H:%M:%S UTC"),
            entry.author,
            content
        ));
        for url in &entry.attachments {
            out.push_str(&format!("    attachment: {}\n", url));
        }
    }
    out
}

pub fn transcript_file_name(channel_name: &str) -> String {
    format!("transcript-{}.txt", channel_name)
}

pub struct ClosureService {
    db: Database,
}

impl ClosureService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn schedule(
        &self,
        channel_id: u64,
        guild_id: u64,
        close_at: DateTime<Utc>,
    ) -> anyhow::Result<TicketClosureRecord> {
        let record = TicketClosureRecord {
            channel_id,
            guild_id,
            close_at,
        };
        let stored = record.clone();
        self.db
            .run_blocking(move |db| db.schedule_closure(&stored))
            .await?;
        info!("Ticket {} scheduled to close at {}", channel_id, close_at);
        Ok(record)
    }

    pub async fn get(&self, channel_id: u64) -> anyhow::Result<Option<TicketClosureRecord>> {
        self.db
            .run_blocking(move |db| db.get_closure(channel_id))
            .await
    }

    /// Returns whether a closure was pending.
    pub async fn cancel(&self, channel_id: u64) -> anyhow::Result<bool> {
        let removed = self
            .db
            .run_blocking(move |db| db.cancel_closure(channel_id))
            .await?;
        Ok(removed > 0)
    }

    pub async fn all(&self) -> anyhow::Result<Vec<TicketClosureRecord>> {
        self.db.run_blocking(|db| db.list_closures()).await
    }

    pub async fn raise_alert(&self, alert: TicketAlertRecord) -> anyhow::Result<TicketAlertRecord> {
        let stored = alert.clone();
        self.db
            .run_blocking(move |db| db.upsert_alert(&stored))
            .await?;
        info!(
            "Ticket {} alerted by {}, closing at {} without activity",
            alert.channel_id, alert.requested_by, alert.close_at
        );
        Ok(alert)
    }

    pub async fn alert(&self, channel_id: u64) -> anyhow::Result<Option<TicketAlertRecord>> {
        self.db
            .run_blocking(move |db| db.get_alert(channel_id))
            .await
    }

    /// Removes the alert and returns it, if one was pending.
    pub async fn clear_alert(&self, channel_id: u64) -> anyhow::Result<Option<TicketAlertRecord>> {
        self.db
            .run_blocking(move |db| {
                let alert = db.get_alert(channel_id)?;
                db.remove_alert(channel_id)?;
                Ok(alert)
            })
            .await
    }

    pub async fn alerts(&self) -> anyhow::Result<Vec<TicketAlertRecord>> {
        self.db.run_blocking(|db| db.list_alerts()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_topic_parse_and_render() {
        let opened = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let topic = TicketTopic::new(42, opened);
        assert_eq!(topic.render(), "42 | 1700000000123");
        assert_eq!(TicketTopic::parse(&topic.render()), Some(topic.clone()));

        let claimed = claimed_topic(&topic.render(), "alex");
        assert_eq!(TicketTopic::parse(&claimed), Some(topic));

        let bare = TicketTopic::parse("42").unwrap();
        assert_eq!(bare.opened_at, None);
        assert!(TicketTopic::parse("General discussion").is_none());
        assert!(TicketTopic::parse("").is_none());
    }

    #[test]
    fn test_channel_name_template() {
        assert_eq!(channel_name("support-<username>", "Cool Kid"), "support-cool-kid");
        assert_eq!(channel_name("Report  <username>", "ABC"), "report-abc");
    }

    #[test]
    fn test_count_open_tickets() {
        let topics = ["1 | 100", "2 | 100", "1 | 200 | claimed: sam", "not a ticket"];
        assert_eq!(count_open_tickets(topics, 1), 2);
        assert_eq!(count_open_tickets(topics, 3), 0);
        assert_eq!(fill_user("{user} left", "<@1>"), "<@1> left");
    }

    #[test]
    fn test_fill_alert() {
        let close_at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(
            fill_alert("{user}: {ticket} closes {time}", "<@1>", "#support-sam", close_at),
            "<@1>: #support-sam closes <t:1700000000:R>"
        );
    }

    #[test]
    fn test_opened_by_matches_whole_creator_id() {
        assert!(opened_by("1 | 100", 1));
        assert!(opened_by("123 | 100 | claimed: sam", 123));
        assert!(!opened_by("123 | 100", 12));
        assert!(!opened_by("5 | 1234", 1234));
        assert!(!opened_by("user 12 asked", 12));
    }

    #[test]
    fn test_render_transcript() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let entries = vec![
            TranscriptEntry {
                sent_at: at,
                author: "sam".to_string(),
                content: "my game crashes".to_string(),
                attachments: vec!["https://cdn.example/log.txt".to_string()],
            },
            TranscriptEntry {
                sent_at: at,
                author: "helper".to_string(),
                content: String::new(),
                attachments: vec![],
            },
        ];

        let text = render_transcript("support-sam", &entries);
        assert!(text.starts_with("Transcript of #support-sam\n2 message(s)\n"));
        assert!(text.contains("[2024-05-01 12:30:00 UTC] sam: my game crashes\n"));
        assert!(text.contains("    attachment: https://cdn.example/log.txt\n"));
        assert!(text.contains("helper: (no text content)"));
        assert_eq!(transcript_file_name("support-sam"), "transcript-support-sam.txt");
    }

    #[tokio::test]
    async fn test_alert_lifecycle() {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        let service = ClosureService::new(db);
        let alert = TicketAlertRecord {
            channel_id: 5,
            guild_id: 6,
            alert_message_id: 7,
            requested_by: 8,
            close_at: Utc::now(),
        };

        service.raise_alert(alert.clone()).await.unwrap();
        assert_eq!(service.alerts().await.unwrap().len(), 1);
        assert_eq!(service.alert(5).await.unwrap(), Some(alert.clone()));
        assert_eq!(service.clear_alert(5).await.unwrap(), Some(alert));
        assert!(service.clear_alert(5).await.unwrap().is_none());
        assert!(inactivity_reason(8).contains("<@8>"));
    }

    #[tokio::test]
    async fn test_closure_lifecycle() {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        let service = ClosureService::new(db);
        let at = Utc::now();

        service.schedule(5, 6, at).await.unwrap();
        assert_eq!(service.all().await.unwrap().len(), 1);
        assert!(service.get(5).await.unwrap().is_some());
        assert!(service.cancel(5).await.unwrap());
        assert!(!service.cancel(5).await.unwrap());
    }
}
