pub mod schema;

use crate::config::Config;
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: u64,
    pub guild_id: u64,
    pub points: i64,
    pub daily_streak: i64,
    pub last_daily: Option<DateTime<Utc>>,
    pub last_roll: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdStatus {
    Active,
    /// One of its posted messages was deleted.
    Deleted,
}

impl AdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdStatus::Active => "active",
            AdStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for AdStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AdStatus::Active),
            "deleted" => Ok(AdStatus::Deleted),
            other => Err(anyhow::anyhow!("unknown ad status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAd {
    pub user_id: u64,
    pub guild_id: u64,
    pub title: String,
    pub content: String,
    pub message_ids: Vec<u64>,
    pub channels_posted_in: Vec<u64>,
    pub cost: i64,
    pub was_booster: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AdRecord {
    pub id: i64,
    pub user_id: u64,
    pub guild_id: u64,
    pub title: String,
    pub content: String,
    pub message_ids: Vec<u64>,
    pub channels_posted_in: Vec<u64>,
    pub cost: i64,
    pub status: AdStatus,
    pub was_booster: bool,
    pub created_at: DateTime<Utc>,
}

impl AdRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > chrono::Duration::days(7)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Denied,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Accepted => "accepted",
            SuggestionStatus::Denied => "denied",
        }
    }
}

impl FromStr for SuggestionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SuggestionStatus::Pending),
            "accepted" => Ok(SuggestionStatus::Accepted),
            "denied" => Ok(SuggestionStatus::Denied),
            other => Err(anyhow::anyhow!("unknown suggestion status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSuggestion {
    pub message_id: u64,
    pub thread_id: u64,
    pub user_id: u64,
    pub guild_id: u64,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SuggestionRecord {
    pub id: i64,
    pub message_id: u64,
    pub thread_id: u64,
    pub user_id: u64,
    pub guild_id: u64,
    pub title: String,
    pub content: String,
    pub status: SuggestionStatus,
    pub upvotes: i64,
    pub downvotes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WarningRecord {
    pub id: i64,
    pub user_id: u64,
    pub guild_id: u64,
    pub moderator_id: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MuteRecord {
    pub guild_id: u64,
    pub user_id: u64,
    pub reason: String,
    pub moderator_id: u64,
    pub duration_hours: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TicketClosureRecord {
    pub channel_id: u64,
    pub guild_id: u64,
    pub close_at: DateTime<Utc>,
}

/// An `/alert` waiting for activity in a ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketAlertRecord {
    pub channel_id: u64,
    pub guild_id: u64,
    pub alert_message_id: u64,
    pub requested_by: u64,
    pub close_at: DateTime<Utc>,
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        if let Some(parent) = std::path::Path::new(&config.database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        Self::open(&config.database_url)
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.conn()?;
        conn.execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Runs a synchronous database closure on the blocking pool.
    pub async fn run_blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .context("Database task panicked")?
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database mutex poisoned"))
    }

    // --- Users ---

    pub fn get_user(&self, user_id: u64, guild_id: u64) -> anyhow::Result<Option<UserRecord>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT user_id, guild_id, points, daily_streak, last_daily, last_roll
                 FROM users WHERE user_id = ?1 AND guild_id = ?2",
                (user_id.to_string(), guild_id.to_string()),
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Credits `amount` points, creating the user if needed. Returns the new balance.
    pub fn add_points(&self, user_id: u64, guild_id: u64, amount: i64) -> anyhow::Result<i64> {
        anyhow::ensure!(amount >= 0, "cannot credit a negative amount ({})", amount);
        debug!("Database: Crediting {} points to {} in {}", amount, user_id, guild_id);
        let conn = self.conn()?;
        let balance = conn.query_row(
            "INSERT INTO users (user_id, guild_id, points) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, guild_id) DO UPDATE SET points = points + excluded.points
             RETURNING points",
            (user_id.to_string(), guild_id.to_string(), amount),
            |row| row.get(0),
        )?;
        Ok(balance)
    }

    /// Debits `amount` points only if the balance covers it.
    /// Returns the new balance, or `None` when the user cannot afford it.
    pub fn remove_points(
        &self,
        user_id: u64,
        guild_id: u64,
        amount: i64,
    ) -> anyhow::Result<Option<i64>> {
        anyhow::ensure!(amount >= 0, "cannot debit a negative amount ({})", amount);
        debug!("Database: Debiting {} points from {} in {}", amount, user_id, guild_id);
        let conn = self.conn()?;
        let balance = conn
            .query_row(
                "UPDATE users SET points = points - ?3
                 WHERE user_id = ?1 AND guild_id = ?2 AND points >= ?3
                 RETURNING points",
                (user_id.to_string(), guild_id.to_string(), amount),
                |row| row.get(0),
            )
            .optional()?;
        Ok(balance)
    }

    pub fn record_daily(
        &self,
        user_id: u64,
        guild_id: u64,
        amount: i64,
        streak: i64,
        at: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        let balance = conn.query_row(
            "INSERT INTO users (user_id, guild_id, points, daily_streak, last_daily)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, guild_id) DO UPDATE SET
                points = points + excluded.points,
                daily_streak = excluded.daily_streak,
                last_daily = excluded.last_daily
             RETURNING points",
            params![
                user_id.to_string(),
                guild_id.to_string(),
                amount,
                streak,
                at.timestamp_millis()
            ],
            |row| row.get(0),
        )?;
        Ok(balance)
    }

    pub fn record_roll(
        &self,
        user_id: u64,
        guild_id: u64,
        winnings: i64,
        at: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        let balance = conn.query_row(
            "INSERT INTO users (user_id, guild_id, points, last_roll) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, guild_id) DO UPDATE SET
                points = points + excluded.points,
                last_roll = excluded.last_roll
             RETURNING points",
            params![
                user_id.to_string(),
                guild_id.to_string(),
                winnings,
                at.timestamp_millis()
            ],
            |row| row.get(0),
        )?;
        Ok(balance)
    }

    pub fn top_users(&self, guild_id: u64, limit: usize) -> anyhow::Result<Vec<UserRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, guild_id, points, daily_streak, last_daily, last_roll
             FROM users WHERE guild_id = ?1 ORDER BY points DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map((guild_id.to_string(), limit), map_user)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // --- Ads ---

    pub fn insert_ad(&self, ad: &NewAd) -> anyhow::Result<i64> {
        let message_ids = serde_json::to_string(&ad.message_ids)?;
        let channels = serde_json::to_string(&ad.channels_posted_in)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO ads (user_id, guild_id, title, content, message_ids, channels_posted_in,
                              cost, status, was_booster, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                ad.user_id.to_string(),
                ad.guild_id.to_string(),
                ad.title,
                ad.content,
                message_ids,
                channels,
                ad.cost,
                AdStatus::Active.as_str(),
                ad.was_booster,
                ad.created_at.timestamp_millis()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn latest_ad_for_user(
        &self,
        user_id: u64,
        guild_id: u64,
    ) -> anyhow::Result<Option<AdRecord>> {
        let conn = self.conn()?;
        let ad = conn
            .query_row(
                &format!(
                    "{AD_COLUMNS} WHERE user_id = ?1 AND guild_id = ?2 ORDER BY created_at DESC LIMIT 1"
                ),
                (user_id.to_string(), guild_id.to_string()),
                map_ad,
            )
            .optional()?;
        Ok(ad)
    }

    pub fn latest_ad_in_guild(&self, guild_id: u64) -> anyhow::Result<Option<AdRecord>> {
        let conn = self.conn()?;
        let ad = conn
            .query_row(
                &format!("{AD_COLUMNS} WHERE guild_id = ?1 ORDER BY created_at DESC LIMIT 1"),
                [guild_id.to_string()],
                map_ad,
            )
            .optional()?;
        Ok(ad)
    }

    /// Marks the active ad that posted `message_id` as deleted.
    pub fn mark_ad_deleted(&self, message_id: u64) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE ads SET status = ?1
             WHERE status = ?2
               AND EXISTS (SELECT 1 FROM json_each(ads.message_ids) WHERE json_each.value = ?3)",
            params![
                AdStatus::Deleted.as_str(),
                AdStatus::Active.as_str(),
                message_id as i64
            ],
        )?;
        Ok(updated > 0)
    }

    // --- Suggestions ---

    pub fn insert_suggestion(&self, suggestion: &NewSuggestion) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO suggestions (message_id, thread_id, user_id, guild_id, title, content,
                                      status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                suggestion.message_id.to_string(),
                suggestion.thread_id.to_string(),
                suggestion.user_id.to_string(),
                suggestion.guild_id.to_string(),
                suggestion.title,
                suggestion.content,
                SuggestionStatus::Pending.as_str(),
                suggestion.created_at.timestamp_millis()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_suggestion_by_thread(
        &self,
        thread_id: u64,
    ) -> anyhow::Result<Option<SuggestionRecord>> {
        let conn = self.conn()?;
        let suggestion = conn
            .query_row(
                &format!("{SUGGESTION_COLUMNS} WHERE thread_id = ?1"),
                [thread_id.to_string()],
                map_suggestion,
            )
            .optional()?;
        Ok(suggestion)
    }

    pub fn get_suggestion_by_message(
        &self,
        message_id: u64,
    ) -> anyhow::Result<Option<SuggestionRecord>> {
        let conn = self.conn()?;
        let suggestion = conn
            .query_row(
                &format!("{SUGGESTION_COLUMNS} WHERE message_id = ?1"),
                [message_id.to_string()],
                map_suggestion,
            )
            .optional()?;
        Ok(suggestion)
    }

    /// Moves a pending suggestion to `status`. Returns false if it was already resolved.
    pub fn resolve_suggestion(&self, id: i64, status: SuggestionStatus) -> anyhow::Result<bool> {
        anyhow::ensure!(
            status != SuggestionStatus::Pending,
            "a suggestion cannot be resolved back to pending"
        );
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE suggestions SET status = ?1 WHERE id = ?2 AND status = 'pending'",
            (status.as_str(), id),
        )?;
        Ok(updated > 0)
    }

    pub fn adjust_votes(&self, message_id: u64, up: i64, down: i64) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE suggestions
             SET upvotes = MAX(upvotes + ?2, 0), downvotes = MAX(downvotes + ?3, 0)
             WHERE message_id = ?1",
            (message_id.to_string(), up, down),
        )?;
        Ok(updated > 0)
    }

    // --- Warnings ---

    pub fn add_warning(
        &self,
        user_id: u64,
        guild_id: u64,
        moderator_id: &str,
        reason: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO warnings (user_id, guild_id, moderator_id, reason, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                user_id.to_string(),
                guild_id.to_string(),
                moderator_id,
                reason,
                created_at.timestamp_millis(),
                expires_at.timestamp_millis(),
            ),
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Returns unexpired warnings and deletes the user's expired ones.
    pub fn active_warnings(
        &self,
        user_id: u64,
        guild_id: u64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<WarningRecord>> {
        let conn = self.conn()?;
        let now_ms = now.timestamp_millis();

        let purged = conn.execute(
            "DELETE FROM warnings WHERE user_id = ?1 AND guild_id = ?2 AND expires_at <= ?3",
            (user_id.to_string(), guild_id.to_string(), now_ms),
        )?;
        if purged > 0 {
            debug!("Database: Purged {} expired warnings for {}", purged, user_id);
        }

        let mut stmt = conn.prepare(
            "SELECT id, user_id, guild_id, moderator_id, reason, created_at, expires_at
             FROM warnings WHERE user_id = ?1 AND guild_id = ?2 AND expires_at > ?3
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map((user_id.to_string(), guild_id.to_string(), now_ms), |row| {
            Ok(WarningRecord {
                id: row.get(0)?,
                user_id: snowflake(row, 1)?,
                guild_id: snowflake(row, 2)?,
                moderator_id: row.get(3)?,
                reason: row.get(4)?,
                created_at: millis_to_utc(row.get(5)?),
                expires_at: millis_to_utc(row.get(6)?),
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // --- Mutes ---

    /// Inserts or replaces the mute for `(guild_id, user_id)`.
    pub fn upsert_mute(&self, mute: &MuteRecord) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO mutes (guild_id, user_id, reason, moderator_id, duration_hours, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(guild_id, user_id) DO UPDATE SET
                reason = excluded.reason,
                moderator_id = excluded.moderator_id,
                duration_hours = excluded.duration_hours,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at",
            params![
                mute.guild_id.to_string(),
                mute.user_id.to_string(),
                mute.reason,
                mute.moderator_id.to_string(),
                mute.duration_hours,
                mute.created_at.timestamp_millis(),
                mute.expires_at.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    pub fn get_mute(&self, guild_id: u64, user_id: u64) -> anyhow::Result<Option<MuteRecord>> {
        let conn = self.conn()?;
        let mute = conn
            .query_row(
                &format!("{MUTE_COLUMNS} WHERE guild_id = ?1 AND user_id = ?2"),
                (guild_id.to_string(), user_id.to_string()),
                map_mute,
            )
            .optional()?;
        Ok(mute)
    }

    pub fn remove_mute(&self, guild_id: u64, user_id: u64) -> anyhow::Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM mutes WHERE guild_id = ?1 AND user_id = ?2",
            (guild_id.to_string(), user_id.to_string()),
        )?;
        Ok(deleted)
    }

    pub fn list_mutes(&self) -> anyhow::Result<Vec<MuteRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{MUTE_COLUMNS} ORDER BY expires_at ASC"))?;
        let rows = stmt.query_map([], map_mute)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // --- Ticket closures ---

    pub fn schedule_closure(&self, closure: &TicketClosureRecord) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO ticket_closures (channel_id, guild_id, close_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(channel_id) DO UPDATE SET guild_id = excluded.guild_id, close_at = excluded.close_at",
            (
                closure.channel_id.to_string(),
                closure.guild_id.to_string(),
                closure.close_at.timestamp_millis(),
            ),
        )?;
        Ok(())
    }

    pub fn get_closure(&self, channel_id: u64) -> anyhow::Result<Option<TicketClosureRecord>> {
        let conn = self.conn()?;
        let closure = conn
            .query_row(
                "SELECT channel_id, guild_id, close_at FROM ticket_closures WHERE channel_id = ?1",
                [channel_id.to_string()],
                map_closure,
            )
            .optional()?;
        Ok(closure)
    }

    pub fn cancel_closure(&self, channel_id: u64) -> anyhow::Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM ticket_closures WHERE channel_id = ?1",
            [channel_id.to_string()],
        )?;
        Ok(deleted)
    }

    pub fn list_closures(&self) -> anyhow::Result<Vec<TicketClosureRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT channel_id, guild_id, close_at FROM ticket_closures ORDER BY close_at ASC",
        )?;
        let rows = stmt.query_map([], map_closure)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // --- Ticket inactivity alerts ---

    /// Stores the alert for a ticket, replacing any earlier one.
    pub fn upsert_alert(&self, alert: &TicketAlertRecord) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO ticket_alerts (channel_id, guild_id, alert_message_id, requested_by, close_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(channel_id) DO UPDATE SET
                guild_id = excluded.guild_id,
                alert_message_id = excluded.alert_message_id,
                requested_by = excluded.requested_by,
                close_at = excluded.close_at",
            (
                alert.channel_id.to_string(),
                alert.guild_id.to_string(),
                alert.alert_message_id.to_string(),
                alert.requested_by.to_string(),
                alert.close_at.timestamp_millis(),
            ),
        )?;
        Ok(())
    }

    pub fn get_alert(&self, channel_id: u64) -> anyhow::Result<Option<TicketAlertRecord>> {
        let conn = self.conn()?;
        let alert = conn
            .query_row(
                &format!("{ALERT_COLUMNS} WHERE channel_id = ?1"),
                [channel_id.to_string()],
                map_alert,
            )
            .optional()?;
        Ok(alert)
    }

    pub fn remove_alert(&self, channel_id: u64) -> anyhow::Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM ticket_alerts WHERE channel_id = ?1",
            [channel_id.to_string()],
        )?;
        Ok(deleted)
    }

    pub fn list_alerts(&self) -> anyhow::Result<Vec<TicketAlertRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{ALERT_COLUMNS} ORDER BY close_at ASC"))?;
        let rows = stmt.query_map([], map_alert)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // --- Bans & link logs ---

    pub fn add_ban(
        &self,
        user_id: u64,
        guild_id: u64,
        moderator_id: u64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO bans (user_id, guild_id, moderator_id, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (
                user_id.to_string(),
                guild_id.to_string(),
                moderator_id.to_string(),
                reason,
                at.timestamp_millis(),
            ),
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn count_bans(&self, user_id: u64, guild_id: u64) -> anyhow::Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM bans WHERE user_id = ?1 AND guild_id = ?2",
            (user_id.to_string(), guild_id.to_string()),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn add_link_log(
        &self,
        user_id: u64,
        guild_id: u64,
        channel_id: u64,
        content: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO link_logs (user_id, guild_id, channel_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (
                user_id.to_string(),
                guild_id.to_string(),
                channel_id.to_string(),
                content,
                at.timestamp_millis(),
            ),
        )?;
        Ok(conn.last_insert_rowid())
    }
}

const AD_COLUMNS: &str = "SELECT id, user_id, guild_id, title, content, message_ids, channels_posted_in,
        cost, status, was_booster, created_at FROM ads";

const SUGGESTION_COLUMNS: &str = "SELECT id, message_id, thread_id, user_id, guild_id, title, content,
        status, upvotes, downvotes, created_at FROM suggestions";

const MUTE_COLUMNS: &str = "SELECT guild_id, user_id, reason, moderator_id, duration_hours,
        created_at, expires_at FROM mutes";

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        user_id: snowflake(row, 0)?,
        guild_id: snowflake(row, 1)?,
        points: row.get(2)?,
        daily_streak: row.get(3)?,
        last_daily: row.get::<_, Option<i64>>(4)?.map(millis_to_utc),
        last_roll: row.get::<_, Option<i64>>(5)?.map(millis_to_utc),
    })
}

fn map_ad(row: &Row<'_>) -> rusqlite::Result<AdRecord> {
    Ok(AdRecord {
        id: row.get(0)?,
        user_id: snowflake(row, 1)?,
        guild_id: snowflake(row, 2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        message_ids: json_ids(row, 5)?,
        channels_posted_in: json_ids(row, 6)?,
        cost: row.get(7)?,
        status: parse_text(row, 8)?,
        was_booster: row.get(9)?,
        created_at: millis_to_utc(row.get(10)?),
    })
}

fn map_suggestion(row: &Row<'_>) -> rusqlite::Result<SuggestionRecord> {
    Ok(SuggestionRecord {
        id: row.get(0)?,
        message_id: snowflake(row, 1)?,
        thread_id: snowflake(row, 2)?,
        user_id: snowflake(row, 3)?,
        guild_id: snowflake(row, 4)?,
        title: row.get(5)?,
        content: row.get(6)?,
        status: parse_text(row, 7)?,
        upvotes: row.get(8)?,
        downvotes: row.get(9)?,
        created_at: millis_to_utc(row.get(10)?),
    })
}

fn map_mute(row: &Row<'_>) -> rusqlite::Result<MuteRecord> {
    Ok(MuteRecord {
        guild_id: snowflake(row, 0)?,
        user_id: snowflake(row, 1)?,
        reason: row.get(2)?,
        moderator_id: snowflake(row, 3)?,
        duration_hours: row.get(4)?,
        created_at: millis_to_utc(row.get(5)?),
        expires_at: millis_to_utc(row.get(6)?),
    })
}

fn map_closure(row: &Row<'_>) -> rusqlite::Result<TicketClosureRecord> {
    Ok(TicketClosureRecord {
        channel_id: snowflake(row, 0)?,
        guild_id: snowflake(row, 1)?,
        close_at: millis_to_utc(row.get(2)?),
    })
}

const ALERT_COLUMNS: &str =
    "SELECT channel_id, guild_id, alert_message_id, requested_by, close_at FROM ticket_alerts";

fn map_alert(row: &Row<'_>) -> rusqlite::Result<TicketAlertRecord> {
    Ok(TicketAlertRecord {
        channel_id: snowflake(row, 0)?,
        guild_id: snowflake(row, 1)?,
        alert_message_id: snowflake(row, 2)?,
        requested_by: snowflake(row, 3)?,
        close_at: millis_to_utc(row.get(4)?),
    })
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn snowflake(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn json_ids(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<u64>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn parse_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = anyhow::Error>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: anyhow::Error| conversion_error(idx, std::io::Error::other(e.to_string())))
}

pub fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn test_db() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        db
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_init_is_idempotent() {
        let db = test_db();
        db.execute_init().unwrap();
        assert!(db.get_user(1, 2).unwrap().is_none());
    }

    #[test]
    fn test_points_upsert_and_debit() {
        let db = test_db();

        assert_eq!(db.add_points(1, 100, 5).unwrap(), 5);
        assert_eq!(db.add_points(1, 100, 3).unwrap(), 8);
        // Same user in another guild is a separate record
        assert_eq!(db.add_points(1, 200, 1).unwrap(), 1);

        assert_eq!(db.remove_points(1, 100, 8).unwrap(), Some(0));
        let user = db.get_user(1, 100).unwrap().unwrap();
        assert_eq!(user.points, 0);
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let db = test_db();
        db.add_points(1, 100, 10).unwrap();

        assert_eq!(db.remove_points(1, 100, 11).unwrap(), None);
        assert_eq!(db.get_user(1, 100).unwrap().unwrap().points, 10);

        // Unknown user cannot be debited either
        assert_eq!(db.remove_points(2, 100, 1).unwrap(), None);
        assert!(db.get_user(2, 100).unwrap().is_none());

        assert!(db.add_points(1, 100, -5).is_err());
    }

    #[test]
    fn test_daily_and_roll_tracking() {
        let db = test_db();
        assert_eq!(db.record_daily(1, 100, 10, 1, at(8)).unwrap(), 10);
        assert_eq!(db.record_roll(1, 100, 0, at(9)).unwrap(), 10);
        assert_eq!(db.record_daily(1, 100, 12, 2, at(10)).unwrap(), 22);

        let user = db.get_user(1, 100).unwrap().unwrap();
        assert_eq!(user.daily_streak, 2);
        assert_eq!(user.last_daily, Some(at(10)));
        assert_eq!(user.last_roll, Some(at(9)));
    }

    #[test]
    fn test_top_users_ordering() {
        let db = test_db();
        db.add_points(1, 100, 5).unwrap();
        db.add_points(2, 100, 50).unwrap();
        db.add_points(3, 100, 20).unwrap();
        db.add_points(4, 200, 999).unwrap();

        let top = db.top_users(100, 2).unwrap();
        let ids: Vec<u64> = top.iter().map(|u| u.user_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_ads_latest_and_status() {
        let db = test_db();
        let ad = |user_id, hour| NewAd {
            user_id,
            guild_id: 100,
            title: format!("ad-{user_id}-{hour}"),
            content: "content".to_string(),
            message_ids: vec![11, 12],
            channels_posted_in: vec![21, 22],
            cost: 50,
            was_booster: false,
            created_at: at(hour),
        };

        db.insert_ad(&ad(1, 8)).unwrap();
        let id = db.insert_ad(&ad(2, 10)).unwrap();
        db.insert_ad(&ad(1, 9)).unwrap();

        let mine = db.latest_ad_for_user(1, 100).unwrap().unwrap();
        assert_eq!(mine.title, "ad-1-9");
        assert_eq!(mine.message_ids, vec![11, 12]);
        assert_eq!(mine.status, AdStatus::Active);

        let latest = db.latest_ad_in_guild(100).unwrap().unwrap();
        assert_eq!(latest.id, id);
        assert!(db.latest_ad_in_guild(999).unwrap().is_none());

        assert!(!db.mark_ad_deleted(99).unwrap());
        assert!(db.mark_ad_deleted(12).unwrap());
        // All three share message ids, so none is left active
        assert!(!db.mark_ad_deleted(11).unwrap());
        let mine = db.latest_ad_for_user(1, 100).unwrap().unwrap();
        assert_eq!(mine.status, AdStatus::Deleted);
        let latest = db.latest_ad_in_guild(100).unwrap().unwrap();
        assert_eq!(latest.status, AdStatus::Deleted);
        assert!(latest.is_expired(at(10) + Duration::days(8)));
        assert!(!latest.is_expired(at(10) + Duration::days(6)));
    }

    #[test]
    fn test_suggestion_resolves_once() {
        let db = test_db();
        let id = db
            .insert_suggestion(&NewSuggestion {
                message_id: 1,
                thread_id: 2,
                user_id: 3,
                guild_id: 4,
                title: "More games".to_string(),
                content: "Add a trivia night".to_string(),
                created_at: at(8),
            })
            .unwrap();

        let suggestion = db.get_suggestion_by_thread(2).unwrap().unwrap();
        assert_eq!(suggestion.id, id);
        assert_eq!(suggestion.status, SuggestionStatus::Pending);

        assert!(db.resolve_suggestion(id, SuggestionStatus::Accepted).unwrap());
        assert!(!db.resolve_suggestion(id, SuggestionStatus::Denied).unwrap());
        assert!(db.resolve_suggestion(id, SuggestionStatus::Pending).is_err());

        let suggestion = db.get_suggestion_by_message(1).unwrap().unwrap();
        assert_eq!(suggestion.status, SuggestionStatus::Accepted);
    }

    #[test]
    fn test_votes_floor_at_zero() {
        let db = test_db();
        db.insert_suggestion(&NewSuggestion {
            message_id: 1,
            thread_id: 2,
            user_id: 3,
            guild_id: 4,
            title: "t".to_string(),
            content: "c".to_string(),
            created_at: at(8),
        })
        .unwrap();

        assert!(db.adjust_votes(1, 1, 0).unwrap());
        assert!(db.adjust_votes(1, 1, 0).unwrap());
        assert!(db.adjust_votes(1, 0, -1).unwrap());
        assert!(!db.adjust_votes(99, 1, 0).unwrap());

        let suggestion = db.get_suggestion_by_message(1).unwrap().unwrap();
        assert_eq!(suggestion.upvotes, 2);
        assert_eq!(suggestion.downvotes, 0);
    }

    #[test]
    fn test_active_warnings_purge_expired() {
        let db = test_db();
        db.add_warning(1, 100, "9", "spam", at(0), at(5)).unwrap();
        db.add_warning(1, 100, "9", "spam", at(1), at(12)).unwrap();
        db.add_warning(1, 200, "9", "spam", at(1), at(3)).unwrap();

        let active = db.active_warnings(1, 100, at(6)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].expires_at, at(12));

        // The expired one is gone even when looking back in time
        assert_eq!(db.active_warnings(1, 100, at(2)).unwrap().len(), 1);
        // Other guilds are untouched
        assert_eq!(db.active_warnings(1, 200, at(2)).unwrap().len(), 1);

    }

    #[test]
    fn test_mute_upsert_replaces() {
        let db = test_db();
        let mut mute = MuteRecord {
            guild_id: 100,
            user_id: 1,
            reason: "spam".to_string(),
            moderator_id: 9,
            duration_hours: 1,
            created_at: at(0),
            expires_at: at(1),
        };
        db.upsert_mute(&mute).unwrap();
        mute.expires_at = at(5);
        mute.duration_hours = 5;
        db.upsert_mute(&mute).unwrap();

        assert_eq!(db.list_mutes().unwrap(), vec![mute.clone()]);
        assert_eq!(db.get_mute(100, 1).unwrap(), Some(mute));
        assert_eq!(db.remove_mute(100, 1).unwrap(), 1);
        assert_eq!(db.remove_mute(100, 1).unwrap(), 0);
        assert!(db.get_mute(100, 1).unwrap().is_none());
    }

    #[test]
    fn test_closure_schedule_and_cancel() {
        let db = test_db();
        let closure = TicketClosureRecord {
            channel_id: 10,
            guild_id: 100,
            close_at: at(3),
        };
        db.schedule_closure(&closure).unwrap();
        db.schedule_closure(&TicketClosureRecord {
            close_at: at(4),
            ..closure.clone()
        })
        .unwrap();

        let stored = db.get_closure(10).unwrap().unwrap();
        assert_eq!(stored.close_at, at(4));
        assert_eq!(db.list_closures().unwrap().len(), 1);

        assert_eq!(db.cancel_closure(10).unwrap(), 1);
        assert!(db.get_closure(10).unwrap().is_none());
    }

    #[test]
    fn test_alert_replaces_and_clears() {
        let db = test_db();
        let alert = TicketAlertRecord {
            channel_id: 10,
            guild_id: 100,
            alert_message_id: 55,
            requested_by: 9,
            close_at: at(3),
        };
        db.upsert_alert(&alert).unwrap();
        db.upsert_alert(&TicketAlertRecord {
            alert_message_id: 56,
            close_at: at(5),
            ..alert.clone()
        })
        .unwrap();

        let stored = db.get_alert(10).unwrap().unwrap();
        assert_eq!(stored.alert_message_id, 56);
        assert_eq!(stored.close_at, at(5));
        assert_eq!(db.list_alerts().unwrap(), vec![stored]);

        // Alerts and scheduled closures are tracked apart
        assert!(db.get_closure(10).unwrap().is_none());

        assert_eq!(db.remove_alert(10).unwrap(), 1);
        assert_eq!(db.remove_alert(10).unwrap(), 0);
        assert!(db.list_alerts().unwrap().is_empty());
    }

    #[test]
    fn test_bans_and_link_logs() {
        let db = test_db();
        db.add_ban(1, 100, 9, "raiding", at(0)).unwrap();
        db.add_ban(1, 100, 9, "raiding again", at(1)).unwrap();
        assert_eq!(db.count_bans(1, 100).unwrap(), 2);
        assert_eq!(db.count_bans(1, 200).unwrap(), 0);

        assert!(db.add_link_log(1, 100, 5, "https://bad.example", at(0)).unwrap() > 0);
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let db = test_db();
        let balance = db
            .run_blocking(|db| db.add_points(7, 100, 3))
            .await
            .unwrap();
        assert_eq!(balance, 3);
    }
}
