use crate::community::{CommunityConfig, EmbedColors};
use crate::db::{Database, MuteRecord};
use crate::reply;
use crate::scheduler::{self, ExpiryScheduler};
use crate::services::moderation;
use anyhow::{anyhow, Context as _};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of lifting a mute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unmuted {
    Lifted,
    /// The member already left; only the stored record was cleared.
    MemberGone,
}

/// Applies, lifts and expires mutes: platform timeout, mute role, record and timer.
#[derive(Clone)]
pub struct MuteManager {
    http: Arc<serenity::Http>,
    db: Database,
    timers: ExpiryScheduler<(u64, u64)>,
    mute_role: Option<u64>,
    log_channel: Option<u64>,
    colors: EmbedColors,
}

impl MuteManager {
    pub fn new(http: Arc<serenity::Http>, db: Database, community: &CommunityConfig) -> Self {
        Self {
            http,
            db,
            timers: ExpiryScheduler::new("mute"),
            mute_role: community.roles.mute,
            log_channel: community.channels.mute_log,
            colors: community.embeds.clone(),
        }
    }

    pub async fn mute(&self, record: MuteRecord) -> anyhow::Result<()> {
        let guild_id = serenity::GuildId::new(record.guild_id);
        let user_id = serenity::UserId::new(record.user_id);
        let until = moderation::timeout_until(Utc::now(), record.expires_at - Utc::now());
        let until = serenity::Timestamp::from_unix_timestamp(until.timestamp())
            .map_err(|_| anyhow!("invalid timeout end {}", until))?;

        guild_id
            .edit_member(
                &*self.http,
                user_id,
                serenity::EditMember::new()
                    .disable_communication_until_datetime(until)
                    .audit_log_reason(&record.reason),
            )
            .await
            .with_context(|| format!("Failed to time out {}", user_id))?;

        if let Some(role) = self.mute_role {
            if let Err(e) = self
                .http
                .add_member_role(guild_id, user_id, serenity::RoleId::new(role), Some(&record.reason))
                .await
            {
                warn!("Failed to add mute role to {}: {}", user_id, e);
            }
        }

        let stored = record.clone();
        self.db
            .run_blocking(move |db| db.upsert_mute(&stored))
            .await?;
        self.arm(&record);

        info!(
            "Muted {} in {} until {} ({})",
            record.user_id, record.guild_id, record.expires_at, record.reason
        );
        Ok(())
    }

    pub async fn unmute(&self, guild_id: u64, user_id: u64, reason: &str) -> anyhow::Result<Unmuted> {
        let outcome = self.lift(guild_id, user_id, reason).await?;
        self.timers.disarm(&(guild_id, user_id));
        self.db
            .run_blocking(move |db| db.remove_mute(guild_id, user_id))
            .await?;
        info!("Unmuted {} in {} ({:?})", user_id, guild_id, outcome);
        Ok(outcome)
    }

    pub async fn is_muted(&self, guild_id: u64, user_id: u64) -> anyhow::Result<bool> {
        let mute = self
            .db
            .run_blocking(move |db| db.get_mute(guild_id, user_id))
            .await?;
        Ok(mute.is_some_and(|m| m.expires_at > Utc::now()))
    }

    /// Number of armed mute timers.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    pub fn arm(&self, record: &MuteRecord) {
        let manager = self.clone();
        let (guild_id, user_id) = (record.guild_id, record.user_id);
        self.timers.arm((guild_id, user_id), record.expires_at, move || async move {
            if let Err(e) = manager.expire(guild_id, user_id).await {
                error!("Mute expiry for {} in {} failed: {}", user_id, guild_id, e);
            }
        });
    }

    /// Re-arms every stored mute; already expired ones fire right away.
    pub async fn replay(&self) -> anyhow::Result<usize> {
        let mutes = self.db.run_blocking(|db| db.list_mutes()).await?;
        for mute in &mutes {
            self.arm(mute);
        }
        info!("Replayed {} mute timers", mutes.len());
        Ok(mutes.len())
    }

    async fn expire(&self, guild_id: u64, user_id: u64) -> anyhow::Result<()> {
        let due = self
            .db
            .run_blocking(move |db| db.get_mute(guild_id, user_id))
            .await?
            .map(|m| m.expires_at);
        if !scheduler::is_due(due, Utc::now()) {
            return Ok(());
        }

        // The record goes even when the platform refuses the lift
        match self.lift(guild_id, user_id, "Mute expired").await {
            Ok(outcome) => info!("Mute for {} in {} expired ({:?})", user_id, guild_id, outcome),
            Err(e) => error!("Failed to lift expired mute for {} in {}: {:?}", user_id, guild_id, e),
        }
        self.db
            .run_blocking(move |db| db.remove_mute(guild_id, user_id))
            .await?;

        reply::send_log(
            &self.http,
            self.log_channel,
            reply::embed(self.colors.accepted)
                .title("Mute Expired")
                .field("User", format!("<@{}>", user_id), true),
        )
        .await;
        Ok(())
    }

    async fn lift(&self, guild_id: u64, user_id: u64, reason: &str) -> anyhow::Result<Unmuted> {
        let guild = serenity::GuildId::new(guild_id);
        let user = serenity::UserId::new(user_id);

        match guild
            .edit_member(
                &*self.http,
                user,
                serenity::EditMember::new()
                    .enable_communication()
                    .audit_log_reason(reason),
            )
            .await
        {
            Ok(_) => {}
            Err(e) if reply::is_unknown_entity(&e) => return Ok(Unmuted::MemberGone),
            Err(e) => return Err(e).with_context(|| format!("Failed to lift timeout for {}", user)),
        }

        if let Some(role) = self.mute_role {
            if let Err(e) = self
                .http
                .remove_member_role(guild, user, serenity::RoleId::new(role), Some(reason))
                .await
            {
                warn!("Failed to remove mute role from {}: {}", user, e);
            }
        }
        Ok(Unmuted::Lifted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    /// A manager whose REST calls all fail to connect.
    fn offline_manager() -> (MuteManager, Database) {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        let http = serenity::HttpBuilder::new("offline")
            .proxy("http://127.0.0.1:9")
            .ratelimiter_disabled(true)
            .build();
        let manager = MuteManager::new(Arc::new(http), db.clone(), &CommunityConfig::default());
        (manager, db)
    }

    fn expired_mute() -> MuteRecord {
        let now = Utc::now();
        MuteRecord {
            guild_id: 100,
            user_id: 1,
            reason: "spam".to_string(),
            moderator_id: 9,
            duration_hours: 1,
            created_at: now - Duration::hours(2),
            expires_at: now - Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_expiry_clears_record_when_lift_fails() {
        let (manager, db) = offline_manager();
        db.upsert_mute(&expired_mute()).unwrap();

        manager.expire(100, 1).await.unwrap();

        assert!(db.get_mute(100, 1).unwrap().is_none());
        assert!(!manager.is_muted(100, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_unmute_keeps_record() {
        let (manager, db) = offline_manager();
        let mut record = expired_mute();
        record.expires_at = Utc::now() + Duration::hours(1);
        db.upsert_mute(&record).unwrap();

        assert!(manager.unmute(100, 1, "appeal").await.is_err());
        assert!(db.get_mute(100, 1).unwrap().is_some());
    }
}
