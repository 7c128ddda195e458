use crate::community::ModerationSettings;
use crate::db::{Database, MuteRecord, WarningRecord};
use anyhow::Context as _;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

/// Discord rejects communication timeouts longer than this.
pub const MAX_TIMEOUT_DAYS: i64 = 28;

/// Longest mute the bot will schedule.
pub const MAX_MUTE_DAYS: i64 = 365;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarnOutcome {
    pub warning_id: i64,
    pub active_count: usize,
    /// The new warning reached the configured threshold.
    pub auto_mute: bool,
}

/// Parses a mute length such as `90m`, `2h` or `1day 12h`.
/// A bare number is read as hours.
pub fn parse_mute_duration(input: &str) -> anyhow::Result<Duration> {
    let input = input.trim();
    let std = match input.parse::<u64>() {
        Ok(hours) => hours
            .checked_mul(3600)
            .map(std::time::Duration::from_secs)
            .context("duration out of range")?,
        Err(_) => humantime::parse_duration(input)
            .with_context(|| format!("'{}' is not a valid duration", input))?,
    };
    let duration = Duration::from_std(std).context("duration out of range")?;
    anyhow::ensure!(duration >= Duration::minutes(1), "duration must be at least one minute");
    anyhow::ensure!(
        duration <= Duration::days(MAX_MUTE_DAYS),
        "duration must be at most {} days",
        MAX_MUTE_DAYS
    );
    Ok(duration)
}

/// A configured mute length in hours, kept within `0..=MAX_MUTE_DAYS`.
pub fn configured_mute(hours: i64) -> Duration {
    Duration::hours(hours.clamp(0, MAX_MUTE_DAYS * 24))
}

/// Whole hours for display and storage, rounding partial hours up.
pub fn whole_hours(duration: Duration) -> i64 {
    (duration.num_minutes() + 59) / 60
}

/// The platform timeout to apply for a mute of `duration`; the role covers the rest.
pub fn timeout_until(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    now + duration.min(Duration::days(MAX_TIMEOUT_DAYS))
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0) as u64;
    humantime::format_duration(std::time::Duration::from_secs(secs)).to_string()
}

pub struct ModerationService {
    db: Database,
    settings: ModerationSettings,
}

impl ModerationService {
    pub fn new(db: Database, settings: ModerationSettings) -> Self {
        Self { db, settings }
    }

    /// Records a warning and reports whether the user crossed the auto-mute threshold.
    pub async fn warn(
        &self,
        user_id: u64,
        guild_id: u64,
        moderator: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<WarnOutcome> {
        let expires_at = now + Duration::days(self.settings.warning_expiration_days);
        let max_warnings = self.settings.max_warnings;
        let moderator = moderator.to_string();
        let reason = reason.to_string();

        let (warning_id, active) = self
            .db
            .run_blocking(move |db| {
                let id = db.add_warning(user_id, guild_id, &moderator, &reason, now, expires_at)?;
                let active = db.active_warnings(user_id, guild_id, now)?;
                Ok((id, active.len()))
            })
            .await?;

        info!(
            "Warning {} issued to {} in {} ({} active)",
            warning_id, user_id, guild_id, active
        );
        Ok(WarnOutcome {
            warning_id,
            active_count: active,
            auto_mute: max_warnings > 0 && active >= max_warnings,
        })
    }

    pub async fn active_warnings(
        &self,
        user_id: u64,
        guild_id: u64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<WarningRecord>> {
        self.db
            .run_blocking(move |db| db.active_warnings(user_id, guild_id, now))
            .await
    }

    pub async fn record_ban(
        &self,
        user_id: u64,
        guild_id: u64,
        moderator_id: u64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let reason = reason.to_string();
        self.db
            .run_blocking(move |db| db.add_ban(user_id, guild_id, moderator_id, &reason, now))
            .await
    }

    pub async fn previous_bans(&self, user_id: u64, guild_id: u64) -> anyhow::Result<usize> {
        self.db
            .run_blocking(move |db| db.count_bans(user_id, guild_id))
            .await
    }

    pub async fn record_link(
        &self,
        user_id: u64,
        guild_id: u64,
        channel_id: u64,
        content: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let content = content.to_string();
        self.db
            .run_blocking(move |db| db.add_link_log(user_id, guild_id, channel_id, &content, now))
            .await
    }

    pub fn auto_mute_duration(&self) -> Duration {
        configured_mute(self.settings.auto_mute_duration_hours)
    }
}

pub fn new_mute(
    guild_id: u64,
    user_id: u64,
    moderator_id: u64,
    reason: &str,
    duration: Duration,
    now: DateTime<Utc>,
) -> MuteRecord {
    let duration = duration.min(Duration::days(MAX_MUTE_DAYS));
    MuteRecord {
        guild_id,
        user_id,
        reason: reason.to_string(),
        moderator_id,
        duration_hours: whole_hours(duration),
        created_at: now,
        expires_at: now + duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(max_warnings: usize) -> ModerationService {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        ModerationService::new(
            db,
            ModerationSettings {
                max_warnings,
                ..ModerationSettings::default()
            },
        )
    }

    #[test]
    fn test_parse_mute_duration() {
        assert_eq!(parse_mute_duration("2").unwrap(), Duration::hours(2));
        assert_eq!(parse_mute_duration("90m").unwrap(), Duration::minutes(90));
        assert_eq!(
            parse_mute_duration("1day 12h").unwrap(),
            Duration::hours(36)
        );
        assert!(parse_mute_duration("soon").is_err());
        assert!(parse_mute_duration("10s").is_err());
    }

    #[test]
    fn test_oversized_mute_duration_is_rejected() {
        assert!(parse_mute_duration("6000000000000000").is_err());
        assert!(parse_mute_duration("100000000years").is_err());
        assert!(parse_mute_duration("366days").is_err());
        assert_eq!(
            parse_mute_duration("365days").unwrap(),
            Duration::days(MAX_MUTE_DAYS)
        );
    }

    #[test]
    fn test_configured_mute_is_clamped() {
        assert_eq!(configured_mute(24), Duration::hours(24));
        assert_eq!(configured_mute(i64::MAX), Duration::days(MAX_MUTE_DAYS));
        assert_eq!(configured_mute(-5), Duration::zero());

        let now = Utc::now();
        let mute = new_mute(100, 1, 9, "spam", Duration::days(10_000), now);
        assert_eq!(mute.expires_at, now + Duration::days(MAX_MUTE_DAYS));
    }

    #[test]
    fn test_hours_and_timeout_cap() {
        assert_eq!(whole_hours(Duration::minutes(90)), 2);
        assert_eq!(whole_hours(Duration::hours(3)), 3);

        let now = Utc::now();
        assert_eq!(timeout_until(now, Duration::hours(5)), now + Duration::hours(5));
        assert_eq!(
            timeout_until(now, Duration::days(60)),
            now + Duration::days(MAX_TIMEOUT_DAYS)
        );
        assert_eq!(format_duration(Duration::minutes(90)), "1h 30m");
    }

    #[tokio::test]
    async fn test_auto_mute_threshold() {
        let service = service(2);
        let now = Utc::now();

        let first = service.warn(1, 100, "9", "spam", now).await.unwrap();
        assert_eq!(first.active_count, 1);
        assert!(!first.auto_mute);

        let second = service.warn(1, 100, "9", "spam", now).await.unwrap();
        assert_eq!(second.active_count, 2);
        assert!(second.auto_mute);
    }

    #[tokio::test]
    async fn test_expired_warnings_do_not_count() {
        let service = service(2);
        let long_ago = Utc::now() - Duration::days(31);

        service.warn(1, 100, "9", "spam", long_ago).await.unwrap();
        let outcome = service.warn(1, 100, "9", "spam", Utc::now()).await.unwrap();
        assert_eq!(outcome.active_count, 1);
        assert!(!outcome.auto_mute);
    }

    #[test]
    fn test_new_mute_record() {
        let now = Utc::now();
        let mute = new_mute(100, 1, 9, "spam", Duration::minutes(30), now);
        assert_eq!(mute.duration_hours, 1);
        assert_eq!(mute.expires_at, now + Duration::minutes(30));
    }
}
