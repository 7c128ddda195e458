use crate::community::AdSettings;
use crate::db::{AdRecord, Database, NewAd};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::info;

pub const AD_COOLDOWN_HOURS: i64 = 24;
pub const BOOSTER_AD_COOLDOWN_HOURS: i64 = 12;

#[derive(Debug, Error)]
pub enum AdRejection {
    #[error("You need {required} points to post an advertisement.\nCurrent balance: {balance}")]
    InsufficientPoints { balance: i64, required: i64 },
    #[error("You can post another advertisement <t:{}:R>", .available_at.timestamp())]
    UserCooldown { available_at: DateTime<Utc> },
    #[error("Someone recently posted an ad. You can post <t:{}:R>", .available_at.timestamp())]
    GlobalCooldown { available_at: DateTime<Utc> },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub fn user_cooldown(is_booster: bool) -> Duration {
    if is_booster {
        Duration::hours(BOOSTER_AD_COOLDOWN_HOURS)
    } else {
        Duration::hours(AD_COOLDOWN_HOURS)
    }
}

/// Checks balance, then the poster's own cooldown, then the guild-wide one.
pub fn check_eligibility(
    settings: &AdSettings,
    balance: i64,
    last_own: Option<DateTime<Utc>>,
    last_any: Option<DateTime<Utc>>,
    is_booster: bool,
    now: DateTime<Utc>,
) -> Result<(), AdRejection> {
    if balance < settings.cost {
        return Err(AdRejection::InsufficientPoints {
            balance,
            required: settings.cost,
        });
    }

    if let Some(last) = last_own {
        let available_at = last + user_cooldown(is_booster);
        if available_at > now {
            return Err(AdRejection::UserCooldown { available_at });
        }
    }

    if let Some(last) = last_any {
        let available_at = last + Duration::seconds(settings.global_cooldown_secs);
        if available_at > now {
            return Err(AdRejection::GlobalCooldown { available_at });
        }
    }

    Ok(())
}

pub fn format_ad_content(community: &str, description: &str, how_to_join: &str) -> String {
    format!(
        "# {}\n\n### 📝 Description\n```\n{}\n```\n\n### 🔗 How to Join\n```\n{}\n```",
        community.trim(),
        description.trim(),
        how_to_join.trim()
    )
}

pub struct AdService {
    db: Database,
    settings: AdSettings,
}

impl AdService {
    pub fn new(db: Database, settings: AdSettings) -> Self {
        Self { db, settings }
    }

    pub async fn check(
        &self,
        user_id: u64,
        guild_id: u64,
        is_booster: bool,
        now: DateTime<Utc>,
    ) -> Result<(), AdRejection> {
        let (balance, last_own, last_any) = self
            .db
            .run_blocking(move |db| {
                let balance = db.get_user(user_id, guild_id)?.map(|u| u.points).unwrap_or(0);
                let last_own = db.latest_ad_for_user(user_id, guild_id)?;
                let last_any = db.latest_ad_in_guild(guild_id)?;
                Ok((balance, last_own, last_any))
            })
            .await?;

        check_eligibility(
            &self.settings,
            balance,
            last_own.map(|ad| ad.created_at),
            last_any.map(|ad| ad.created_at),
            is_booster,
            now,
        )
    }

    /// Takes the ad cost up front so a concurrent spend cannot overdraw.
    pub async fn reserve_cost(&self, user_id: u64, guild_id: u64) -> Result<i64, AdRejection> {
        let cost = self.settings.cost;
        let (debited, balance) = self
            .db
            .run_blocking(move |db| {
                let debited = db.remove_points(user_id, guild_id, cost)?;
                let balance = db.get_user(user_id, guild_id)?.map(|u| u.points).unwrap_or(0);
                Ok((debited, balance))
            })
            .await?;
        debited.ok_or(AdRejection::InsufficientPoints {
            balance,
            required: cost,
        })
    }

    pub async fn refund_cost(&self, user_id: u64, guild_id: u64) -> anyhow::Result<i64> {
        let cost = self.settings.cost;
        self.db
            .run_blocking(move |db| db.add_points(user_id, guild_id, cost))
            .await
    }

    pub async fn record(&self, ad: NewAd) -> anyhow::Result<i64> {
        let user_id = ad.user_id;
        let channels = ad.channels_posted_in.len();
        let id = self.db.run_blocking(move |db| db.insert_ad(&ad)).await?;
        info!("Ad {} by {} posted to {} channels", id, user_id, channels);
        Ok(id)
    }

    /// Flags the ad that posted `message_id`, if any, once that message is deleted.
    pub async fn message_deleted(&self, message_id: u64) -> anyhow::Result<bool> {
        let marked = self
            .db
            .run_blocking(move |db| db.mark_ad_deleted(message_id))
            .await?;
        if marked {
            info!("Ad message {} was deleted", message_id);
        }
        Ok(marked)
    }

    pub async fn latest_for_user(
        &self,
        user_id: u64,
        guild_id: u64,
    ) -> anyhow::Result<Option<AdRecord>> {
        self.db
            .run_blocking(move |db| db.latest_ad_for_user(user_id, guild_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AdSettings {
        AdSettings {
            cost: 50,
            global_cooldown_secs: 3600,
            ..AdSettings::default()
        }
    }

    #[test]
    fn test_balance_checked_first() {
        let now = Utc::now();
        let result = check_eligibility(&settings(), 49, Some(now), Some(now), false, now);
        assert!(matches!(
            result,
            Err(AdRejection::InsufficientPoints {
                balance: 49,
                required: 50
            })
        ));
    }

    #[test]
    fn test_user_cooldown_depends_on_boost() {
        let now = Utc::now();
        let last = now - Duration::hours(13);

        let result = check_eligibility(&settings(), 100, Some(last), None, false, now);
        match result {
            Err(AdRejection::UserCooldown { available_at }) => {
                assert_eq!(available_at, last + Duration::hours(24))
            }
            other => panic!("expected user cooldown, got {:?}", other),
        }
        assert!(check_eligibility(&settings(), 100, Some(last), None, true, now).is_ok());
    }

    #[test]
    fn test_global_cooldown() {
        let now = Utc::now();
        let recent = now - Duration::minutes(30);
        assert!(matches!(
            check_eligibility(&settings(), 100, None, Some(recent), false, now),
            Err(AdRejection::GlobalCooldown { .. })
        ));

        let old = now - Duration::minutes(61);
        assert!(check_eligibility(&settings(), 100, None, Some(old), false, now).is_ok());
    }

    #[test]
    fn test_rejection_messages() {
        let err = AdRejection::InsufficientPoints {
            balance: 3,
            required: 50,
        };
        assert!(err.to_string().contains("Current balance: 3"));
    }

    #[tokio::test]
    async fn test_reserve_and_refund() {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        db.add_points(1, 2, 60).unwrap();
        let service = AdService::new(db, settings());

        assert_eq!(service.reserve_cost(1, 2).await.unwrap(), 10);
        assert!(matches!(
            service.reserve_cost(1, 2).await,
            Err(AdRejection::InsufficientPoints { balance: 10, .. })
        ));
        assert_eq!(service.refund_cost(1, 2).await.unwrap(), 60);
    }
}
