use crate::community::PointsSettings;
use crate::db::{Database, UserRecord};
use crate::economy::{self, DailyOutcome, PointsError};
use chrono::{DateTime, Utc};
use tracing::info;

/// Balance snapshot shown to users; unknown users read as zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Standing {
    pub points: i64,
    pub daily_streak: i64,
}

impl From<UserRecord> for Standing {
    fn from(user: UserRecord) -> Self {
        Self {
            points: user.points,
            daily_streak: user.daily_streak,
        }
    }
}

pub struct PointsService {
    db: Database,
    settings: PointsSettings,
}

impl PointsService {
    pub fn new(db: Database, settings: PointsSettings) -> Self {
        Self { db, settings }
    }

    pub async fn standing(&self, user_id: u64, guild_id: u64) -> anyhow::Result<Standing> {
        let user = self
            .db
            .run_blocking(move |db| db.get_user(user_id, guild_id))
            .await?;
        Ok(user.map(Standing::from).unwrap_or_default())
    }

    /// Returns the claim breakdown and the new balance.
    pub async fn claim_daily(
        &self,
        user_id: u64,
        guild_id: u64,
        is_booster: bool,
        now: DateTime<Utc>,
    ) -> Result<(DailyOutcome, i64), PointsError> {
        let settings = self.settings.clone();
        let result = self
            .db
            .run_blocking(move |db| {
                let user = db.get_user(user_id, guild_id)?;
                let (last_daily, streak) = user
                    .map(|u| (u.last_daily, u.daily_streak))
                    .unwrap_or((None, 0));

                let outcome = match economy::plan_daily(
                    &settings,
                    last_daily,
                    streak,
                    is_booster,
                    now,
                    &mut rand::thread_rng(),
                ) {
                    Ok(outcome) => outcome,
                    Err(e) => return Ok(Err(e)),
                };

                let balance =
                    db.record_daily(user_id, guild_id, outcome.total(), outcome.streak, now)?;
                Ok(Ok((outcome, balance)))
            })
            .await??;

        info!(
            "User {} claimed daily in {}: +{} (streak {})",
            user_id,
            guild_id,
            result.0.total(),
            result.0.streak
        );
        Ok(result)
    }

    /// Returns the points won (0 on a loss) and the new balance.
    pub async fn roll(
        &self,
        user_id: u64,
        guild_id: u64,
        is_booster: bool,
        now: DateTime<Utc>,
    ) -> Result<(i64, i64), PointsError> {
        let settings = self.settings.clone();
        let result = self
            .db
            .run_blocking(move |db| {
                let last_roll = db.get_user(user_id, guild_id)?.and_then(|u| u.last_roll);
                let won = match economy::plan_roll(
                    &settings,
                    last_roll,
                    is_booster,
                    now,
                    &mut rand::thread_rng(),
                ) {
                    Ok(won) => won,
                    Err(e) => return Ok(Err(e)),
                };
                let balance = db.record_roll(user_id, guild_id, won, now)?;
                Ok(Ok((won, balance)))
            })
            .await??;
        Ok(result)
    }

    pub async fn give(&self, user_id: u64, guild_id: u64, amount: i64) -> Result<i64, PointsError> {
        if amount < 1 {
            return Err(PointsError::InvalidAmount);
        }
        let balance = self
            .db
            .run_blocking(move |db| db.add_points(user_id, guild_id, amount))
            .await?;
        Ok(balance)
    }

    /// Debits `amount`, failing without change if the balance is too low.
    pub async fn take(&self, user_id: u64, guild_id: u64, amount: i64) -> Result<i64, PointsError> {
        if amount < 1 {
            return Err(PointsError::InvalidAmount);
        }
        let (debited, balance) = self
            .db
            .run_blocking(move |db| {
                let debited = db.remove_points(user_id, guild_id, amount)?;
                let balance = db.get_user(user_id, guild_id)?.map(|u| u.points).unwrap_or(0);
                Ok((debited, balance))
            })
            .await?;

        debited.ok_or(PointsError::InsufficientPoints {
            balance,
            required: amount,
        })
    }

    pub async fn leaderboard(&self, guild_id: u64, limit: usize) -> anyhow::Result<Vec<UserRecord>> {
        self.db
            .run_blocking(move |db| db.top_users(guild_id, limit))
            .await
    }

    pub async fn award_message_point(&self, user_id: u64, guild_id: u64) -> anyhow::Result<i64> {
        self.db
            .run_blocking(move |db| db.add_points(user_id, guild_id, 1))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn service() -> PointsService {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        PointsService::new(db, PointsSettings::default())
    }

    #[tokio::test]
    async fn test_unknown_user_reads_as_zero() {
        let service = service();
        assert_eq!(service.standing(1, 2).await.unwrap(), Standing::default());
    }

    #[tokio::test]
    async fn test_take_beyond_balance_fails() {
        let service = service();
        service.give(1, 2, 10).await.unwrap();

        match service.take(1, 2, 15).await {
            Err(PointsError::InsufficientPoints { balance, required }) => {
                assert_eq!(balance, 10);
                assert_eq!(required, 15);
            }
            other => panic!("expected insufficient points, got {:?}", other),
        }
        assert_eq!(service.take(1, 2, 10).await.unwrap(), 0);
        assert_eq!(service.standing(1, 2).await.unwrap().points, 0);

        assert!(matches!(service.give(1, 2, 0).await, Err(PointsError::InvalidAmount)));
        assert!(matches!(service.take(1, 2, -3).await, Err(PointsError::InvalidAmount)));
    }

    #[tokio::test]
    async fn test_daily_claim_then_cooldown() {
        let service = service();
        let now = Utc::now();

        let (outcome, balance) = service.claim_daily(1, 2, false, now).await.unwrap();
        assert_eq!(outcome.streak, 1);
        assert_eq!(balance, 10);

        let again = service
            .claim_daily(1, 2, false, now + Duration::hours(2))
            .await;
        assert!(matches!(again, Err(PointsError::DailyCooldown { hours_left: 22 })));

        let (outcome, _) = service
            .claim_daily(1, 2, false, now + Duration::hours(25))
            .await
            .unwrap();
        assert_eq!(outcome.streak, 2);
        assert_eq!(service.standing(1, 2).await.unwrap().daily_streak, 2);
    }

    #[tokio::test]
    async fn test_roll_records_cooldown_even_on_loss() {
        let service = service();
        let now = Utc::now();

        service.roll(1, 2, false, now).await.unwrap();
        let again = service.roll(1, 2, false, now + Duration::hours(1)).await;
        assert!(matches!(again, Err(PointsError::RollCooldown { hours_left: 23 })));
    }
}
