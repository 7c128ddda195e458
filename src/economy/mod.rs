//! Point economy rules: daily claims, rolls and passive message points.
//!
//! Everything here is pure over a caller-supplied clock and RNG; storage lives
//! in [`crate::services::points`].

pub mod blackjack;

use crate::community::PointsSettings;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use thiserror::Error;

pub const DAILY_COOLDOWN_HOURS: i64 = 24;
/// A claim within this many hours of the previous one continues the streak.
pub const STREAK_WINDOW_HOURS: i64 = 48;
pub const ROLL_COOLDOWN_HOURS: i64 = 24;
pub const BOOSTER_ROLL_COOLDOWN_HOURS: i64 = 12;
pub const ROLL_MIN_WIN: i64 = 1;
pub const ROLL_MAX_WIN: i64 = 5;

#[derive(Debug, Error)]
pub enum PointsError {
    #[error("daily already claimed, try again in {hours_left} hours")]
    DailyCooldown { hours_left: i64 },
    #[error("already rolled, try again in {hours_left} hours")]
    RollCooldown { hours_left: i64 },
    #[error("not enough points: have {balance}, need {required}")]
    InsufficientPoints { balance: i64, required: i64 },
    #[error("amount must be at least 1")]
    InvalidAmount,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyOutcome {
    pub base: i64,
    pub streak_bonus: i64,
    pub booster_bonus: i64,
    pub streak: i64,
}

impl DailyOutcome {
    pub fn total(&self) -> i64 {
        self.base + self.streak_bonus + self.booster_bonus
    }
}

/// Works out a daily claim, or the cooldown that blocks it.
pub fn plan_daily<R: Rng + ?Sized>(
    settings: &PointsSettings,
    last_daily: Option<DateTime<Utc>>,
    previous_streak: i64,
    is_booster: bool,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<DailyOutcome, PointsError> {
    let elapsed_hours = last_daily.map(|last| (now - last).num_hours());

    if let Some(hours) = elapsed_hours {
        if hours < DAILY_COOLDOWN_HOURS {
            return Err(PointsError::DailyCooldown {
                hours_left: DAILY_COOLDOWN_HOURS - hours,
            });
        }
    }

    let (streak, streak_bonus) = match elapsed_hours {
        Some(hours) if hours < STREAK_WINDOW_HOURS => (
            previous_streak + 1,
            random_between(rng, settings.streak_bonus_min, settings.streak_bonus_max),
        ),
        _ => (1, 0),
    };

    let booster_bonus = if is_booster {
        random_between(rng, settings.booster_bonus_min, settings.booster_bonus_max)
    } else {
        0
    };

    Ok(DailyOutcome {
        base: settings.daily_amount,
        streak_bonus,
        booster_bonus,
        streak,
    })
}

/// Points won by a roll; zero on a loss.
pub fn plan_roll<R: Rng + ?Sized>(
    settings: &PointsSettings,
    last_roll: Option<DateTime<Utc>>,
    is_booster: bool,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<i64, PointsError> {
    let cooldown = if is_booster {
        BOOSTER_ROLL_COOLDOWN_HOURS
    } else {
        ROLL_COOLDOWN_HOURS
    };

    if let Some(last) = last_roll {
        let remaining = last + Duration::hours(cooldown) - now;
        if remaining > Duration::zero() {
            // Round partial hours up so "0 hours" is never shown
            let hours_left = (remaining.num_seconds() + 3599) / 3600;
            return Err(PointsError::RollCooldown { hours_left });
        }
    }

    if rng.gen_bool(settings.roll_win_chance.clamp(0.0, 1.0)) {
        Ok(rng.gen_range(ROLL_MIN_WIN..=ROLL_MAX_WIN))
    } else {
        Ok(0)
    }
}

/// Whether a message that passed the cooldown earns a point.
pub fn message_earns_point<R: Rng + ?Sized>(settings: &PointsSettings, rng: &mut R) -> bool {
    rng.gen::<f64>() <= settings.message_chance
}

fn random_between<R: Rng + ?Sized>(rng: &mut R, min: i64, max: i64) -> i64 {
    if max <= min {
        return min;
    }
    rng.gen_range(min..=max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_first_daily_starts_streak() {
        let settings = PointsSettings::default();
        let mut rng = StdRng::seed_from_u64(1);

        let outcome = plan_daily(&settings, None, 0, false, now(), &mut rng).unwrap();
        assert_eq!(outcome.streak, 1);
        assert_eq!(outcome.streak_bonus, 0);
        assert_eq!(outcome.booster_bonus, 0);
        assert_eq!(outcome.total(), settings.daily_amount);
    }

    #[test]
    fn test_daily_cooldown_message_hours() {
        let settings = PointsSettings::default();
        let mut rng = StdRng::seed_from_u64(1);
        let last = now() - Duration::hours(5) - Duration::minutes(30);

        match plan_daily(&settings, Some(last), 3, false, now(), &mut rng) {
            Err(PointsError::DailyCooldown { hours_left }) => assert_eq!(hours_left, 19),
            other => panic!("expected cooldown, got {:?}", other),
        }
    }

    #[test]
    fn test_streak_window() {
        let settings = PointsSettings::default();
        let mut rng = StdRng::seed_from_u64(7);

        // 30h since last claim: inside the window
        let last = now() - Duration::hours(30);
        let outcome = plan_daily(&settings, Some(last), 4, false, now(), &mut rng).unwrap();
        assert_eq!(outcome.streak, 5);
        assert!(outcome.streak_bonus >= settings.streak_bonus_min);
        assert!(outcome.streak_bonus <= settings.streak_bonus_max);

        // 48h or more: streak resets
        let last = now() - Duration::hours(48);
        let outcome = plan_daily(&settings, Some(last), 4, false, now(), &mut rng).unwrap();
        assert_eq!(outcome.streak, 1);
        assert_eq!(outcome.streak_bonus, 0);
    }

    #[test]
    fn test_booster_daily_bonus() {
        let settings = PointsSettings::default();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..20 {
            let outcome = plan_daily(&settings, None, 0, true, now(), &mut rng).unwrap();
            assert!(outcome.booster_bonus >= settings.booster_bonus_min);
            assert!(outcome.booster_bonus <= settings.booster_bonus_max);
        }
    }

    #[test]
    fn test_roll_cooldown_rounds_up() {
        let settings = PointsSettings::default();
        let mut rng = StdRng::seed_from_u64(1);

        let last = now() - Duration::hours(23) - Duration::minutes(59);
        match plan_roll(&settings, Some(last), false, now(), &mut rng) {
            Err(PointsError::RollCooldown { hours_left }) => assert_eq!(hours_left, 1),
            other => panic!("expected cooldown, got {:?}", other),
        }

        // Boosters wait 12h
        let last = now() - Duration::hours(12);
        assert!(plan_roll(&settings, Some(last), true, now(), &mut rng).is_ok());
        assert!(plan_roll(&settings, Some(last), false, now(), &mut rng).is_err());
    }

    #[test]
    fn test_roll_winnings_range() {
        let mut settings = PointsSettings::default();
        let mut rng = StdRng::seed_from_u64(11);

        settings.roll_win_chance = 1.0;
        for _ in 0..50 {
            let won = plan_roll(&settings, None, false, now(), &mut rng).unwrap();
            assert!((ROLL_MIN_WIN..=ROLL_MAX_WIN).contains(&won));
        }

        settings.roll_win_chance = 0.0;
        assert_eq!(plan_roll(&settings, None, false, now(), &mut rng).unwrap(), 0);
    }

    #[test]
    fn test_message_point_chance_bounds() {
        let mut settings = PointsSettings::default();
        let mut rng = StdRng::seed_from_u64(5);

        settings.message_chance = 1.0;
        assert!((0..20).all(|_| message_earns_point(&settings, &mut rng)));
        settings.message_chance = -1.0;
        assert!((0..20).all(|_| !message_earns_point(&settings, &mut rng)));
    }
}
