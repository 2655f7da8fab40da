//! Daily activity tracker.
//!
//! A once-per-day gate in front of the award primitive: marks the user
//! active at most once per calendar day, maintains the streak counter, and
//! grants the fixed daily reward plus one-time streak achievements at the
//! 7 and 30 day thresholds.
//!
//! The streak counter is the one piece of state here that is not derived
//! from the ledger; the once-per-day date check keeps the two consistent.

use crate::award::ProgressEngine;
use crate::error::Result;
use chrono::{Days, NaiveDate, Utc};
use tracing::{debug, info};
use uuid::Uuid;

/// Points granted for each active day
pub const DAILY_ACTIVE_POINTS: i64 = 10;

/// Streak lengths that carry a one-time achievement
pub const STREAK_ACHIEVEMENTS: [(u32, &str); 2] =
    [(7, "ongoing_streak_7_days"), (30, "ongoing_streak_30_days")];

/// Result of a mark-active attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityOutcome {
    /// Already marked for this day; nothing written
    AlreadyActive,
    /// Day recorded; streak after the transition
    Marked { streak: u32 },
}

impl ProgressEngine {
    /// Mark the user active for today (UTC)
    pub fn mark_active_today(&self, user_id: Uuid) -> Result<ActivityOutcome> {
        self.mark_active_on(user_id, Utc::now().date_naive())
    }

    /// Date-injected variant of [`mark_active_today`].
    ///
    /// Same day: no-op. Consecutive day: streak + 1. Any gap: streak resets
    /// to 1. The daily reward is granted exactly once per recorded day.
    pub fn mark_active_on(&self, user_id: Uuid, today: NaiveDate) -> Result<ActivityOutcome> {
        let status = match self.store().launch_status(user_id)? {
            Some(status) => status,
            None => {
                debug!(%user_id, "no launch status, skipping activity mark");
                return Ok(ActivityOutcome::AlreadyActive);
            }
        };

        if status.last_active_date == Some(today) {
            return Ok(ActivityOutcome::AlreadyActive);
        }

        let yesterday = today.checked_sub_days(Days::new(1));
        let streak = if status.last_active_date.is_some() && status.last_active_date == yesterday {
            status.daily_streak + 1
        } else {
            1
        };

        // Persist date + streak first; the date is the once-per-day gate, so
        // a retry after a failed grant below cannot double-pay
        self.store().set_daily_activity(user_id, today, streak)?;
        self.grant_points(user_id, DAILY_ACTIVE_POINTS, "ongoing_daily_active", "Daily Active")?;

        for (threshold, key) in STREAK_ACHIEVEMENTS {
            if streak == threshold {
                // One-time; the achievement set makes a repeat a no-op
                self.award(user_id, key)?;
                info!(%user_id, streak, "streak achievement reached");
            }
        }

        debug!(%user_id, %today, streak, "marked active");
        Ok(ActivityOutcome::Marked { streak })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use crate::store::ProgressStore;
    use std::sync::Arc;

    fn engine() -> ProgressEngine {
        ProgressEngine::new(ProgressStore::open_in_memory().unwrap(), Arc::new(NullSink))
    }

    fn user_on(engine: &ProgressEngine) -> Uuid {
        let user = Uuid::new_v4();
        engine.store().init_user(user, Uuid::new_v4()).unwrap();
        user
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_same_day_is_noop() {
        let engine = engine();
        let user = user_on(&engine);

        let first = engine.mark_active_on(user, day("2026-08-01")).unwrap();
        assert_eq!(first, ActivityOutcome::Marked { streak: 1 });

        let second = engine.mark_active_on(user, day("2026-08-01")).unwrap();
        assert_eq!(second, ActivityOutcome::AlreadyActive);

        // Exactly one daily grant in the ledger
        assert_eq!(engine.store().ledger_sum(user, "ongoing").unwrap(), DAILY_ACTIVE_POINTS);
    }

    #[test]
    fn test_consecutive_day_increments_streak() {
        let engine = engine();
        let user = user_on(&engine);

        engine.mark_active_on(user, day("2026-08-01")).unwrap();
        let next = engine.mark_active_on(user, day("2026-08-02")).unwrap();
        assert_eq!(next, ActivityOutcome::Marked { streak: 2 });
    }

    #[test]
    fn test_gap_resets_streak() {
        let engine = engine();
        let user = user_on(&engine);

        engine.mark_active_on(user, day("2026-08-01")).unwrap();
        let after_gap = engine.mark_active_on(user, day("2026-08-03")).unwrap();
        assert_eq!(after_gap, ActivityOutcome::Marked { streak: 1 });

        let status = engine.store().launch_status(user).unwrap().unwrap();
        assert_eq!(status.daily_streak, 1);
        assert_eq!(status.last_active_date, Some(day("2026-08-03")));
    }

    #[test]
    fn test_seven_day_streak_achievement() {
        let engine = engine();
        let user = user_on(&engine);

        let mut date = day("2026-08-01");
        for expected in 1..=7u32 {
            let outcome = engine.mark_active_on(user, date).unwrap();
            assert_eq!(outcome, ActivityOutcome::Marked { streak: expected });
            date = date.succ_opt().unwrap();
        }

        let record = engine.store().stage_record(user, crate::model::Stage::Guidance).unwrap();
        assert!(record.achievements.contains("ongoing_streak_7_days"));
        // 7 daily grants + 25 streak points
        let status = engine.store().launch_status(user).unwrap().unwrap();
        assert_eq!(status.total_points, 7 * DAILY_ACTIVE_POINTS + 25);
    }

    #[test]
    fn test_streak_achievement_not_repeated_after_reset() {
        let engine = engine();
        let user = user_on(&engine);

        // First 7-day run
        let mut date = day("2026-08-01");
        for _ in 0..7 {
            engine.mark_active_on(user, date).unwrap();
            date = date.succ_opt().unwrap();
        }
        let points_after_first = engine.store().launch_status(user).unwrap().unwrap().total_points;

        // Break the streak, then run 7 more consecutive days
        let mut date = day("2026-09-01");
        for _ in 0..7 {
            engine.mark_active_on(user, date).unwrap();
            date = date.succ_opt().unwrap();
        }

        let status = engine.store().launch_status(user).unwrap().unwrap();
        // Second run pays daily points only, no second streak bonus
        assert_eq!(status.total_points, points_after_first + 7 * DAILY_ACTIVE_POINTS);
        assert_eq!(status.daily_streak, 7);
    }

    #[test]
    fn test_unknown_user_is_harmless() {
        let engine = engine();
        let outcome = engine.mark_active_on(Uuid::new_v4(), day("2026-08-01")).unwrap();
        assert_eq!(outcome, ActivityOutcome::AlreadyActive);
    }
}
