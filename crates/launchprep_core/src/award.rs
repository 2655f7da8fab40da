//! Award primitive: the only writer of progression state.
//!
//! One call = one transaction covering the idempotence check, the ledger
//! append, the stage update, the user total, and the team aggregate. Either
//! all of it commits or none of it does, so a retry after any failure is
//! always safe.
//!
//! Idempotence is enforced by the primary key on
//! granted_achievements(user_id, achievement_key): a duplicate grant turns
//! into a zero-row insert and the call returns [`AwardOutcome::AlreadyGranted`]
//! without touching anything else. An in-memory "have I seen this key"
//! check would race against a concurrent trigger; the constraint cannot.

use crate::catalog;
use crate::error::{ProgressError, Result};
use crate::events::{Notification, NotificationSink};
use crate::store::ProgressStore;
use chrono::Utc;
use rusqlite::params;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Result of one award invocation
#[derive(Debug, Clone, PartialEq)]
pub enum AwardOutcome {
    /// The achievement was already granted; nothing was written
    AlreadyGranted,
    /// Points committed; `new_level` is set when the stage level moved
    Granted { points: i64, new_level: Option<u8> },
}

/// Progression engine: award primitive plus the state it mutates
#[derive(Clone)]
pub struct ProgressEngine {
    store: ProgressStore,
    sink: Arc<dyn NotificationSink>,
}

impl ProgressEngine {
    pub fn new(store: ProgressStore, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub(crate) fn notify(&self, user_id: Uuid, notification: Notification) {
        self.sink.emit(user_id, notification);
    }

    /// Grant an achievement exactly once.
    ///
    /// Unknown keys fail loudly; a missing stage row self-heals first. The
    /// stage level only ratchets upward, and only when the achievement's
    /// target level exceeds the stored one.
    pub fn award(&self, user_id: Uuid, achievement_key: &str) -> Result<AwardOutcome> {
        let achievement = catalog::achievement(achievement_key)
            .ok_or_else(|| ProgressError::UnknownAchievement(achievement_key.to_string()))?;

        // Heal a missing stage row before entering the write transaction
        let _ = self.store.stage_record(user_id, achievement.stage)?;

        let outcome = {
            let mut conn = self.store.conn();
            let tx = conn.transaction()?;
            let now = Utc::now();

            // Idempotence gate: the PK turns a duplicate into a no-op insert
            let granted = tx.execute(
                "INSERT OR IGNORE INTO granted_achievements
                     (user_id, achievement_key, stage, granted_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    user_id.to_string(),
                    achievement.key,
                    achievement.stage.as_str(),
                    now
                ],
            )?;
            if granted == 0 {
                // Nothing to roll back; no other statement ran
                debug!(%user_id, key = achievement.key, "achievement already granted");
                return Ok(AwardOutcome::AlreadyGranted);
            }

            let metadata = serde_json::json!({ "achievement_key": achievement.key });
            tx.execute(
                "INSERT INTO points_ledger
                     (id, user_id, points, reason, reason_display, stage, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    Uuid::new_v4().to_string(),
                    user_id.to_string(),
                    achievement.points,
                    achievement.key,
                    achievement.name,
                    achievement.stage.as_str(),
                    metadata.to_string(),
                    now
                ],
            )?;

            let stored_level: i64 = tx.query_row(
                "SELECT level FROM stage_progress WHERE user_id = ?1 AND stage = ?2",
                params![user_id.to_string(), achievement.stage.as_str()],
                |row| row.get(0),
            )?;
            let new_level = if i64::from(achievement.level) > stored_level {
                tx.execute(
                    "UPDATE stage_progress
                     SET level = ?3, points_earned = points_earned + ?4,
                         level_completed_at = ?5, updated_at = ?5
                     WHERE user_id = ?1 AND stage = ?2",
                    params![
                        user_id.to_string(),
                        achievement.stage.as_str(),
                        i64::from(achievement.level),
                        achievement.points,
                        now
                    ],
                )?;
                Some(achievement.level)
            } else {
                tx.execute(
                    "UPDATE stage_progress
                     SET points_earned = points_earned + ?3, updated_at = ?4
                     WHERE user_id = ?1 AND stage = ?2",
                    params![
                        user_id.to_string(),
                        achievement.stage.as_str(),
                        achievement.points,
                        now
                    ],
                )?;
                None
            };

            tx.execute(
                "UPDATE user_launch_status
                 SET total_points = total_points + ?2, updated_at = ?3
                 WHERE user_id = ?1",
                params![user_id.to_string(), achievement.points, now],
            )?;
            // Conditional SQL increment, never read-modify-write in the caller
            tx.execute(
                "UPDATE team_points SET total_points = total_points + ?1
                 WHERE team_id = (SELECT team_id FROM user_launch_status WHERE user_id = ?2)",
                params![achievement.points, user_id.to_string()],
            )?;

            tx.commit()?;
            AwardOutcome::Granted { points: achievement.points, new_level }
        };

        info!(
            %user_id,
            key = achievement.key,
            points = achievement.points,
            level = ?achievement.level,
            "achievement granted"
        );

        // Post-commit, fire-and-forget
        match &outcome {
            AwardOutcome::Granted { points, new_level: Some(level) } => self.sink.emit(
                user_id,
                Notification::LevelUp { stage: achievement.stage, level: *level, points: *points },
            ),
            AwardOutcome::Granted { points, new_level: None } => self.sink.emit(
                user_id,
                Notification::Achievement {
                    key: achievement.key.to_string(),
                    name: achievement.name.to_string(),
                    points: *points,
                },
            ),
            AwardOutcome::AlreadyGranted => {}
        }

        Ok(outcome)
    }

    /// Direct point grant outside the achievement catalog (ongoing rewards
    /// such as daily activity). Appends to the ledger and bumps the user and
    /// team totals in one transaction; no stage record is touched.
    pub fn grant_points(
        &self,
        user_id: Uuid,
        points: i64,
        reason: &str,
        reason_display: &str,
    ) -> Result<()> {
        {
            let mut conn = self.store.conn();
            let tx = conn.transaction()?;
            let now = Utc::now();

            tx.execute(
                "INSERT INTO points_ledger
                     (id, user_id, points, reason, reason_display, stage, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'ongoing', '{}', ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    user_id.to_string(),
                    points,
                    reason,
                    reason_display,
                    now
                ],
            )?;
            tx.execute(
                "UPDATE user_launch_status
                 SET total_points = total_points + ?2, updated_at = ?3
                 WHERE user_id = ?1",
                params![user_id.to_string(), points, now],
            )?;
            tx.execute(
                "UPDATE team_points SET total_points = total_points + ?1
                 WHERE team_id = (SELECT team_id FROM user_launch_status WHERE user_id = ?2)",
                params![points, user_id.to_string()],
            )?;
            tx.commit()?;
        }

        debug!(%user_id, points, reason, "points granted");
        self.sink
            .emit(user_id, Notification::Points { points, reason: reason.to_string() });
        Ok(())
    }
}
