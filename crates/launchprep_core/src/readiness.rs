//! Launch readiness gate.
//!
//! Pure predicate over the three stage levels, re-evaluated on demand from
//! current state. Crossing into readiness never launches by itself; launch
//! is a separate explicit one-way action.

use crate::award::ProgressEngine;
use crate::error::Result;
use crate::events::Notification;
use crate::model::{Stage, StageRecord, MAX_LEVEL};
use tracing::{info, warn};
use uuid::Uuid;

/// Minimum level per stage to be ready for launch
pub const READY_FUEL_LEVEL: u8 = 1;
pub const READY_BOOSTERS_LEVEL: u8 = 4;
pub const READY_GUIDANCE_LEVEL: u8 = 2;

/// Ready iff fuel >= 1, boosters >= 4 and guidance >= 2, simultaneously
pub fn is_ready_to_launch(fuel: u8, boosters: u8, guidance: u8) -> bool {
    fuel >= READY_FUEL_LEVEL && boosters >= READY_BOOSTERS_LEVEL && guidance >= READY_GUIDANCE_LEVEL
}

/// Readiness over loaded stage records (order-independent)
pub fn records_ready(records: &[StageRecord; 3]) -> bool {
    let level = |stage: Stage| {
        records
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| r.level)
            .unwrap_or(0)
    };
    is_ready_to_launch(level(Stage::Fuel), level(Stage::Boosters), level(Stage::Guidance))
}

/// Level-achievement points needed to satisfy the readiness gate:
/// fuel 1 (10) + boosters 1-4 (100) + guidance 1-2 (30)
pub fn minimum_points_to_launch() -> i64 {
    140
}

/// All levels in all stages
pub fn recommended_points_to_launch() -> i64 {
    450
}

/// Mean of the three stage progress percentages
pub fn overall_progress_percent(records: &[StageRecord; 3]) -> u8 {
    let sum: u16 = records
        .iter()
        .map(|r| r.level.min(MAX_LEVEL) as u16 * 100 / MAX_LEVEL as u16)
        .sum();
    (sum / 3) as u8
}

/// Result of an explicit launch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Launched,
    AlreadyLaunched,
    NotReady,
}

impl ProgressEngine {
    /// Whether the user currently satisfies the readiness gate
    pub fn is_ready_to_launch(&self, user_id: Uuid) -> Result<bool> {
        Ok(records_ready(&self.store().stage_records(user_id)?))
    }

    /// Explicit launch action: one-way `is_launched` transition, gated on
    /// readiness. Clearing onboarding-tour flags on the profile is the
    /// presentation layer's job, driven by the emitted notification.
    pub fn launch(&self, user_id: Uuid) -> Result<LaunchOutcome> {
        if !self.is_ready_to_launch(user_id)? {
            warn!(%user_id, "launch requested before readiness gate satisfied");
            return Ok(LaunchOutcome::NotReady);
        }
        if !self.store().mark_launched(user_id)? {
            return Ok(LaunchOutcome::AlreadyLaunched);
        }

        info!(%user_id, "user launched");
        self.notify(user_id, Notification::Launched);
        Ok(LaunchOutcome::Launched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use crate::store::ProgressStore;
    use std::sync::Arc;

    #[test]
    fn test_gate_truth_table() {
        assert!(is_ready_to_launch(1, 4, 2));
        assert!(is_ready_to_launch(5, 5, 5));
        // Any single stage below its threshold fails the gate
        assert!(!is_ready_to_launch(0, 4, 2));
        assert!(!is_ready_to_launch(1, 3, 2));
        assert!(!is_ready_to_launch(1, 4, 1));
        assert!(!is_ready_to_launch(0, 0, 0));
    }

    #[test]
    fn test_point_thresholds() {
        assert_eq!(minimum_points_to_launch(), 140);
        assert_eq!(recommended_points_to_launch(), 450);
    }

    fn engine() -> ProgressEngine {
        ProgressEngine::new(ProgressStore::open_in_memory().unwrap(), Arc::new(NullSink))
    }

    fn level_up(engine: &ProgressEngine, user: Uuid, keys: &[&str]) {
        for key in keys {
            engine.award(user, key).unwrap();
        }
    }

    #[test]
    fn test_launch_requires_readiness() {
        let engine = engine();
        let user = Uuid::new_v4();
        engine.store().init_user(user, Uuid::new_v4()).unwrap();

        assert_eq!(engine.launch(user).unwrap(), LaunchOutcome::NotReady);

        level_up(
            &engine,
            user,
            &[
                "fuel_first_document",
                "boosters_first_prompt",
                "boosters_first_visualization",
                "boosters_manual_report",
                "boosters_scheduled_report",
                "guidance_team_settings",
                "guidance_news_enabled",
            ],
        );
        assert!(engine.is_ready_to_launch(user).unwrap());

        assert_eq!(engine.launch(user).unwrap(), LaunchOutcome::Launched);
        assert_eq!(engine.launch(user).unwrap(), LaunchOutcome::AlreadyLaunched);
        assert!(engine.store().launch_status(user).unwrap().unwrap().is_launched);
    }

    #[test]
    fn test_readiness_does_not_auto_launch() {
        let engine = engine();
        let user = Uuid::new_v4();
        engine.store().init_user(user, Uuid::new_v4()).unwrap();

        level_up(
            &engine,
            user,
            &[
                "fuel_first_document",
                "boosters_scheduled_report",
                "guidance_news_enabled",
            ],
        );
        assert!(engine.is_ready_to_launch(user).unwrap());
        assert!(!engine.store().launch_status(user).unwrap().unwrap().is_launched);
    }

    #[test]
    fn test_overall_progress() {
        let engine = engine();
        let user = Uuid::new_v4();
        engine.store().init_user(user, Uuid::new_v4()).unwrap();
        engine.award(user, "fuel_basic_collection").unwrap(); // fuel level 3

        let records = engine.store().stage_records(user).unwrap();
        assert_eq!(overall_progress_percent(&records), 20); // (60 + 0 + 0) / 3
    }
}
