//! Reconciliation loop: diff derived target state against stored state and
//! close the gap with the minimal set of awards.
//!
//! Two drivers feed the same award primitive:
//! - Resource-threshold driver (fuel): recompute the target level from
//!   document counts on every trigger and award each missing level in
//!   ascending order, so a count jump never skips a level.
//! - Task-event driver (boosters/guidance): each inbound completion signal
//!   is pre-mapped 1:1 to an achievement key; one award call per event.
//!
//! The loop holds no state between runs; everything is read fresh. Combined
//! with the award primitive's idempotence that makes repeated runs safe, and
//! the per-user single-flight guard keeps concurrent triggers (mount, manual
//! sync, change notification) from interleaving mid-run: a trigger that
//! finds a run in flight is skipped and the next trigger catches up.
//!
//! Failures are logged and degrade to "no progression change this cycle";
//! they never propagate past the loop.

use crate::award::{AwardOutcome, ProgressEngine};
use crate::catalog;
use crate::counts::ResourceObserver;
use crate::error::Result;
use crate::levels::{level_from_counts, meets_level_requirement};
use crate::model::Stage;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, TryLockError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What caused a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Progression screen mounted
    Mount,
    /// Explicit user-initiated "sync now"
    ManualSync,
    /// Row-level change notification from the resource observer
    ChangeNotification,
    /// Periodic daily sweep
    DailyCheck,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Trigger::Mount => "mount",
            Trigger::ManualSync => "manual_sync",
            Trigger::ChangeNotification => "change_notification",
            Trigger::DailyCheck => "daily_check",
        };
        f.write_str(s)
    }
}

/// Discrete completion signals from other subsystems, each pre-mapped to
/// exactly one achievement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    FirstPromptSent,
    VisualizationCreated,
    ManualReportGenerated,
    ScheduledReportCreated,
    AgentBuilt,
    TeamSettingsConfigured,
    NewsPreferencesEnabled,
    TeamMemberInvited,
    AiJobCreated,
    GuidanceDocCreated,
}

impl TaskEvent {
    /// The one achievement this event maps to
    pub fn achievement_key(&self) -> &'static str {
        match self {
            TaskEvent::FirstPromptSent => "boosters_first_prompt",
            TaskEvent::VisualizationCreated => "boosters_first_visualization",
            TaskEvent::ManualReportGenerated => "boosters_manual_report",
            TaskEvent::ScheduledReportCreated => "boosters_scheduled_report",
            TaskEvent::AgentBuilt => "boosters_first_agent",
            TaskEvent::TeamSettingsConfigured => "guidance_team_settings",
            TaskEvent::NewsPreferencesEnabled => "guidance_news_enabled",
            TaskEvent::TeamMemberInvited => "guidance_member_invited",
            TaskEvent::AiJobCreated => "guidance_first_job",
            TaskEvent::GuidanceDocCreated => "guidance_first_doc",
        }
    }
}

/// Outcome of one resource-driver run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Another run for this user was in flight; nothing done
    Skipped,
    /// Run completed; `levels_awarded` lists levels crossed this cycle
    Completed { stored_level: u8, target_level: u8, levels_awarded: Vec<u8> },
    /// Run stopped early on a transient failure; retried on next trigger
    Degraded,
}

/// Orchestrates observer + calculator + award primitive
pub struct Reconciler {
    engine: ProgressEngine,
    observer: Arc<dyn ResourceObserver>,
    /// Per-user single-flight guards
    in_flight: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Reconciler {
    pub fn new(engine: ProgressEngine, observer: Arc<dyn ResourceObserver>) -> Self {
        Self { engine, observer, in_flight: Mutex::new(HashMap::new()) }
    }

    pub fn engine(&self) -> &ProgressEngine {
        &self.engine
    }

    /// Resource-threshold driver for the fuel stage.
    ///
    /// At most one run per user is in flight; concurrent triggers are
    /// skipped rather than queued, because the next trigger re-reads
    /// everything fresh anyway.
    pub fn reconcile_fuel(&self, user_id: Uuid, team_id: Uuid, trigger: Trigger) -> ReconcileOutcome {
        let guard_slot = {
            let mut map = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(user_id).or_default().clone()
        };
        let _guard = match guard_slot.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                debug!(%user_id, %trigger, "reconciliation already in flight, skipping");
                return ReconcileOutcome::Skipped;
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        match self.run_fuel_locked(user_id, team_id, trigger) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(%user_id, %trigger, error = %err, "reconciliation cycle failed");
                ReconcileOutcome::Degraded
            }
        }
    }

    fn run_fuel_locked(
        &self,
        user_id: Uuid,
        team_id: Uuid,
        trigger: Trigger,
    ) -> Result<ReconcileOutcome> {
        let counts = self.observer.counts(team_id)?;
        let target_level = level_from_counts(&counts);
        let stored_level = self.engine.store().stage_record(user_id, Stage::Fuel)?.level;

        debug!(%user_id, %trigger, stored_level, target_level, ?counts, "fuel reconciliation");

        if target_level <= stored_level {
            // One-way ratchet: a lower target (recategorized or deleted
            // documents) never demotes
            return Ok(ReconcileOutcome::Completed {
                stored_level,
                target_level,
                levels_awarded: Vec::new(),
            });
        }

        let mut levels_awarded = Vec::new();
        for level in (stored_level + 1)..=target_level {
            // Confirm against the same counts before escalating; guards the
            // calculator against a partially-loaded read
            if !meets_level_requirement(level, &counts) {
                warn!(%user_id, level, "target level not confirmed by requirement check");
                break;
            }
            let key = catalog::key_for_level(Stage::Fuel, level)
                .ok_or(crate::error::ProgressError::CatalogGap { stage: Stage::Fuel, level })?;
            match self.engine.award(user_id, key)? {
                AwardOutcome::Granted { .. } => levels_awarded.push(level),
                // A concurrent run already granted this level; keep walking
                AwardOutcome::AlreadyGranted => {}
            }
        }

        if !levels_awarded.is_empty() {
            info!(%user_id, ?levels_awarded, "fuel stage leveled up");
        }
        Ok(ReconcileOutcome::Completed { stored_level, target_level, levels_awarded })
    }

    /// Task-event driver: one pre-mapped award per inbound event. Errors are
    /// logged and swallowed; the subsystem that produced the event retries
    /// by re-emitting on its next occurrence.
    pub fn handle_task_event(&self, user_id: Uuid, event: TaskEvent) -> Option<AwardOutcome> {
        let key = event.achievement_key();
        match self.engine.award(user_id, key) {
            Ok(outcome) => {
                debug!(%user_id, ?event, ?outcome, "task event handled");
                Some(outcome)
            }
            Err(err) => {
                warn!(%user_id, ?event, error = %err, "task event award failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counts::{ResourceObserver, SqliteResourceObserver};
    use crate::events::NullSink;
    use crate::store::ProgressStore;

    fn setup() -> (Arc<Reconciler>, Arc<SqliteResourceObserver>, Uuid, Uuid) {
        let store = ProgressStore::open_in_memory().unwrap();
        let engine = ProgressEngine::new(store.clone(), Arc::new(NullSink));
        let observer = Arc::new(SqliteResourceObserver::new(store));
        let reconciler = Arc::new(Reconciler::new(engine, observer.clone()));

        let user = Uuid::new_v4();
        let team = Uuid::new_v4();
        reconciler.engine().store().init_user(user, team).unwrap();
        (reconciler, observer, user, team)
    }

    fn add_documents(observer: &SqliteResourceObserver, team: Uuid, category: &str, n: u32) {
        for i in 0..n {
            observer.record_document(team, &format!("{category}-{i}"), category).unwrap();
        }
    }

    #[test]
    fn test_no_documents_no_awards() {
        let (reconciler, _, user, team) = setup();
        let outcome = reconciler.reconcile_fuel(user, team, Trigger::Mount);
        assert_eq!(
            outcome,
            ReconcileOutcome::Completed { stored_level: 0, target_level: 0, levels_awarded: vec![] }
        );
    }

    #[test]
    fn test_single_level_climb() {
        let (reconciler, observer, user, team) = setup();
        add_documents(&observer, team, "strategy", 1);

        let outcome = reconciler.reconcile_fuel(user, team, Trigger::ChangeNotification);
        assert_eq!(
            outcome,
            ReconcileOutcome::Completed { stored_level: 0, target_level: 1, levels_awarded: vec![1] }
        );
        assert_eq!(reconciler.engine().store().stage_record(user, Stage::Fuel).unwrap().level, 1);
    }

    #[test]
    fn test_count_jump_awards_every_level_in_order() {
        let (reconciler, observer, user, team) = setup();
        // Straight to level 5 territory in one observation
        add_documents(&observer, team, "strategy", 10);
        add_documents(&observer, team, "projects", 10);
        add_documents(&observer, team, "meetings", 100);
        add_documents(&observer, team, "financial", 10);

        let outcome = reconciler.reconcile_fuel(user, team, Trigger::ManualSync);
        assert_eq!(
            outcome,
            ReconcileOutcome::Completed {
                stored_level: 0,
                target_level: 5,
                levels_awarded: vec![1, 2, 3, 4, 5],
            }
        );

        // One achievement per level ever crossed, in the history
        let record = reconciler.engine().store().stage_record(user, Stage::Fuel).unwrap();
        assert_eq!(record.level, 5);
        assert_eq!(record.achievements.len(), 5);
        assert_eq!(record.points_earned, 150);
    }

    #[test]
    fn test_repeated_runs_are_idempotent() {
        let (reconciler, observer, user, team) = setup();
        add_documents(&observer, team, "strategy", 1);
        add_documents(&observer, team, "projects", 1);
        add_documents(&observer, team, "meetings", 1);
        add_documents(&observer, team, "financial", 1);

        reconciler.reconcile_fuel(user, team, Trigger::Mount);
        let second = reconciler.reconcile_fuel(user, team, Trigger::ManualSync);
        assert_eq!(
            second,
            ReconcileOutcome::Completed { stored_level: 2, target_level: 2, levels_awarded: vec![] }
        );
        assert_eq!(
            reconciler.engine().store().recent_ledger(user, 10).unwrap().len(),
            2
        );
    }

    #[test]
    fn test_count_decrease_never_demotes() {
        let (reconciler, observer, user, team) = setup();
        add_documents(&observer, team, "strategy", 1);
        add_documents(&observer, team, "projects", 1);
        add_documents(&observer, team, "meetings", 1);
        add_documents(&observer, team, "financial", 1);
        reconciler.reconcile_fuel(user, team, Trigger::Mount);

        // Recategorize the only financial document; counts drop below level 2
        observer.record_document(team, "financial-0", "meetings").unwrap();
        assert_eq!(observer.counts(team).unwrap().financial, 0);

        let outcome = reconciler.reconcile_fuel(user, team, Trigger::ChangeNotification);
        assert_eq!(
            outcome,
            ReconcileOutcome::Completed { stored_level: 2, target_level: 1, levels_awarded: vec![] }
        );
        assert_eq!(reconciler.engine().store().stage_record(user, Stage::Fuel).unwrap().level, 2);
    }

    #[test]
    fn test_concurrent_triggers_single_flight() {
        let (reconciler, observer, user, team) = setup();
        add_documents(&observer, team, "strategy", 10);
        add_documents(&observer, team, "projects", 10);
        add_documents(&observer, team, "meetings", 100);
        add_documents(&observer, team, "financial", 10);

        let mut handles = Vec::new();
        for _ in 0..6 {
            let reconciler = reconciler.clone();
            handles.push(std::thread::spawn(move || {
                reconciler.reconcile_fuel(user, team, Trigger::ChangeNotification)
            }));
        }
        let outcomes: Vec<ReconcileOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        // However the runs interleaved, the end state is exact
        let record = reconciler.engine().store().stage_record(user, Stage::Fuel).unwrap();
        assert_eq!(record.level, 5);
        assert_eq!(record.points_earned, 150);
        assert_eq!(reconciler.engine().store().recent_ledger(user, 20).unwrap().len(), 5);
        assert!(outcomes.iter().any(|o| matches!(o, ReconcileOutcome::Completed { .. })));
    }

    #[test]
    fn test_task_event_maps_to_single_award() {
        let (reconciler, _, user, _) = setup();

        let first = reconciler.handle_task_event(user, TaskEvent::VisualizationCreated);
        assert_eq!(first, Some(AwardOutcome::Granted { points: 20, new_level: Some(2) }));

        let second = reconciler.handle_task_event(user, TaskEvent::VisualizationCreated);
        assert_eq!(second, Some(AwardOutcome::AlreadyGranted));

        assert_eq!(reconciler.engine().store().stage_record(user, Stage::Boosters).unwrap().level, 2);
    }

    #[test]
    fn test_every_task_event_has_a_catalog_entry() {
        let events = [
            TaskEvent::FirstPromptSent,
            TaskEvent::VisualizationCreated,
            TaskEvent::ManualReportGenerated,
            TaskEvent::ScheduledReportCreated,
            TaskEvent::AgentBuilt,
            TaskEvent::TeamSettingsConfigured,
            TaskEvent::NewsPreferencesEnabled,
            TaskEvent::TeamMemberInvited,
            TaskEvent::AiJobCreated,
            TaskEvent::GuidanceDocCreated,
        ];
        for event in events {
            assert!(catalog::achievement(event.achievement_key()).is_some(), "{event:?}");
        }
    }
}
