//! SQLite-backed progression store.
//!
//! Single connection behind a mutex, WAL mode, schema created idempotently
//! on open. All multi-step progression writes run inside one transaction on
//! this connection, which is what makes the award primitive atomic.
//!
//! Schema:
//! - user_launch_status: per-user rollup (points, launch flag, streak)
//! - stage_progress: one row per (user, stage), the leveling state
//! - granted_achievements: one row per grant; the PRIMARY KEY on
//!   (user_id, achievement_key) is the idempotence guarantee
//! - points_ledger: append-only grant history, source of truth for totals
//! - team_points: cached team aggregate, updated only by SQL increments
//! - documents: externally-synced document rows, read-only to this core

use crate::counts::DocumentCounts;
use crate::error::Result;
use crate::model::{
    PointsLedgerEntry, Stage, StagePointer, StageRecord, TeamAggregate, UserLaunchStatus,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Repairs applied by a drift check (see [`ProgressStore::verify_points`])
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// Stage rows whose cached points_earned disagreed with the ledger
    pub stage_rows_repaired: u32,
    /// Whether the user's cached total disagreed with the ledger
    pub total_repaired: bool,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.stage_rows_repaired == 0 && !self.total_repaired
    }
}

/// Handle to the progression database. Cheap to clone.
#[derive(Clone)]
pub struct ProgressStore {
    conn: Arc<Mutex<Connection>>,
}

impl ProgressStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("Opening progression database at {}", path.display());
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory database for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self { conn: Arc::new(Mutex::new(conn)) };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Lock the connection, recovering from a poisoned mutex
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_launch_status (
                user_id TEXT PRIMARY KEY,
                team_id TEXT NOT NULL,
                current_stage TEXT NOT NULL DEFAULT 'fuel',
                total_points INTEGER NOT NULL DEFAULT 0,
                is_launched INTEGER NOT NULL DEFAULT 0,
                launched_at TEXT,
                daily_streak INTEGER NOT NULL DEFAULT 0,
                last_active_date TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS stage_progress (
                user_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                level INTEGER NOT NULL DEFAULT 0,
                points_earned INTEGER NOT NULL DEFAULT 0,
                stage_started_at TEXT NOT NULL,
                level_completed_at TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, stage)
            );

            CREATE TABLE IF NOT EXISTS granted_achievements (
                user_id TEXT NOT NULL,
                achievement_key TEXT NOT NULL,
                stage TEXT NOT NULL,
                granted_at TEXT NOT NULL,
                PRIMARY KEY (user_id, achievement_key)
            );

            CREATE TABLE IF NOT EXISTS points_ledger (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                points INTEGER NOT NULL,
                reason TEXT NOT NULL,
                reason_display TEXT NOT NULL,
                stage TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ledger_user_stage
                ON points_ledger(user_id, stage);

            CREATE TABLE IF NOT EXISTS team_points (
                team_id TEXT PRIMARY KEY,
                total_points INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS documents (
                source_id TEXT PRIMARY KEY,
                team_id TEXT NOT NULL,
                folder_type TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_team
                ON documents(team_id, folder_type);",
        )?;
        Ok(())
    }

    // ========================================================================
    // User lifecycle
    // ========================================================================

    /// Create the status row and all three level-0 stage rows for a new
    /// user, transactionally. A no-op if the user already exists.
    pub fn init_user(&self, user_id: Uuid, team_id: Uuid) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Utc::now();

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO user_launch_status (user_id, team_id, updated_at)
             VALUES (?1, ?2, ?3)",
            params![user_id.to_string(), team_id.to_string(), now],
        )?;
        for stage in Stage::ALL {
            tx.execute(
                "INSERT OR IGNORE INTO stage_progress
                     (user_id, stage, stage_started_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![user_id.to_string(), stage.as_str(), now],
            )?;
        }
        tx.execute(
            "INSERT OR IGNORE INTO team_points (team_id) VALUES (?1)",
            params![team_id.to_string()],
        )?;
        tx.commit()?;

        if inserted > 0 {
            debug!(%user_id, %team_id, "initialized launch status");
        }
        Ok(())
    }

    /// All known users with their teams, for periodic sweeps
    pub fn all_users(&self) -> Result<Vec<(Uuid, Uuid)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT user_id, team_id FROM user_launch_status")?;
        let rows = stmt.query_map([], |row| {
            let user: String = row.get(0)?;
            let team: String = row.get(1)?;
            Ok((user, team))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (user, team) = row?;
            if let (Ok(user), Ok(team)) = (Uuid::parse_str(&user), Uuid::parse_str(&team)) {
                out.push((user, team));
            }
        }
        Ok(out)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn launch_status(&self, user_id: Uuid) -> Result<Option<UserLaunchStatus>> {
        let conn = self.conn();
        let status = conn
            .query_row(
                "SELECT user_id, team_id, current_stage, total_points, is_launched,
                        launched_at, daily_streak, last_active_date
                 FROM user_launch_status WHERE user_id = ?1",
                params![user_id.to_string()],
                |row| {
                    let user: String = row.get(0)?;
                    let team: String = row.get(1)?;
                    let pointer: String = row.get(2)?;
                    Ok(UserLaunchStatus {
                        user_id: Uuid::parse_str(&user).unwrap_or_default(),
                        team_id: Uuid::parse_str(&team).unwrap_or_default(),
                        current_stage: pointer.parse().unwrap_or(StagePointer::Fuel),
                        total_points: row.get(3)?,
                        is_launched: row.get::<_, i64>(4)? != 0,
                        launched_at: row.get::<_, Option<DateTime<Utc>>>(5)?,
                        daily_streak: row.get::<_, i64>(6)? as u32,
                        last_active_date: row.get::<_, Option<NaiveDate>>(7)?,
                    })
                },
            )
            .optional()?;
        Ok(status)
    }

    /// Stage record, self-healing: a missing row is recreated at level 0
    /// instead of failing the caller's reconciliation pass.
    pub fn stage_record(&self, user_id: Uuid, stage: Stage) -> Result<StageRecord> {
        {
            let conn = self.conn();
            let healed = conn.execute(
                "INSERT OR IGNORE INTO stage_progress
                     (user_id, stage, stage_started_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![user_id.to_string(), stage.as_str(), Utc::now()],
            )?;
            if healed > 0 {
                warn!(%user_id, %stage, "recreated missing stage record");
            }
        }
        self.read_stage_record(user_id, stage)
    }

    fn read_stage_record(&self, user_id: Uuid, stage: Stage) -> Result<StageRecord> {
        let conn = self.conn();
        let (level, points_earned, stage_started_at, level_completed_at) = conn.query_row(
            "SELECT level, points_earned, stage_started_at, level_completed_at
             FROM stage_progress WHERE user_id = ?1 AND stage = ?2",
            params![user_id.to_string(), stage.as_str()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)? as u8,
                    row.get::<_, i64>(1)?,
                    row.get::<_, DateTime<Utc>>(2)?,
                    row.get::<_, Option<DateTime<Utc>>>(3)?,
                ))
            },
        )?;

        let mut stmt = conn.prepare(
            "SELECT achievement_key FROM granted_achievements
             WHERE user_id = ?1 AND stage = ?2",
        )?;
        let achievements: BTreeSet<String> = stmt
            .query_map(params![user_id.to_string(), stage.as_str()], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;

        Ok(StageRecord {
            user_id,
            stage,
            level,
            points_earned,
            achievements,
            stage_started_at,
            level_completed_at,
        })
    }

    /// All three stage records for a user
    pub fn stage_records(&self, user_id: Uuid) -> Result<[StageRecord; 3]> {
        Ok([
            self.stage_record(user_id, Stage::Fuel)?,
            self.stage_record(user_id, Stage::Boosters)?,
            self.stage_record(user_id, Stage::Guidance)?,
        ])
    }

    /// Most recent ledger entries for a user, newest first
    pub fn recent_ledger(&self, user_id: Uuid, limit: u32) -> Result<Vec<PointsLedgerEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, points, reason, reason_display, stage, metadata, created_at
             FROM points_ledger WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id.to_string(), limit], |row| {
            let id: String = row.get(0)?;
            let user: String = row.get(1)?;
            let metadata: String = row.get(6)?;
            Ok(PointsLedgerEntry {
                id: Uuid::parse_str(&id).unwrap_or_default(),
                user_id: Uuid::parse_str(&user).unwrap_or_default(),
                points: row.get(2)?,
                reason: row.get(3)?,
                reason_display: row.get(4)?,
                stage: row.get(5)?,
                metadata: serde_json::from_str(&metadata).unwrap_or_default(),
                created_at: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// Ledger sum for one (user, stage label) pair
    pub fn ledger_sum(&self, user_id: Uuid, stage: &str) -> Result<i64> {
        let conn = self.conn();
        let sum = conn.query_row(
            "SELECT COALESCE(SUM(points), 0) FROM points_ledger
             WHERE user_id = ?1 AND stage = ?2",
            params![user_id.to_string(), stage],
            |row| row.get(0),
        )?;
        Ok(sum)
    }

    pub fn team_aggregate(&self, team_id: Uuid) -> Result<TeamAggregate> {
        let conn = self.conn();
        let total_points = conn
            .query_row(
                "SELECT total_points FROM team_points WHERE team_id = ?1",
                params![team_id.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        Ok(TeamAggregate { team_id, total_points })
    }

    // ========================================================================
    // Narrow writes (everything award-related lives in award.rs)
    // ========================================================================

    /// Move the navigational stage pointer; never gates anything
    pub fn set_stage_pointer(&self, user_id: Uuid, pointer: StagePointer) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE user_launch_status SET current_stage = ?2, updated_at = ?3
             WHERE user_id = ?1",
            params![user_id.to_string(), pointer.as_str(), Utc::now()],
        )?;
        Ok(())
    }

    /// One-way launch flag. Returns false if the user was already launched.
    pub fn mark_launched(&self, user_id: Uuid) -> Result<bool> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE user_launch_status
             SET is_launched = 1, launched_at = ?2, current_stage = 'launched',
                 updated_at = ?2
             WHERE user_id = ?1 AND is_launched = 0",
            params![user_id.to_string(), Utc::now()],
        )?;
        Ok(changed > 0)
    }

    /// Persist a daily-activity transition (date + streak together)
    pub(crate) fn set_daily_activity(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        streak: u32,
    ) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE user_launch_status
             SET last_active_date = ?2, daily_streak = ?3, updated_at = ?4
             WHERE user_id = ?1",
            params![user_id.to_string(), date, streak as i64, Utc::now()],
        )?;
        Ok(())
    }

    // ========================================================================
    // Documents (read-mostly; written by the sync pipeline)
    // ========================================================================

    pub(crate) fn upsert_document(
        &self,
        team_id: Uuid,
        source_id: &str,
        category: &str,
    ) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO documents (source_id, team_id, folder_type, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(source_id) DO UPDATE SET folder_type = excluded.folder_type",
            params![source_id, team_id.to_string(), category, Utc::now()],
        )?;
        Ok(())
    }

    pub(crate) fn document_counts(&self, team_id: Uuid) -> Result<DocumentCounts> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT folder_type, COUNT(*) FROM documents
             WHERE team_id = ?1 GROUP BY folder_type",
        )?;
        let rows = stmt.query_map(params![team_id.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u32))
        })?;

        let mut counts = DocumentCounts::default();
        for row in rows {
            let (category, n) = row?;
            match category.as_str() {
                "strategy" => counts.strategy = n,
                "projects" => counts.projects = n,
                "meetings" => counts.meetings = n,
                "financial" => counts.financial = n,
                other => debug!(category = other, "ignoring unknown document category"),
            }
        }
        Ok(counts)
    }

    // ========================================================================
    // Drift repair
    // ========================================================================

    /// Recompute cached point totals from the ledger and correct drift.
    ///
    /// The ledger is the source of truth; cached `points_earned` and
    /// `total_points` exist to avoid per-read aggregation. A partial commit
    /// can never produce drift on its own (the award path is one
    /// transaction), so anything found here points at out-of-band writes.
    pub fn verify_points(&self, user_id: Uuid) -> Result<DriftReport> {
        let mut report = DriftReport::default();
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        for stage in Stage::ALL {
            let ledger_sum: i64 = tx.query_row(
                "SELECT COALESCE(SUM(points), 0) FROM points_ledger
                 WHERE user_id = ?1 AND stage = ?2",
                params![user_id.to_string(), stage.as_str()],
                |row| row.get(0),
            )?;
            let repaired = tx.execute(
                "UPDATE stage_progress SET points_earned = ?3, updated_at = ?4
                 WHERE user_id = ?1 AND stage = ?2 AND points_earned != ?3",
                params![user_id.to_string(), stage.as_str(), ledger_sum, Utc::now()],
            )?;
            report.stage_rows_repaired += repaired as u32;
        }

        let ledger_total: i64 = tx.query_row(
            "SELECT COALESCE(SUM(points), 0) FROM points_ledger WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        let repaired = tx.execute(
            "UPDATE user_launch_status SET total_points = ?2, updated_at = ?3
             WHERE user_id = ?1 AND total_points != ?2",
            params![user_id.to_string(), ledger_total, Utc::now()],
        )?;
        report.total_repaired = repaired > 0;

        tx.commit()?;

        if !report.is_clean() {
            warn!(%user_id, ?report, "repaired point drift from ledger");
        }
        Ok(report)
    }

    /// Recompute a team's cached total from its members' totals
    pub fn verify_team_points(&self, team_id: Uuid) -> Result<bool> {
        let conn = self.conn();
        let member_sum: i64 = conn.query_row(
            "SELECT COALESCE(SUM(total_points), 0) FROM user_launch_status
             WHERE team_id = ?1",
            params![team_id.to_string()],
            |row| row.get(0),
        )?;
        let repaired = conn.execute(
            "UPDATE team_points SET total_points = ?2
             WHERE team_id = ?1 AND total_points != ?2",
            params![team_id.to_string(), member_sum],
        )?;
        if repaired > 0 {
            warn!(%team_id, member_sum, "repaired team aggregate drift");
        }
        Ok(repaired > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ProgressStore {
        ProgressStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_init_user_creates_three_stages() {
        let store = store();
        let user = Uuid::new_v4();
        store.init_user(user, Uuid::new_v4()).unwrap();

        let records = store.stage_records(user).unwrap();
        for record in &records {
            assert_eq!(record.level, 0);
            assert_eq!(record.points_earned, 0);
            assert!(record.achievements.is_empty());
        }
    }

    #[test]
    fn test_init_user_is_idempotent() {
        let store = store();
        let user = Uuid::new_v4();
        let team = Uuid::new_v4();
        store.init_user(user, team).unwrap();
        store.init_user(user, team).unwrap();

        assert_eq!(store.all_users().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_stage_record_self_heals() {
        let store = store();
        let user = Uuid::new_v4();
        store.init_user(user, Uuid::new_v4()).unwrap();

        store
            .conn()
            .execute(
                "DELETE FROM stage_progress WHERE user_id = ?1 AND stage = 'boosters'",
                params![user.to_string()],
            )
            .unwrap();

        let record = store.stage_record(user, Stage::Boosters).unwrap();
        assert_eq!(record.level, 0);
    }

    #[test]
    fn test_mark_launched_is_one_way() {
        let store = store();
        let user = Uuid::new_v4();
        store.init_user(user, Uuid::new_v4()).unwrap();

        assert!(store.mark_launched(user).unwrap());
        assert!(!store.mark_launched(user).unwrap());

        let status = store.launch_status(user).unwrap().unwrap();
        assert!(status.is_launched);
        assert!(status.launched_at.is_some());
    }

    #[test]
    fn test_document_counts_by_category() {
        let store = store();
        let team = Uuid::new_v4();
        store.upsert_document(team, "doc-1", "strategy").unwrap();
        store.upsert_document(team, "doc-2", "meetings").unwrap();
        store.upsert_document(team, "doc-3", "meetings").unwrap();
        // Other teams do not bleed in
        store.upsert_document(Uuid::new_v4(), "doc-4", "financial").unwrap();

        let counts = store.document_counts(team).unwrap();
        assert_eq!(counts.strategy, 1);
        assert_eq!(counts.meetings, 2);
        assert_eq!(counts.financial, 0);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_recategorization_can_lower_a_count() {
        let store = store();
        let team = Uuid::new_v4();
        store.upsert_document(team, "doc-1", "meetings").unwrap();
        store.upsert_document(team, "doc-1", "financial").unwrap();

        let counts = store.document_counts(team).unwrap();
        assert_eq!(counts.meetings, 0);
        assert_eq!(counts.financial, 1);
    }

    #[test]
    fn test_verify_points_repairs_tampered_cache() {
        let store = store();
        let user = Uuid::new_v4();
        store.init_user(user, Uuid::new_v4()).unwrap();

        // Out-of-band corruption of the cached fields
        store
            .conn()
            .execute(
                "UPDATE stage_progress SET points_earned = 999
                 WHERE user_id = ?1 AND stage = 'fuel'",
                params![user.to_string()],
            )
            .unwrap();
        store
            .conn()
            .execute(
                "UPDATE user_launch_status SET total_points = 500 WHERE user_id = ?1",
                params![user.to_string()],
            )
            .unwrap();

        let report = store.verify_points(user).unwrap();
        assert_eq!(report.stage_rows_repaired, 1);
        assert!(report.total_repaired);

        let record = store.stage_record(user, Stage::Fuel).unwrap();
        assert_eq!(record.points_earned, 0);
        assert!(store.verify_points(user).unwrap().is_clean());
    }
}
