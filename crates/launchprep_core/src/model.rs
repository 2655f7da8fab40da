//! Data model for launch preparation progression.
//!
//! Three independent stages, each with a 0-5 level. All progression state
//! lives in four records:
//! - `StageRecord`: one row per (user, stage), the leveling state machine
//! - `PointsLedgerEntry`: append-only grant history, source of truth for totals
//! - `UserLaunchStatus`: per-user rollup (total points, launch flag, streak)
//! - `TeamAggregate`: per-team cached point total, incrementally maintained

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Highest reachable level within any stage
pub const MAX_LEVEL: u8 = 5;

/// The three progression stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Document collection (resource-threshold driven)
    Fuel,
    /// AI feature usage (task-event driven)
    Boosters,
    /// Team configuration (task-event driven)
    Guidance,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Fuel, Stage::Boosters, Stage::Guidance];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fuel => "fuel",
            Stage::Boosters => "boosters",
            Stage::Guidance => "guidance",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Stage::Fuel => "Fuel Stage",
            Stage::Boosters => "Boosters Stage",
            Stage::Guidance => "Guidance Stage",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fuel" => Ok(Stage::Fuel),
            "boosters" => Ok(Stage::Boosters),
            "guidance" => Ok(Stage::Guidance),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// Leveling state for one (user, stage) pair.
///
/// `level` never decreases and never exceeds [`MAX_LEVEL`]. `points_earned`
/// mirrors the sum of ledger entries for this pair; the award path keeps the
/// two in lockstep inside one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub user_id: Uuid,
    pub stage: Stage,
    pub level: u8,
    pub points_earned: i64,
    /// Achievement keys already granted for this stage, each at most once
    pub achievements: BTreeSet<String>,
    pub stage_started_at: DateTime<Utc>,
    pub level_completed_at: Option<DateTime<Utc>>,
}

/// One append-only row in the points ledger. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsLedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub points: i64,
    /// Machine-readable reason (achievement key or ongoing reason code)
    pub reason: String,
    /// Human-readable reason for display
    pub reason_display: String,
    /// Stage label; "ongoing" for grants outside the three stages
    pub stage: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Per-user rollup of the whole progression system.
///
/// `current_stage` is navigational only (which stage screen the user is
/// viewing), never a gate. `is_launched` is one-way: once set it is never
/// cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLaunchStatus {
    pub user_id: Uuid,
    pub team_id: Uuid,
    pub current_stage: StagePointer,
    pub total_points: i64,
    pub is_launched: bool,
    pub launched_at: Option<DateTime<Utc>>,
    pub daily_streak: u32,
    pub last_active_date: Option<NaiveDate>,
}

/// Which screen of the progression flow the user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagePointer {
    Fuel,
    Boosters,
    Guidance,
    Ready,
    Launched,
}

impl StagePointer {
    pub fn as_str(&self) -> &'static str {
        match self {
            StagePointer::Fuel => "fuel",
            StagePointer::Boosters => "boosters",
            StagePointer::Guidance => "guidance",
            StagePointer::Ready => "ready",
            StagePointer::Launched => "launched",
        }
    }
}

impl FromStr for StagePointer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fuel" => Ok(StagePointer::Fuel),
            "boosters" => Ok(StagePointer::Boosters),
            "guidance" => Ok(StagePointer::Guidance),
            "ready" => Ok(StagePointer::Ready),
            "launched" => Ok(StagePointer::Launched),
            other => Err(format!("unknown stage pointer: {other}")),
        }
    }
}

/// Cached per-team point total, maintained by conditional increments.
///
/// Equals the sum of member `total_points`; the periodic verify pass repairs
/// any drift from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamAggregate {
    pub team_id: Uuid,
    pub total_points: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
    }

    #[test]
    fn test_stage_pointer_round_trip() {
        for s in ["fuel", "boosters", "guidance", "ready", "launched"] {
            assert_eq!(s.parse::<StagePointer>().unwrap().as_str(), s);
        }
    }

    #[test]
    fn test_unknown_stage_rejected() {
        assert!("warp".parse::<Stage>().is_err());
    }
}
