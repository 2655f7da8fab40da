//! Achievement and level catalog - CANONICAL SOURCE
//!
//! Static, versioned tables of every level and achievement in the system.
//! Immutable at runtime; the award path looks entries up by key and an
//! unknown key is a loud error, never a silent no-op.
//!
//! ## Point values
//!
//! | Level | Points | Stage total |
//! |-------|--------|-------------|
//! | 1     | 10     | 10          |
//! | 2     | 20     | 30          |
//! | 3     | 30     | 60          |
//! | 4     | 40     | 100         |
//! | 5     | 50     | 150         |
//!
//! Streak achievements sit at level 0: they grant points but never move a
//! stage level.

use crate::model::Stage;

/// Definition of one level within a stage
#[derive(Debug, Clone, Copy)]
pub struct LevelRequirement {
    pub level: u8,
    pub name: &'static str,
    pub description: &'static str,
    pub requirements: &'static [&'static str],
    pub points: i64,
}

/// One uniquely-keyed, one-time-grantable unit of progress
#[derive(Debug, Clone, Copy)]
pub struct AchievementDef {
    pub key: &'static str,
    pub stage: Stage,
    /// Target level; 0 for point-only achievements that never escalate
    pub level: u8,
    pub points: i64,
    pub name: &'static str,
}

// ============================================================================
// Level definitions per stage
// ============================================================================

pub const FUEL_LEVELS: [LevelRequirement; 5] = [
    LevelRequirement {
        level: 1,
        name: "Level 1",
        description: "Get started with your first document",
        requirements: &["1 document (any type)"],
        points: 10,
    },
    LevelRequirement {
        level: 2,
        name: "Level 2",
        description: "Establish your data foundation",
        requirements: &[
            "1 Strategy Document",
            "1 Project Document",
            "1 Meeting Document",
            "1 Financial Document",
        ],
        points: 20,
    },
    LevelRequirement {
        level: 3,
        name: "Level 3",
        description: "Build a solid data collection",
        requirements: &[
            "3 Strategy Documents",
            "3 Project Documents",
            "10 Meeting Documents",
            "3 Financial Documents",
        ],
        points: 30,
    },
    LevelRequirement {
        level: 4,
        name: "Level 4",
        description: "Establish a mature data foundation",
        requirements: &[
            "10 Strategy Documents",
            "10 Project Documents",
            "50 Meeting Documents",
            "10 Financial Documents",
        ],
        points: 40,
    },
    LevelRequirement {
        level: 5,
        name: "Level 5",
        description: "Advanced preparation for maximum insights",
        requirements: &[
            "10 Strategy Documents",
            "10 Project Documents",
            "100 Meeting Documents",
            "10 Financial Documents",
        ],
        points: 50,
    },
];

pub const BOOSTERS_LEVELS: [LevelRequirement; 5] = [
    LevelRequirement {
        level: 1,
        name: "Level 1",
        description: "Start talking to the assistant",
        requirements: &["Use guided chat or send 5 prompts"],
        points: 10,
    },
    LevelRequirement {
        level: 2,
        name: "Level 2",
        description: "See your data come to life",
        requirements: &["Create 1 visualization"],
        points: 20,
    },
    LevelRequirement {
        level: 3,
        name: "Level 3",
        description: "Generate insights on demand",
        requirements: &["Generate 1 manual report"],
        points: 30,
    },
    LevelRequirement {
        level: 4,
        name: "Level 4",
        description: "Set up automated insights",
        requirements: &["Schedule 1 recurring report"],
        points: 40,
    },
    LevelRequirement {
        level: 5,
        name: "Level 5",
        description: "Build your first AI agent",
        requirements: &["Build 1 AI agent"],
        points: 50,
    },
];

pub const GUIDANCE_LEVELS: [LevelRequirement; 5] = [
    LevelRequirement {
        level: 1,
        name: "Level 1",
        description: "Set up your team",
        requirements: &["Configure team settings"],
        points: 10,
    },
    LevelRequirement {
        level: 2,
        name: "Level 2",
        description: "Stay informed",
        requirements: &["Enable news preferences"],
        points: 20,
    },
    LevelRequirement {
        level: 3,
        name: "Level 3",
        description: "Build your team",
        requirements: &["Invite 1+ team member"],
        points: 30,
    },
    LevelRequirement {
        level: 4,
        name: "Level 4",
        description: "Create automated workflows",
        requirements: &["Create 1 AI job"],
        points: 40,
    },
    LevelRequirement {
        level: 5,
        name: "Level 5",
        description: "Document your processes",
        requirements: &["Create 1 guidance document"],
        points: 50,
    },
];

/// Level requirements for a stage
pub fn level_requirements(stage: Stage) -> &'static [LevelRequirement; 5] {
    match stage {
        Stage::Fuel => &FUEL_LEVELS,
        Stage::Boosters => &BOOSTERS_LEVELS,
        Stage::Guidance => &GUIDANCE_LEVELS,
    }
}

// ============================================================================
// Achievement catalog
// ============================================================================

/// Every achievement in the system, level achievements first
pub const ACHIEVEMENTS: [AchievementDef; 17] = [
    // Fuel levels (resource-threshold driven)
    AchievementDef { key: "fuel_first_document", stage: Stage::Fuel, level: 1, points: 10, name: "First Document" },
    AchievementDef { key: "fuel_one_per_category", stage: Stage::Fuel, level: 2, points: 20, name: "One Per Category" },
    AchievementDef { key: "fuel_basic_collection", stage: Stage::Fuel, level: 3, points: 30, name: "Basic Collection" },
    AchievementDef { key: "fuel_mature_foundation", stage: Stage::Fuel, level: 4, points: 40, name: "Mature Foundation" },
    AchievementDef { key: "fuel_advanced_preparation", stage: Stage::Fuel, level: 5, points: 50, name: "Advanced Preparation" },
    // Boosters levels (task-event driven)
    AchievementDef { key: "boosters_first_prompt", stage: Stage::Boosters, level: 1, points: 10, name: "First Prompt" },
    AchievementDef { key: "boosters_first_visualization", stage: Stage::Boosters, level: 2, points: 20, name: "First Visualization" },
    AchievementDef { key: "boosters_manual_report", stage: Stage::Boosters, level: 3, points: 30, name: "Manual Report" },
    AchievementDef { key: "boosters_scheduled_report", stage: Stage::Boosters, level: 4, points: 40, name: "Scheduled Report" },
    AchievementDef { key: "boosters_first_agent", stage: Stage::Boosters, level: 5, points: 50, name: "First Agent" },
    // Guidance levels (task-event driven)
    AchievementDef { key: "guidance_team_settings", stage: Stage::Guidance, level: 1, points: 10, name: "Team Settings" },
    AchievementDef { key: "guidance_news_enabled", stage: Stage::Guidance, level: 2, points: 20, name: "News Preferences" },
    AchievementDef { key: "guidance_member_invited", stage: Stage::Guidance, level: 3, points: 30, name: "Team Member Invited" },
    AchievementDef { key: "guidance_first_job", stage: Stage::Guidance, level: 4, points: 40, name: "First AI Job" },
    AchievementDef { key: "guidance_first_doc", stage: Stage::Guidance, level: 5, points: 50, name: "First Guidance Document" },
    // Streak achievements (point-only, never move a level)
    AchievementDef { key: "ongoing_streak_7_days", stage: Stage::Guidance, level: 0, points: 25, name: "7-Day Streak" },
    AchievementDef { key: "ongoing_streak_30_days", stage: Stage::Guidance, level: 0, points: 100, name: "30-Day Streak" },
];

/// Look up an achievement by key
pub fn achievement(key: &str) -> Option<&'static AchievementDef> {
    ACHIEVEMENTS.iter().find(|a| a.key == key)
}

/// The level achievement for a (stage, level) pair, if one exists
pub fn key_for_level(stage: Stage, level: u8) -> Option<&'static str> {
    ACHIEVEMENTS
        .iter()
        .find(|a| a.stage == stage && a.level == level && a.level > 0)
        .map(|a| a.key)
}

/// Maximum points obtainable from level achievements in one stage
pub fn stage_max_points(stage: Stage) -> i64 {
    level_requirements(stage).iter().map(|l| l.points).sum()
}
