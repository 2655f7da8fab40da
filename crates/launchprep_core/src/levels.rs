//! Level calculator for the fuel stage.
//!
//! Pure threshold predicates over document counts. Evaluated highest level
//! first; the first satisfied predicate wins. Both functions are total and
//! side-effect-free so the reconciler can call them speculatively on every
//! trigger.
//!
//! Levels are a one-way ratchet: the calculator may return a value below the
//! stored level after a recategorization, and the reconciler simply ignores
//! it. Demotion is never performed.

use crate::counts::DocumentCounts;
use crate::model::MAX_LEVEL;

/// Achieved level for a set of counts, 0-5.
///
/// Monotonic: if counts only increase, the result never decreases.
pub fn level_from_counts(counts: &DocumentCounts) -> u8 {
    let DocumentCounts { strategy, projects, meetings, financial } = *counts;

    if strategy >= 10 && projects >= 10 && meetings >= 100 && financial >= 10 {
        return 5;
    }
    if strategy >= 10 && projects >= 10 && meetings >= 50 && financial >= 10 {
        return 4;
    }
    if strategy >= 3 && projects >= 3 && meetings >= 10 && financial >= 3 {
        return 3;
    }
    if strategy >= 1 && projects >= 1 && meetings >= 1 && financial >= 1 {
        return 2;
    }
    if counts.total() >= 1 {
        return 1;
    }
    0
}

/// Re-check a single target level's predicate.
///
/// Independent of [`level_from_counts`] so the reconciler can confirm a
/// specific level against freshly-read counts before escalating.
pub fn meets_level_requirement(level: u8, counts: &DocumentCounts) -> bool {
    let DocumentCounts { strategy, projects, meetings, financial } = *counts;

    match level {
        1 => counts.total() >= 1,
        2 => strategy >= 1 && projects >= 1 && meetings >= 1 && financial >= 1,
        3 => strategy >= 3 && projects >= 3 && meetings >= 10 && financial >= 3,
        4 => strategy >= 10 && projects >= 10 && meetings >= 50 && financial >= 10,
        5 => strategy >= 10 && projects >= 10 && meetings >= 100 && financial >= 10,
        _ => false,
    }
}

/// What the user still needs for the level after `current_level`
pub fn requirements_for_next(current_level: u8) -> &'static [&'static str] {
    match current_level {
        0 => &["Upload or create at least 1 document (any category)"],
        1 => &[
            "1 Strategy Document",
            "1 Project Document",
            "1 Meeting Document",
            "1 Financial Document",
        ],
        2 => &[
            "3 Strategy Documents",
            "3 Project Documents",
            "10 Meeting Documents",
            "3 Financial Documents",
        ],
        3 => &[
            "10 Strategy Documents",
            "10 Project Documents",
            "50 Meeting Documents",
            "10 Financial Documents",
        ],
        4 => &[
            "10 Strategy Documents",
            "10 Project Documents",
            "100 Meeting Documents",
            "10 Financial Documents",
        ],
        _ => &["Maximum level reached!"],
    }
}

/// Progress through a stage as a percentage, 20% per level
pub fn stage_progress_percent(level: u8) -> u8 {
    (level.min(MAX_LEVEL) as u16 * 100 / MAX_LEVEL as u16) as u8
}
