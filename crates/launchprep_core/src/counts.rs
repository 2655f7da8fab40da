//! Resource observer: externally-synced document counts per team.
//!
//! The document sync pipeline (out of scope here) maintains one row per
//! unique document with a category. This module only observes: current
//! counts per category, plus a change signal the reconciler subscribes to.

use crate::error::Result;
use crate::store::ProgressStore;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Document categories tracked for the fuel stage
pub const CATEGORIES: [&str; 4] = ["strategy", "projects", "meetings", "financial"];

/// Per-category document counts for one team
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentCounts {
    pub strategy: u32,
    pub projects: u32,
    pub meetings: u32,
    pub financial: u32,
}

impl DocumentCounts {
    pub fn total(&self) -> u32 {
        self.strategy + self.projects + self.meetings + self.financial
    }

    /// Componentwise comparison; true if every category of `self` is <= `other`
    pub fn le(&self, other: &DocumentCounts) -> bool {
        self.strategy <= other.strategy
            && self.projects <= other.projects
            && self.meetings <= other.meetings
            && self.financial <= other.financial
    }
}

/// Source of document counts and change notifications
pub trait ResourceObserver: Send + Sync {
    /// Current counts for a team, read fresh from the backing store
    fn counts(&self, team_id: Uuid) -> Result<DocumentCounts>;

    /// Subscribe to team-level change notifications
    fn subscribe(&self) -> broadcast::Receiver<Uuid>;
}

/// Observer backed by the shared SQLite `documents` table.
///
/// The ingest path calls [`SqliteResourceObserver::record_document`] (or
/// `notify_changed` after bulk sync) so subscribed reconcilers re-check
/// thresholds without polling.
pub struct SqliteResourceObserver {
    store: ProgressStore,
    changes: broadcast::Sender<Uuid>,
}

impl SqliteResourceObserver {
    pub fn new(store: ProgressStore) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self { store, changes }
    }

    /// Record one synced document and signal the change
    pub fn record_document(&self, team_id: Uuid, source_id: &str, category: &str) -> Result<()> {
        self.store.upsert_document(team_id, source_id, category)?;
        self.notify_changed(team_id);
        Ok(())
    }

    /// Signal that a team's documents changed (bulk sync path)
    pub fn notify_changed(&self, team_id: Uuid) {
        // No subscribers is fine; the next mount trigger catches up
        let _ = self.changes.send(team_id);
    }
}

impl ResourceObserver for SqliteResourceObserver {
    fn counts(&self, team_id: Uuid) -> Result<DocumentCounts> {
        self.store.document_counts(team_id)
    }

    fn subscribe(&self) -> broadcast::Receiver<Uuid> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total() {
        let counts = DocumentCounts { strategy: 1, projects: 2, meetings: 3, financial: 4 };
        assert_eq!(counts.total(), 10);
    }

    #[test]
    fn test_componentwise_le() {
        let low = DocumentCounts { strategy: 1, projects: 0, meetings: 5, financial: 0 };
        let high = DocumentCounts { strategy: 2, projects: 0, meetings: 5, financial: 1 };
        assert!(low.le(&high));
        assert!(!high.le(&low));
        assert!(low.le(&low));
    }
}
