//! User-facing notification events.
//!
//! Emitted by the award primitive after a successful commit and consumed by
//! the presentation layer. Delivery is fire-and-forget: a lost notification
//! never blocks or rolls back the underlying state change.
//!
//! ```text
//! +----------------+     +------------------+     +----------------+
//! | award/activity | --> | NotificationSink | --> | UI / toasts    |
//! | (emits)        |     | (channel)        |     | (renders)      |
//! +----------------+     +------------------+     +----------------+
//! ```

use crate::model::Stage;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

/// A progression event worth telling the user about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    /// A stage level transition
    LevelUp { stage: Stage, level: u8, points: i64 },
    /// A one-time achievement that did not change the level
    Achievement { key: String, name: String, points: i64 },
    /// A direct point grant outside the catalog (daily activity)
    Points { points: i64, reason: String },
    /// The one-way launch transition
    Launched,
}

/// Fire-and-forget notification delivery
pub trait NotificationSink: Send + Sync {
    fn emit(&self, user_id: Uuid, notification: Notification);
}

/// Sink that drops everything; for headless and test use
pub struct NullSink;

impl NotificationSink for NullSink {
    fn emit(&self, _user_id: Uuid, _notification: Notification) {}
}

/// Sink over a tokio broadcast channel, shared with UI consumers
pub struct BroadcastSink {
    tx: broadcast::Sender<(Uuid, Notification)>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(Uuid, Notification)> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn emit(&self, user_id: Uuid, notification: Notification) {
        // No receivers is not an error
        let _ = self.tx.send((user_id, notification));
    }
}

/// Sink that records everything it sees; test helper
#[derive(Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<(Uuid, Notification)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<(Uuid, Notification)> {
        std::mem::take(&mut *self.seen.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl NotificationSink for RecordingSink {
    fn emit(&self, user_id: Uuid, notification: Notification) {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((user_id, notification));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_sink_without_receivers() {
        let sink = BroadcastSink::new(8);
        // Must not panic or error with nobody listening
        sink.emit(Uuid::new_v4(), Notification::Launched);
    }

    #[test]
    fn test_broadcast_sink_delivers() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();
        let user = Uuid::new_v4();
        sink.emit(user, Notification::Points { points: 10, reason: "ongoing_daily_active".into() });

        let (got_user, got) = rx.try_recv().unwrap();
        assert_eq!(got_user, user);
        assert_eq!(got, Notification::Points { points: 10, reason: "ongoing_daily_active".into() });
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.emit(Uuid::new_v4(), Notification::Launched);
        assert_eq!(sink.take().len(), 1);
        assert!(sink.take().is_empty());
    }
}
