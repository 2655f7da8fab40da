//! Launch preparation progression engine.
//!
//! Gamified onboarding core: observes externally-synced document counts and
//! discrete task-completion events, derives a monotonic per-stage level,
//! awards one-time achievements and points exactly once, and keeps the
//! append-only ledger and cached aggregates consistent under concurrent
//! triggers.
//!
//! ## Architecture
//!
//! ```text
//! +-------------------+   +------------------+
//! | ResourceObserver  |   | TaskEvent source |
//! | (document counts) |   | (one-shot)       |
//! +---------+---------+   +--------+---------+
//!           |                      |
//!           v                      v
//!     +-----+----------------------+-----+
//!     |           Reconciler             |
//!     |  (level calculator + diffing)    |
//!     +----------------+-----------------+
//!                      v
//!           +----------+-----------+        +------------------+
//!           |    ProgressEngine    | -----> | NotificationSink |
//!           | (award, sole writer) |        | (fire-and-forget)|
//!           +----------+-----------+        +------------------+
//!                      v
//!           +----------+-----------+
//!           |    ProgressStore     |
//!           | (SQLite, one txn per |
//!           |  award, ledger + PK) |
//!           +----------------------+
//! ```

pub mod activity;
pub mod award;
pub mod catalog;
pub mod counts;
pub mod error;
pub mod events;
pub mod levels;
pub mod model;
pub mod readiness;
pub mod reconcile;
pub mod store;

pub use activity::ActivityOutcome;
pub use award::{AwardOutcome, ProgressEngine};
pub use counts::{DocumentCounts, ResourceObserver, SqliteResourceObserver};
pub use error::{ProgressError, Result};
pub use events::{BroadcastSink, Notification, NotificationSink, NullSink};
pub use model::{Stage, StagePointer, StageRecord, UserLaunchStatus};
pub use readiness::LaunchOutcome;
pub use reconcile::{ReconcileOutcome, Reconciler, TaskEvent, Trigger};
pub use store::ProgressStore;
