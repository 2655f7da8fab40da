//! Launch preparation daemon.
//!
//! Wires the progression engine together and keeps it reconciled:
//! - listens for document-change notifications and re-runs the resource
//!   driver for the affected team's users
//! - runs a periodic sweep (daily-check trigger for every known user)
//! - periodically verifies cached point totals against the ledger

mod config;

use anyhow::Result;
use config::DaemonConfig;
use launchprep_core::{
    BroadcastSink, ProgressEngine, ProgressStore, Reconciler, ResourceObserver,
    SqliteResourceObserver, Trigger,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let config = DaemonConfig::load();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone())),
        )
        .init();

    info!("launchprepd v{} starting", env!("CARGO_PKG_VERSION"));

    let store = ProgressStore::open(&config.db_path)?;
    let sink = Arc::new(BroadcastSink::new(config.notification_capacity));
    let engine = ProgressEngine::new(store.clone(), sink.clone());
    let observer = Arc::new(SqliteResourceObserver::new(store));
    let reconciler = Arc::new(Reconciler::new(engine, observer.clone()));

    // Document-change listener: one reconciliation per affected user
    let change_reconciler = reconciler.clone();
    let mut changes = observer.subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(team_id) => {
                    let reconciler = change_reconciler.clone();
                    let _ = tokio::task::spawn_blocking(move || {
                        reconcile_team(&reconciler, team_id, Trigger::ChangeNotification);
                    })
                    .await;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "change listener lagged; next sweep catches up");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Periodic sweep: daily-check reconciliation for all users
    let sweep_reconciler = reconciler.clone();
    let sweep_interval = Duration::from_secs(config.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let reconciler = sweep_reconciler.clone();
            let _ = tokio::task::spawn_blocking(move || daily_sweep(&reconciler)).await;
        }
    });

    // Periodic ledger drift repair
    let verify_reconciler = reconciler.clone();
    let verify_interval = Duration::from_secs(config.verify_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(verify_interval);
        loop {
            ticker.tick().await;
            let reconciler = verify_reconciler.clone();
            let _ = tokio::task::spawn_blocking(move || verify_sweep(&reconciler)).await;
        }
    });

    info!("launchprepd ready");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down gracefully");
    Ok(())
}

/// Re-run the resource driver for every user on a team
fn reconcile_team(reconciler: &Reconciler, team_id: Uuid, trigger: Trigger) {
    let users = match reconciler.engine().store().all_users() {
        Ok(users) => users,
        Err(err) => {
            warn!(error = %err, "could not list users for reconciliation");
            return;
        }
    };
    for (user_id, user_team) in users {
        if user_team == team_id {
            reconciler.reconcile_fuel(user_id, team_id, trigger);
        }
    }
}

/// Daily-check trigger for every known user. Activity marking stays with
/// the application layer (it fires on app open, not on a timer).
fn daily_sweep(reconciler: &Reconciler) {
    let users = match reconciler.engine().store().all_users() {
        Ok(users) => users,
        Err(err) => {
            warn!(error = %err, "daily sweep skipped");
            return;
        }
    };
    info!(users = users.len(), "running daily sweep");
    for (user_id, team_id) in users {
        reconciler.reconcile_fuel(user_id, team_id, Trigger::DailyCheck);
    }
}

/// Repair any drift between cached totals and the ledger
fn verify_sweep(reconciler: &Reconciler) {
    let store = reconciler.engine().store();
    let users = match store.all_users() {
        Ok(users) => users,
        Err(err) => {
            warn!(error = %err, "verify sweep skipped");
            return;
        }
    };
    let mut teams: Vec<Uuid> = Vec::new();
    for (user_id, team_id) in users {
        match store.verify_points(user_id) {
            Ok(report) if !report.is_clean() => {
                warn!(%user_id, ?report, "ledger drift repaired");
            }
            Ok(_) => {}
            Err(err) => warn!(%user_id, error = %err, "verify failed"),
        }
        if !teams.contains(&team_id) {
            teams.push(team_id);
        }
    }
    for team_id in teams {
        if let Err(err) = store.verify_team_points(team_id) {
            warn!(%team_id, error = %err, "team verify failed");
        }
    }
}
