//! Reconcile-then-compute passes and the worker that serializes them.
//!
//! Saves on this device and change notifications from the sync layer both
//! arrive as [`Trigger`]s. One worker task owns the pass loop: triggers that
//! pile up while a pass is running collapse into a single follow-up pass, and
//! the latest [`SyncStatus`] is published on a `watch` channel for UI badges
//! and the widget exporter.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::day::{DayWindow, DayZone};
use crate::error::{CoreError, Result};
use crate::reconcile::{DayReconciler, ReconciliationSummary};
use crate::store::EntryStore;
use crate::streak::{self, StreakStats};

/// Why a pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// An entry was saved locally.
    LocalSave,
    /// The sync layer reported remote changes.
    RemoteChange,
}

/// Inputs that stay fixed across passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassSettings {
    pub zone: DayZone,
    /// Reconcile only the last N days; streaks always use full history.
    pub window_days: Option<u32>,
}

impl PassSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            zone: config.zone(),
            window_days: config.reconcile.window_days,
        }
    }
}

/// Result of one successful pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassOutcome {
    pub summary: ReconciliationSummary,
    pub stats: StreakStats,
    /// Whether today, in the pass's zone, has an entry.
    pub has_entry_today: bool,
}

/// Reconcile the store, then compute streaks over what survived.
///
/// # Errors
/// Returns the store error of the first failing read or write. Nothing is
/// compensated; the next pass re-derives the same merge.
pub fn run_pass<S>(store: &S, settings: &PassSettings, now: DateTime<Utc>) -> Result<PassOutcome>
where
    S: EntryStore + ?Sized,
{
    let reconciler = DayReconciler::new(settings.zone);
    let window = settings
        .window_days
        .map(|days| DayWindow::trailing_days(days, now, &settings.zone));
    let plan = reconciler.run(store, window.as_ref(), now)?;

    let days = match window {
        None => plan.days(&settings.zone),
        Some(_) => streak::distinct_days(&store.fetch_all(None)?, &settings.zone),
    };
    let has_entry_today = days.contains(&settings.zone.day_of(now));
    let stats = streak::compute(days, now, &settings.zone);
    tracing::debug!(
        current = stats.current,
        best = stats.best,
        merged = plan.summary.duplicate_days,
        "pass complete"
    );

    Ok(PassOutcome {
        summary: plan.summary,
        stats,
        has_entry_today,
    })
}

/// What the worker last published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Latest successfully computed stats; kept as-is when a pass fails.
    pub stats: StreakStats,
    pub has_entry_today: bool,
    /// Passes attempted so far.
    pub passes: u64,
    pub last_trigger: Option<Trigger>,
    pub last_summary: Option<ReconciliationSummary>,
    /// Error of the most recent pass, cleared by the next success.
    pub last_error: Option<String>,
}

enum Command {
    Run(Trigger),
    Shutdown,
}

/// Cloneable sender side of a running [`SyncWorker`].
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SyncHandle {
    /// Ask for a pass. Returns immediately.
    pub fn notify(&self, trigger: Trigger) -> Result<()> {
        self.tx
            .send(Command::Run(trigger))
            .map_err(|_| CoreError::Custom("sync worker has stopped".into()))
    }

    /// Stop the worker after any queued pass.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Single owner of the reconcile/compute loop.
pub struct SyncWorker;

impl SyncWorker {
    /// Start the worker on the current tokio runtime.
    pub fn spawn<S>(
        store: Arc<S>,
        settings: PassSettings,
    ) -> (SyncHandle, watch::Receiver<SyncStatus>, JoinHandle<()>)
    where
        S: EntryStore + Send + Sync + 'static,
    {
        Self::spawn_with_clock(store, settings, Utc::now)
    }

    /// Like [`SyncWorker::spawn`] with an injected clock.
    pub fn spawn_with_clock<S, C>(
        store: Arc<S>,
        settings: PassSettings,
        clock: C,
    ) -> (SyncHandle, watch::Receiver<SyncStatus>, JoinHandle<()>)
    where
        S: EntryStore + Send + Sync + 'static,
        C: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SyncStatus::default());
        let clock: Clock = Arc::new(clock);
        let task = tokio::spawn(worker_loop(store, settings, clock, rx, status_tx));
        (SyncHandle { tx }, status_rx, task)
    }
}

async fn worker_loop<S>(
    store: Arc<S>,
    settings: PassSettings,
    clock: Clock,
    mut rx: mpsc::UnboundedReceiver<Command>,
    status_tx: watch::Sender<SyncStatus>,
) where
    S: EntryStore + Send + Sync + 'static,
{
    while let Some(cmd) = rx.recv().await {
        let mut trigger = match cmd {
            Command::Run(t) => t,
            Command::Shutdown => break,
        };

        let mut stop = false;
        while let Ok(more) = rx.try_recv() {
            match more {
                Command::Run(t) => trigger = t,
                Command::Shutdown => {
                    stop = true;
                    break;
                }
            }
        }

        let store = Arc::clone(&store);
        let now = clock();
        let result = tokio::task::spawn_blocking(move || run_pass(&*store, &settings, now))
            .await
            .unwrap_or_else(|e| Err(CoreError::Custom(format!("pass panicked: {e}"))));

        status_tx.send_modify(|status| {
            status.passes += 1;
            status.last_trigger = Some(trigger);
            match result {
                Ok(outcome) => {
                    status.stats = outcome.stats;
                    status.has_entry_today = outcome.has_entry_today;
                    status.last_summary = Some(outcome.summary);
                    status.last_error = None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, ?trigger, "sync pass failed; keeping previous stats");
                    status.last_error = Some(e.to_string());
                }
            }
        });

        if stop {
            break;
        }
    }
    tracing::debug!("sync worker stopped");
}
