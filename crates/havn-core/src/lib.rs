//! # Havn Core Library
//!
//! Core logic for the Havn journal: one entry per calendar day, streaks over
//! those days, and the reconciliation that restores the one-per-day rule after
//! two devices write the same day independently.
//!
//! The `havn` CLI and any GUI shell are thin layers over this crate.
//!
//! ## Key Components
//!
//! - [`DayZone`]: maps timestamps to calendar days
//! - [`streak`]: current and best streak over a set of days
//! - [`DayReconciler`]: merges same-day duplicates into one survivor
//! - [`EntryStore`] / [`SqliteEntryStore`]: entry persistence
//! - [`SyncWorker`]: serializes reconcile-then-compute passes
//! - [`Config`]: TOML configuration
//! - [`WidgetState`]: snapshot file for the home-screen widget

pub mod config;
pub mod day;
pub mod entry;
pub mod error;
pub mod reconcile;
pub mod reminder;
pub mod store;
pub mod streak;
pub mod sync;
pub mod widget;

pub use config::Config;
pub use day::{DayWindow, DayZone};
pub use entry::{Entry, EntryId};
pub use error::{ConfigError, CoreError, StoreError};
pub use reconcile::{CommitReport, DayMerge, DayReconciler, Reconciliation, ReconciliationSummary};
pub use reminder::ReminderSchedule;
pub use store::{EntryStore, SqliteEntryStore};
pub use streak::StreakStats;
pub use sync::{PassOutcome, PassSettings, SyncHandle, SyncStatus, SyncWorker, Trigger};
pub use widget::WidgetState;
