//! Entry persistence.
//!
//! [`EntryStore`] is the seam between the core logic and whatever holds the
//! entries. The bundled implementation is SQLite ([`SqliteEntryStore`]).

mod migrations;
pub mod sqlite;

pub use sqlite::SqliteEntryStore;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::day::DayWindow;
use crate::entry::{Entry, EntryId};
use crate::error::StoreError;
use crate::reconcile::{CommitReport, DayMerge};

/// Storage operations needed by reconciliation and streaks.
///
/// Implementations must make `save` and `delete` atomic with respect to other
/// writers. Deleting an id that no longer exists is not an error.
pub trait EntryStore {
    /// All entries, or only those whose day falls inside `window`.
    ///
    /// Entries without a day are only returned when `window` is `None`.
    fn fetch_all(&self, window: Option<&DayWindow>) -> Result<Vec<Entry>, StoreError>;

    /// Insert or update entries by id.
    fn save(&self, entries: &[Entry]) -> Result<(), StoreError>;

    /// Remove entries by id, returning how many rows were actually removed.
    fn delete(&self, ids: &BTreeSet<EntryId>) -> Result<usize, StoreError>;

    /// Commit reconciled days atomically with respect to other writers.
    ///
    /// A day is written (keeper saved if changed, losers deleted) only when
    /// every member's stored `updated_at` still equals the one in the
    /// [`DayMerge`]. Other days are left untouched and reported in
    /// [`CommitReport::conflicts`].
    fn commit(&self, merges: &[DayMerge]) -> Result<CommitReport, StoreError>;
}

impl<S: EntryStore + ?Sized> EntryStore for Arc<S> {
    fn fetch_all(&self, window: Option<&DayWindow>) -> Result<Vec<Entry>, StoreError> {
        (**self).fetch_all(window)
    }

    fn save(&self, entries: &[Entry]) -> Result<(), StoreError> {
        (**self).save(entries)
    }

    fn delete(&self, ids: &BTreeSet<EntryId>) -> Result<usize, StoreError> {
        (**self).delete(ids)
    }

    fn commit(&self, merges: &[DayMerge]) -> Result<CommitReport, StoreError> {
        (**self).commit(merges)
    }
}

/// Returns the Havn data directory.
///
/// `HAVN_DATA_DIR` wins when set. Otherwise `~/.config/havn`, or
/// `~/.config/havn-dev` when `HAVN_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("HAVN_DATA_DIR") {
        Some(custom) if !custom.is_empty() => PathBuf::from(custom),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("HAVN_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("havn-dev")
            } else {
                base_dir.join("havn")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
