pub mod config;
pub mod entry;
pub mod reconcile;
pub mod reminder;
pub mod streak;
pub mod widget;

use chrono::Utc;
use havn_core::sync::{self, PassOutcome, PassSettings};
use havn_core::{Config, EntryStore, SqliteEntryStore, StreakStats, Trigger, WidgetState};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub fn open() -> Result<(Config, SqliteEntryStore), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = SqliteEntryStore::open_default()?;
    Ok((config, store))
}

/// Run one reconcile-then-compute pass and refresh the widget file.
pub fn pass(
    config: &Config,
    store: &SqliteEntryStore,
    trigger: Trigger,
) -> Result<PassOutcome, Box<dyn std::error::Error>> {
    let now = Utc::now();
    let outcome = sync::run_pass(store, &PassSettings::from_config(config), now)?;
    tracing::debug!(?trigger, summary = %outcome.summary.message(), "pass finished");

    if config.widget.enabled {
        if let Err(e) = write_widget(config, &outcome.stats, outcome.has_entry_today, None) {
            tracing::warn!(error = %e, "pass committed but widget state was not written");
        }
    }
    Ok(outcome)
}

/// Streaks over everything in the store, without reconciling, plus whether
/// today has an entry.
pub fn current_stats(
    config: &Config,
    store: &dyn EntryStore,
) -> Result<(StreakStats, bool), Box<dyn std::error::Error>> {
    let zone = config.zone();
    let now = Utc::now();
    let entries = store.fetch_all(None)?;
    let days = havn_core::streak::distinct_days(&entries, &zone);
    let has_entry_today = days.contains(&zone.day_of(now));
    Ok((havn_core::streak::compute(days, now, &zone), has_entry_today))
}

pub fn write_widget(
    config: &Config,
    stats: &StreakStats,
    has_entry_today: bool,
    path: Option<std::path::PathBuf>,
) -> Result<(WidgetState, std::path::PathBuf), Box<dyn std::error::Error>> {
    let now = Utc::now();
    let state = WidgetState::from_stats(stats, has_entry_today, config.security.biometric_lock, now);
    let path = match path {
        Some(p) => p,
        None => config.widget_state_path()?,
    };
    state.write_atomic(&path)?;
    Ok((state, path))
}
