//! Home-screen widget bridge.
//!
//! The widget runs in a separate process and only reads a small JSON file.
//! Keys are camelCase because the widget decodes them as-is.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::streak::StreakStats;

/// Snapshot consumed by the widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetState {
    pub has_entry_today: bool,
    pub streak: u32,
    pub best_streak: u32,
    pub locked: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for WidgetState {
    fn default() -> Self {
        Self {
            has_entry_today: false,
            streak: 0,
            best_streak: 0,
            locked: false,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl WidgetState {
    /// `has_entry_today` must come from the day set, not from
    /// `stats.last_entry_day`: a later day can exist alongside today.
    pub fn from_stats(
        stats: &StreakStats,
        has_entry_today: bool,
        locked: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            has_entry_today,
            streak: stats.current,
            best_streak: stats.best,
            locked,
            updated_at: now,
        }
    }

    /// Write the state so that readers never observe a partial file.
    ///
    /// The JSON goes to a sibling temp file first and is renamed into place.
    pub fn write_atomic(&self, path: &Path) -> Result<(), CoreError> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let file_name = path
            .file_name()
            .ok_or_else(|| CoreError::Custom(format!("not a file path: {}", path.display())))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = dir.join(tmp_name);

        let json = serde_json::to_vec_pretty(self)?;
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;
        tracing::debug!(path = %path.display(), streak = self.streak, "widget state written");
        Ok(())
    }

    /// Read a state file, falling back to the empty state when it is missing
    /// or unreadable.
    pub fn load(path: &Path) -> Self {
        std::fs::read(path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }
}
