//! Daily journaling reminder.
//!
//! Only the scheduling arithmetic lives here; delivering the notification is
//! the platform's job.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::day::{self, DayZone};

/// When the daily reminder should fire, in local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSchedule {
    pub enabled: bool,
    pub hour: u32,
    pub minute: u32,
}

impl ReminderSchedule {
    fn time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0)
    }

    /// Next fire time strictly after `now`.
    ///
    /// Today's slot when it is still ahead, otherwise tomorrow's. `None` when
    /// the reminder is disabled or the time is out of range.
    pub fn next_fire(&self, now: DateTime<Utc>, zone: &DayZone) -> Option<DateTime<Utc>> {
        if !self.enabled {
            return None;
        }
        let time = self.time()?;
        let today = zone.day_of(now);
        let today_fire = zone.at(today, time);
        if today_fire > now {
            Some(today_fire)
        } else {
            Some(zone.at(day::next(today), time))
        }
    }
}
