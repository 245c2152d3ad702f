//! Logical day keys.
//!
//! Entries are grouped by the local calendar day they belong to. A [`DayZone`]
//! decides what "local" means: the process time zone, or a fixed UTC offset
//! pinned in configuration so that every device agrees on day boundaries.

use chrono::{
    DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
    Utc,
};
use serde::{Deserialize, Serialize};

/// Time zone used to truncate timestamps to calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DayZone {
    /// The operating system's local time zone.
    #[default]
    Local,
    /// A fixed offset from UTC.
    Fixed(FixedOffset),
}

impl DayZone {
    /// Zone for a fixed offset in minutes east of UTC.
    ///
    /// Returns `None` when the offset is outside +/- 24h.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(DayZone::Fixed)
    }

    pub fn utc() -> Self {
        DayZone::Fixed(Utc.fix())
    }

    /// Calendar day containing `ts` in this zone.
    pub fn day_of(&self, ts: DateTime<Utc>) -> NaiveDate {
        match self {
            DayZone::Local => ts.with_timezone(&Local).date_naive(),
            DayZone::Fixed(offset) => ts.with_timezone(offset).date_naive(),
        }
    }

    /// First instant of `day` in this zone.
    ///
    /// When local midnight does not exist (DST gap) or is ambiguous, the
    /// earliest valid instant of that wall-clock hour is used.
    pub fn start_of(&self, day: NaiveDate) -> DateTime<Utc> {
        let midnight = day.and_time(NaiveTime::MIN);
        match self {
            DayZone::Local => resolve_local(&Local, midnight),
            DayZone::Fixed(offset) => resolve_local(offset, midnight),
        }
    }

    /// Local wall-clock `time` on `day`, converted to UTC.
    pub fn at(&self, day: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let naive = day.and_time(time);
        match self {
            DayZone::Local => resolve_local(&Local, naive),
            DayZone::Fixed(offset) => resolve_local(offset, naive),
        }
    }
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }
    // Skipped by a DST transition: the wall clock jumps forward, so an hour
    // later always exists.
    let shifted = naive + Duration::hours(1);
    tz.from_local_datetime(&shifted)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Day after `day`.
pub fn next(day: NaiveDate) -> NaiveDate {
    day.succ_opt().unwrap_or(day)
}

/// Day before `day`.
pub fn previous(day: NaiveDate) -> NaiveDate {
    day.pred_opt().unwrap_or(day)
}

/// Whole calendar days from `from` to `to` (negative when `to` is earlier).
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Half-open UTC interval covering a run of local calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl DayWindow {
    /// Window covering `first..=last` local days.
    pub fn days(first: NaiveDate, last: NaiveDate, zone: &DayZone) -> Self {
        Self {
            from: zone.start_of(first),
            until: zone.start_of(next(last)),
        }
    }

    /// The last `days` local days, today included. Zero is treated as one.
    pub fn trailing_days(days: u32, now: DateTime<Utc>, zone: &DayZone) -> Self {
        let today = zone.day_of(now);
        let span = i64::from(days.max(1)) - 1;
        let first = today
            .checked_sub_signed(Duration::days(span))
            .unwrap_or(NaiveDate::MIN);
        Self::days(first, today, zone)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from <= ts && ts < self.until
    }
}
