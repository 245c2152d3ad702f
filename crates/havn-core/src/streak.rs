//! Streak statistics over distinct journal days.
//!
//! A streak is a run of consecutive calendar days that each have an entry.
//! The current streak stays alive through "today" until a whole day is
//! skipped: an entry yesterday keeps it going even if today has none yet.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::day::{self, DayZone};
use crate::entry::Entry;

/// Current and best streak plus the most recent day with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreakStats {
    pub current: u32,
    pub best: u32,
    pub last_entry_day: Option<NaiveDate>,
}

/// Compute streaks for the day containing `reference_now` in `zone`.
pub fn compute<I>(days: I, reference_now: DateTime<Utc>, zone: &DayZone) -> StreakStats
where
    I: IntoIterator<Item = NaiveDate>,
{
    compute_for_day(days, zone.day_of(reference_now))
}

/// Compute streaks relative to `today`.
///
/// Duplicate days in the input are fine; they collapse into one.
pub fn compute_for_day<I>(days: I, today: NaiveDate) -> StreakStats
where
    I: IntoIterator<Item = NaiveDate>,
{
    let days: BTreeSet<NaiveDate> = days.into_iter().collect();
    let Some(&last) = days.last() else {
        return StreakStats::default();
    };

    let mut best = 1u32;
    let mut run = 1u32;
    let mut prev: Option<NaiveDate> = None;
    for &d in &days {
        if let Some(p) = prev {
            if day::days_between(p, d) == 1 {
                run += 1;
                best = best.max(run);
            } else {
                run = 1;
            }
        }
        prev = Some(d);
    }

    let yesterday = day::previous(today);
    let anchor = if days.contains(&today) {
        Some(today)
    } else if days.contains(&yesterday) {
        Some(yesterday)
    } else {
        None
    };

    let mut current = 0u32;
    if let Some(mut d) = anchor {
        while days.contains(&d) {
            current += 1;
            let before = day::previous(d);
            if before == d {
                break;
            }
            d = before;
        }
    }

    StreakStats {
        current,
        best,
        last_entry_day: Some(last),
    }
}

/// Distinct calendar days covered by `entries`.
///
/// Entries without a day key are skipped with a warning.
pub fn distinct_days<'a, I>(entries: I, zone: &DayZone) -> BTreeSet<NaiveDate>
where
    I: IntoIterator<Item = &'a Entry>,
{
    entries
        .into_iter()
        .filter_map(|e| {
            let key = e.day_key(zone);
            if key.is_none() {
                tracing::warn!(entry_id = %e.id, "entry has no day key; excluded from streaks");
            }
            key
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 15).unwrap()
    }

    fn ago(n: i64) -> NaiveDate {
        today() - Duration::days(n)
    }

    #[test]
    fn empty_history_has_no_streak() {
        let stats = compute_for_day(Vec::new(), today());
        assert_eq!(stats, StreakStats { current: 0, best: 0, last_entry_day: None });
    }

    #[test]
    fn single_entry_today() {
        let stats = compute_for_day([today()], today());
        assert_eq!(stats.current, 1);
        assert_eq!(stats.best, 1);
        assert_eq!(stats.last_entry_day, Some(today()));
    }

    #[test]
    fn yesterday_keeps_streak_alive() {
        assert_eq!(compute_for_day([ago(1)], today()).current, 1);
    }

    #[test]
    fn two_days_ago_breaks_streak() {
        let stats = compute_for_day([ago(2)], today());
        assert_eq!(stats.current, 0);
        assert_eq!(stats.best, 1);
    }

    #[test]
    fn best_and_current_diverge() {
        let stats = compute_for_day([ago(10), ago(9), ago(8), today(), ago(1)], today());
        assert_eq!(stats.best, 3);
        assert_eq!(stats.current, 2);
        assert_eq!(stats.last_entry_day, Some(today()));
    }

    #[test]
    fn current_counts_back_from_yesterday() {
        let stats = compute_for_day([ago(1), ago(2), ago(3), ago(5)], today());
        assert_eq!(stats.current, 3);
        assert_eq!(stats.best, 3);
    }

    #[test]
    fn duplicate_days_collapse() {
        let stats = compute_for_day([today(), today(), ago(1), ago(1)], today());
        assert_eq!(stats.current, 2);
        assert_eq!(stats.best, 2);
    }

    #[test]
    fn future_days_do_not_extend_current() {
        let tomorrow = today() + Duration::days(1);
        let stats = compute_for_day([tomorrow, today()], today());
        assert_eq!(stats.current, 1);
        assert_eq!(stats.best, 2);
        assert_eq!(stats.last_entry_day, Some(tomorrow));
    }

    #[test]
    fn streak_spans_month_boundary() {
        let d = |m, day| NaiveDate::from_ymd_opt(2025, m, day).unwrap();
        let stats = compute_for_day([d(2, 27), d(2, 28), d(3, 1)], d(3, 1));
        assert_eq!(stats.current, 3);
        assert_eq!(stats.best, 3);
    }

    #[test]
    fn reference_now_uses_zone_day() {
        // 01:00 UTC on the 16th is still the 15th at UTC-5.
        let zone = DayZone::from_offset_minutes(-300).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 8, 16, 1, 0, 0).unwrap();
        let stats = compute([today()], now, &zone);
        assert_eq!(stats.current, 1);
        assert_eq!(stats.last_entry_day, Some(today()));
    }

    #[test]
    fn later_day_does_not_hide_today() {
        let tomorrow = day::next(today());
        let stats = compute_for_day([today(), tomorrow], today());
        assert_eq!(stats.current, 1);
        assert_eq!(stats.best, 2);
        assert_eq!(stats.last_entry_day, Some(tomorrow));
    }

    #[test]
    fn distinct_days_skips_entries_without_day() {
        let zone = DayZone::utc();
        let now = Utc.with_ymd_and_hms(2025, 8, 15, 9, 0, 0).unwrap();
        let a = Entry::new(today(), &zone, now);
        let mut b = Entry::new(today(), &zone, now);
        b.day = Some(b.day.unwrap() + Duration::hours(13));
        let mut broken = Entry::new(ago(1), &zone, now);
        broken.day = None;

        let days = distinct_days([&a, &b, &broken], &zone);
        assert_eq!(days.into_iter().collect::<Vec<_>>(), vec![today()]);
    }
}
