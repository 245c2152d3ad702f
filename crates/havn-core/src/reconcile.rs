//! Duplicate-day reconciliation.
//!
//! Two devices can each create "today's" entry before they sync, leaving two
//! records for one calendar day. [`DayReconciler`] folds every such group into
//! a single keeper and schedules the rest for deletion.
//!
//! ## Merge rules
//! - The keeper is the most recently updated entry of the day (ties broken by
//!   the smaller id, so every device picks the same keeper).
//! - Text, photo and ratings from losers fill in only where the keeper is
//!   empty.
//! - Stars are sticky: a starred loser stars the keeper.
//! - Tags are unioned.
//! - `updated_at` becomes the latest of the group.
//!
//! Running the reconciler on its own output changes nothing, which is what
//! makes overlapping runs safe.
//!
//! ## Commit
//! Each duplicate day is committed as one [`DayMerge`], guarded by the
//! `updated_at` every member had when the pass read it. A day whose keeper or
//! losers were edited by another writer in the meantime is skipped and
//! reported as a conflict; the writer's own trigger runs the next pass.
//!
//! ## Usage
//! ```rust,ignore
//! let reconciler = DayReconciler::new(zone);
//! let plan = reconciler.reconcile(store.fetch_all(None)?, Utc::now());
//! reconciler.apply(&store, &plan)?;
//! ```

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::day::{DayWindow, DayZone};
use crate::entry::{Entry, EntryId};
use crate::error::StoreError;
use crate::store::EntryStore;

/// Counts describing one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    /// Entries looked at, malformed ones included.
    pub total_entries: usize,
    /// Distinct calendar days among well-formed entries.
    pub distinct_days: usize,
    /// Days that had more than one entry.
    pub duplicate_days: usize,
    /// Keepers whose fields changed and need saving.
    pub updated_count: usize,
    /// Losers scheduled for deletion.
    pub deleted_count: usize,
    /// Entries skipped because they have no day.
    pub malformed_count: usize,
    /// Days left as-is because another writer changed them after the read.
    #[serde(default)]
    pub conflicted_days: usize,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationSummary {
    pub fn has_changes(&self) -> bool {
        self.updated_count > 0 || self.deleted_count > 0
    }

    /// Human-readable one-liner.
    pub fn message(&self) -> String {
        if self.duplicate_days == 0 {
            format!("No duplicate days across {} day(s).", self.distinct_days)
        } else {
            format!(
                "Merged {} duplicate day(s): {} entry(ies) removed, {} updated.",
                self.duplicate_days, self.deleted_count, self.updated_count
            )
        }
    }
}

/// Outcome of [`DayReconciler::reconcile`]: what survives and what to commit.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// One entry per distinct day, ordered by day.
    pub survivors: Vec<Entry>,
    /// Keepers that absorbed data from losers; these must be saved.
    pub updated: Vec<Entry>,
    /// Losers to remove from the store.
    pub deletions: BTreeSet<EntryId>,
    /// Entries without a day key; left untouched.
    pub malformed: Vec<EntryId>,
    /// Commit units, one per duplicate day.
    pub merges: Vec<DayMerge>,
    pub summary: ReconciliationSummary,
}

/// Everything needed to commit one duplicate day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayMerge {
    pub day: NaiveDate,
    /// The keeper after merging.
    pub keeper: Entry,
    /// Whether `keeper` differs from the stored row and must be written.
    pub changed: bool,
    /// Keeper `updated_at` as read.
    pub keeper_read_at: DateTime<Utc>,
    /// Losers with the `updated_at` they had when read.
    pub losers: Vec<(EntryId, DateTime<Utc>)>,
}

/// What a store actually committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    pub saved: usize,
    pub deleted: usize,
    /// Ids on skipped days that no longer matched the read.
    pub conflicts: BTreeSet<EntryId>,
    pub conflicted_days: usize,
}

impl Reconciliation {
    /// Calendar days of the survivors.
    pub fn days(&self, zone: &DayZone) -> BTreeSet<NaiveDate> {
        self.survivors.iter().filter_map(|e| e.day_key(zone)).collect()
    }
}

/// Groups entries by calendar day and merges duplicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct DayReconciler {
    zone: DayZone,
}

impl DayReconciler {
    pub fn new(zone: DayZone) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> &DayZone {
        &self.zone
    }

    /// Plan the merge for `entries`. Pure: the store is not touched.
    pub fn reconcile(&self, entries: Vec<Entry>, now: DateTime<Utc>) -> Reconciliation {
        let total_entries = entries.len();
        let mut malformed = Vec::new();
        let mut keyed: Vec<(NaiveDate, Entry)> = Vec::with_capacity(entries.len());

        for entry in entries {
            match entry.day_key(&self.zone) {
                Some(day) => keyed.push((day, entry)),
                None => {
                    tracing::warn!(entry_id = %entry.id, "entry has no day key; skipping reconciliation");
                    malformed.push(entry.id);
                }
            }
        }

        keyed.sort_by(|(a_day, a), (b_day, b)| {
            a_day.cmp(b_day).then_with(|| keeper_order(a, b))
        });

        let mut survivors: Vec<Entry> = Vec::new();
        let mut updated = Vec::new();
        let mut deletions = BTreeSet::new();
        let mut merges = Vec::new();

        let mut iter = keyed.into_iter().peekable();
        while let Some((day, mut keeper)) = iter.next() {
            let keeper_read_at = keeper.updated_at;
            let mut changed = false;
            let mut losers = Vec::new();
            while let Some((_, loser)) = iter.next_if(|(d, _)| *d == day) {
                changed |= merge_into(&mut keeper, &loser);
                deletions.insert(loser.id);
                losers.push((loser.id, loser.updated_at));
            }
            if !losers.is_empty() {
                tracing::debug!(%day, keeper = %keeper.id, changed, "merged duplicate day");
                merges.push(DayMerge {
                    day,
                    keeper: keeper.clone(),
                    changed,
                    keeper_read_at,
                    losers,
                });
            }
            if changed {
                updated.push(keeper.clone());
            }
            survivors.push(keeper);
        }
        let duplicate_days = merges.len();

        let summary = ReconciliationSummary {
            total_entries,
            distinct_days: survivors.len(),
            duplicate_days,
            updated_count: updated.len(),
            deleted_count: deletions.len(),
            malformed_count: malformed.len(),
            conflicted_days: 0,
            reconciled_at: now,
        };

        Reconciliation {
            survivors,
            updated,
            deletions,
            malformed,
            merges,
            summary,
        }
    }

    /// Commit a plan through [`EntryStore::commit`].
    ///
    /// Days changed by another writer since the read are skipped, never
    /// overwritten. A failed commit changes nothing; the next pass re-derives
    /// the same merge.
    pub fn apply<S>(&self, store: &S, plan: &Reconciliation) -> Result<CommitReport, StoreError>
    where
        S: EntryStore + ?Sized,
    {
        if plan.merges.is_empty() {
            return Ok(CommitReport::default());
        }
        let report = store.commit(&plan.merges)?;
        if report.conflicted_days > 0 {
            tracing::warn!(
                days = report.conflicted_days,
                entries = report.conflicts.len(),
                "entries changed since read; leaving those days for the next pass"
            );
        }
        tracing::info!(
            updated = report.saved,
            deleted = report.deleted,
            "committed day reconciliation"
        );
        Ok(report)
    }

    /// Fetch, reconcile and commit in one go.
    pub fn run<S>(
        &self,
        store: &S,
        window: Option<&DayWindow>,
        now: DateTime<Utc>,
    ) -> Result<Reconciliation, StoreError>
    where
        S: EntryStore + ?Sized,
    {
        let entries = store.fetch_all(window)?;
        let mut plan = self.reconcile(entries, now);
        let report = self.apply(store, &plan)?;
        plan.summary.conflicted_days = report.conflicted_days;
        Ok(plan)
    }
}

/// Most recently updated first, then smallest id.
fn keeper_order(a: &Entry, b: &Entry) -> Ordering {
    b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id))
}

/// Fold `loser` into `keeper`. Returns whether `keeper` changed.
pub fn merge_into(keeper: &mut Entry, loser: &Entry) -> bool {
    let mut changed = false;

    if !keeper.has_text() && loser.has_text() {
        keeper.text = loser.text.clone();
        changed = true;
    }
    if !keeper.has_photo() && loser.has_photo() {
        keeper.photo = loser.photo.clone();
        changed = true;
    }
    changed |= fill_rating(&mut keeper.mood_score, loser.mood_score);
    changed |= fill_rating(&mut keeper.energy_score, loser.energy_score);
    changed |= fill_rating(&mut keeper.weather_score, loser.weather_score);

    if loser.is_starred && !keeper.is_starred {
        keeper.is_starred = true;
        changed = true;
    }

    let before = keeper.tags.len();
    keeper.tags.extend(loser.tags.iter().cloned());
    changed |= keeper.tags.len() != before;

    if loser.updated_at > keeper.updated_at {
        keeper.updated_at = loser.updated_at;
        changed = true;
    }

    changed
}

fn fill_rating(keeper: &mut Option<i16>, loser: Option<i16>) -> bool {
    if keeper.is_none() && loser.is_some() {
        *keeper = loser;
        true
    } else {
        false
    }
}
