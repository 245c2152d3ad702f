//! Reconciliation against a real SQLite store.
//!
//! Covers the multi-device scenario end to end: duplicates written on two
//! devices, a failed commit, a writer racing the pass, and re-runs converging.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use havn_core::{
    CommitReport, DayMerge, DayReconciler, DayWindow, DayZone, Entry, EntryId, EntryStore,
    SqliteEntryStore, StoreError,
};
use proptest::prelude::*;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 15, 12, 0, 0).unwrap()
}

fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 15).unwrap() - Duration::days(offset)
}

fn entry(days_ago: i64, updated_min: i64) -> Entry {
    let mut e = Entry::new(day(days_ago), &DayZone::utc(), now());
    e.updated_at = now() + Duration::minutes(updated_min);
    e
}

/// SQLite store whose commits can be made to fail.
struct FlakyStore {
    inner: SqliteEntryStore,
    fail_commit: AtomicBool,
}

impl EntryStore for FlakyStore {
    fn fetch_all(&self, window: Option<&DayWindow>) -> Result<Vec<Entry>, StoreError> {
        self.inner.fetch_all(window)
    }

    fn save(&self, entries: &[Entry]) -> Result<(), StoreError> {
        self.inner.save(entries)
    }

    fn delete(&self, ids: &BTreeSet<EntryId>) -> Result<usize, StoreError> {
        self.inner.delete(ids)
    }

    fn commit(&self, merges: &[DayMerge]) -> Result<CommitReport, StoreError> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("disk full".into()));
        }
        self.inner.commit(merges)
    }
}

/// SQLite store where another device writes `pending` right after a read.
struct RacingStore {
    inner: SqliteEntryStore,
    pending: Mutex<Option<Entry>>,
}

impl EntryStore for RacingStore {
    fn fetch_all(&self, window: Option<&DayWindow>) -> Result<Vec<Entry>, StoreError> {
        let snapshot = self.inner.fetch_all(window)?;
        if let Some(edit) = self.pending.lock().unwrap().take() {
            self.inner.save(&[edit])?;
        }
        Ok(snapshot)
    }

    fn save(&self, entries: &[Entry]) -> Result<(), StoreError> {
        self.inner.save(entries)
    }

    fn delete(&self, ids: &BTreeSet<EntryId>) -> Result<usize, StoreError> {
        self.inner.delete(ids)
    }

    fn commit(&self, merges: &[DayMerge]) -> Result<CommitReport, StoreError> {
        self.inner.commit(merges)
    }
}

#[test]
fn two_devices_same_day_merge_into_one() {
    let store = SqliteEntryStore::open_memory().unwrap();

    let mut phone = entry(0, 0);
    phone.text = Some("Walked to the harbour.".into());
    phone.tags.insert("outside".into());
    let mut tablet = entry(0, 10);
    tablet.photo = Some(vec![0xFF, 0xD8, 0xFF]);
    tablet.mood_score = Some(4);
    tablet.tags.insert("family".into());
    store.save(&[phone.clone(), tablet.clone()]).unwrap();

    let plan = DayReconciler::new(DayZone::utc())
        .run(&store, None, now())
        .unwrap();

    assert_eq!(plan.survivors.len(), 1);
    assert_eq!(plan.summary.deleted_count, 1);
    assert_eq!(store.count().unwrap(), 1);

    let kept = store.get(tablet.id).unwrap().expect("newest entry survives");
    assert_eq!(kept.text.as_deref(), Some("Walked to the harbour."));
    assert_eq!(kept.photo, Some(vec![0xFF, 0xD8, 0xFF]));
    assert_eq!(kept.mood_score, Some(4));
    assert!(kept.tags.contains("outside") && kept.tags.contains("family"));
    assert!(store.get(phone.id).unwrap().is_none());
}

#[test]
fn window_leaves_older_duplicates_alone() {
    let store = SqliteEntryStore::open_memory().unwrap();
    store
        .save(&[entry(0, 0), entry(0, 1), entry(30, 0), entry(30, 1)])
        .unwrap();

    let window = DayWindow::trailing_days(7, now(), &DayZone::utc());
    let plan = DayReconciler::new(DayZone::utc())
        .run(&store, Some(&window), now())
        .unwrap();

    assert_eq!(plan.summary.total_entries, 2);
    assert_eq!(store.count().unwrap(), 3);
}

#[test]
fn failed_commit_loses_nothing_and_rerun_converges() {
    let store = FlakyStore {
        inner: SqliteEntryStore::open_memory().unwrap(),
        fail_commit: AtomicBool::new(true),
    };
    let mut older = entry(1, 0);
    older.text = Some("kept text".into());
    let newer = entry(1, 5);
    store.save(&[older.clone(), newer.clone()]).unwrap();

    let reconciler = DayReconciler::new(DayZone::utc());
    let err = reconciler.run(&store, None, now()).unwrap_err();
    assert!(matches!(err, StoreError::WriteFailed(_)));
    assert_eq!(store.inner.get(older.id).unwrap(), Some(older.clone()));
    assert_eq!(store.inner.get(newer.id).unwrap(), Some(newer.clone()));

    store.fail_commit.store(false, Ordering::SeqCst);
    let plan = reconciler.run(&store, None, now()).unwrap();
    assert_eq!(plan.summary.deleted_count, 1);
    assert_eq!(store.inner.count().unwrap(), 1);
    let keeper = store.inner.get(newer.id).unwrap().unwrap();
    assert_eq!(keeper.text.as_deref(), Some("kept text"));

    let again = reconciler.run(&store, None, now()).unwrap();
    assert!(!again.summary.has_changes());
}

#[test]
fn keeper_edited_during_pass_is_not_overwritten() {
    let inner = SqliteEntryStore::open_memory().unwrap();
    let mut loser = entry(0, 0);
    loser.is_starred = true;
    let keeper = entry(0, 10);
    inner.save(&[loser.clone(), keeper.clone()]).unwrap();

    let mut typed = keeper.clone();
    typed.text = Some("typed on device after the read".into());
    typed.touch(now() + Duration::minutes(20));
    let store = RacingStore {
        inner,
        pending: Mutex::new(Some(typed.clone())),
    };

    let reconciler = DayReconciler::new(DayZone::utc());
    let plan = reconciler.run(&store, None, now()).unwrap();
    assert_eq!(plan.summary.conflicted_days, 1);
    assert_eq!(store.inner.get(keeper.id).unwrap(), Some(typed.clone()));
    assert!(store.inner.get(loser.id).unwrap().is_some());

    // Next pass sees the edit and merges around it.
    let plan = reconciler.run(&store, None, now()).unwrap();
    assert_eq!(plan.summary.conflicted_days, 0);
    let kept = store.inner.get(keeper.id).unwrap().unwrap();
    assert_eq!(kept.text, typed.text);
    assert!(kept.is_starred);
    assert!(store.inner.get(loser.id).unwrap().is_none());
}

#[test]
fn loser_edited_during_pass_is_not_deleted() {
    let inner = SqliteEntryStore::open_memory().unwrap();
    let loser = entry(0, 0);
    let mut keeper = entry(0, 10);
    keeper.text = Some("morning".into());
    inner.save(&[loser.clone(), keeper.clone()]).unwrap();

    let mut photo = loser.clone();
    photo.photo = Some(vec![0xFF, 0xD8]);
    photo.touch(now() + Duration::minutes(30));
    let store = RacingStore {
        inner,
        pending: Mutex::new(Some(photo.clone())),
    };

    let reconciler = DayReconciler::new(DayZone::utc());
    let plan = reconciler.run(&store, None, now()).unwrap();
    assert_eq!(plan.summary.conflicted_days, 1);
    assert_eq!(store.inner.get(loser.id).unwrap(), Some(photo));
    assert_eq!(store.inner.count().unwrap(), 2);

    // The edited entry is now the newest, so it keeps the day and absorbs the text.
    reconciler.run(&store, None, now()).unwrap();
    assert_eq!(store.inner.count().unwrap(), 1);
    let kept = store.inner.get(loser.id).unwrap().unwrap();
    assert_eq!(kept.text.as_deref(), Some("morning"));
    assert_eq!(kept.photo, Some(vec![0xFF, 0xD8]));
}

#[test]
fn malformed_rows_survive_reconciliation() {
    let store = SqliteEntryStore::open_memory().unwrap();
    let mut orphan = entry(0, 0);
    orphan.day = None;
    store.save(&[orphan.clone(), entry(0, 0)]).unwrap();

    let plan = DayReconciler::new(DayZone::utc())
        .run(&store, None, now())
        .unwrap();
    assert_eq!(plan.malformed, vec![orphan.id]);
    assert!(store.get(orphan.id).unwrap().is_some());
}

fn arb_entries() -> impl Strategy<Value = Vec<(i64, i64, bool, bool)>> {
    prop::collection::vec((0i64..12, 0i64..240, any::<bool>(), any::<bool>()), 0..40)
}

fn build(specs: &[(i64, i64, bool, bool)]) -> Vec<Entry> {
    specs
        .iter()
        .enumerate()
        .map(|(i, &(days_ago, minutes, with_text, starred))| {
            let mut e = entry(days_ago, minutes);
            if with_text {
                e.text = Some(format!("note {i}"));
            }
            e.is_starred = starred;
            e
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_one_survivor_per_day_and_rerun_is_noop(specs in arb_entries()) {
        let store = SqliteEntryStore::open_memory().unwrap();
        let entries = build(&specs);
        store.save(&entries).unwrap();

        let expected_days: BTreeSet<NaiveDate> = specs.iter().map(|s| day(s.0)).collect();
        let text_days: BTreeSet<NaiveDate> = specs.iter().filter(|s| s.2).map(|s| day(s.0)).collect();
        let starred_days: BTreeSet<NaiveDate> = specs.iter().filter(|s| s.3).map(|s| day(s.0)).collect();

        let reconciler = DayReconciler::new(DayZone::utc());
        let plan = reconciler.run(&store, None, now()).unwrap();
        prop_assert_eq!(plan.days(&DayZone::utc()), expected_days.clone());

        let stored = store.fetch_all(None).unwrap();
        prop_assert_eq!(stored.len(), expected_days.len());
        for e in &stored {
            let d = e.day_key(&DayZone::utc()).unwrap();
            prop_assert_eq!(e.has_text(), text_days.contains(&d));
            prop_assert_eq!(e.is_starred, starred_days.contains(&d));
        }

        let again = reconciler.run(&store, None, now()).unwrap();
        prop_assert!(!again.summary.has_changes());
        prop_assert_eq!(store.count().unwrap(), expected_days.len());
    }

    #[test]
    fn prop_input_order_does_not_change_survivors(specs in arb_entries(), seed in any::<u64>()) {
        let entries = build(&specs);
        let mut shuffled = entries.clone();
        let len = shuffled.len();
        if len > 1 {
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();
        }

        let reconciler = DayReconciler::new(DayZone::utc());
        let a = reconciler.reconcile(entries, now());
        let b = reconciler.reconcile(shuffled, now());
        let ids_a: Vec<EntryId> = a.survivors.iter().map(|e| e.id).collect();
        let ids_b: Vec<EntryId> = b.survivors.iter().map(|e| e.id).collect();
        prop_assert_eq!(ids_a, ids_b);
        prop_assert_eq!(a.deletions, b.deletions);
    }
}
