//! SQLite-backed entry store.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Statement, TransactionBehavior};

use super::{data_dir, migrations, EntryStore};
use crate::day::DayWindow;
use crate::entry::{Entry, EntryId};
use crate::error::StoreError;
use crate::reconcile::{CommitReport, DayMerge};

const ENTRY_COLUMNS: &str = "id, day, text, photo, is_starred, mood_score, energy_score,
     weather_score, tags, created_at, updated_at";

const UPSERT_SQL: &str = "INSERT INTO entries (id, day, text, photo, is_starred, mood_score,
         energy_score, weather_score, tags, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
     ON CONFLICT(id) DO UPDATE SET
         day = excluded.day,
         text = excluded.text,
         photo = excluded.photo,
         is_starred = excluded.is_starred,
         mood_score = excluded.mood_score,
         energy_score = excluded.energy_score,
         weather_score = excluded.weather_score,
         tags = excluded.tags,
         created_at = excluded.created_at,
         updated_at = excluded.updated_at";

/// Entry store on a single SQLite connection.
///
/// The connection sits behind a mutex, so each `save`/`delete` commits as one
/// transaction that no other caller can interleave with.
pub struct SqliteEntryStore {
    conn: Mutex<Connection>,
}

impl SqliteEntryStore {
    /// Open the store at `<data_dir>/havn.db`.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened or
    /// migrated.
    pub fn open_default() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::ReadFailed(e.to_string()))?;
        Self::open(dir.join("havn.db"))
    }

    /// Open (creating if needed) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory store.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::OpenFailed {
            path: ":memory:".into(),
            source,
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::ReadFailed("entry store connection poisoned".into()))
    }

    /// Insert a single entry; shorthand for `save(&[entry])`.
    pub fn insert(&self, entry: &Entry) -> Result<(), StoreError> {
        self.save(std::slice::from_ref(entry))
    }

    /// Look up one entry by id.
    pub fn get(&self, id: EntryId) -> Result<Option<Entry>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1");
        let entry = conn
            .query_row(&sql, params![id.to_string()], row_to_entry)
            .optional()?;
        Ok(entry)
    }

    /// Number of stored entries.
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

impl EntryStore for SqliteEntryStore {
    fn fetch_all(&self, window: Option<&DayWindow>) -> Result<Vec<Entry>, StoreError> {
        let conn = self.lock()?;
        let entries = match window {
            Some(w) => {
                let sql = format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries
                     WHERE day >= ?1 AND day < ?2
                     ORDER BY day, updated_at DESC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![ts(w.from), ts(w.until)], row_to_entry)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries ORDER BY day, updated_at DESC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], row_to_entry)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(entries)
    }

    fn save(&self, entries: &[Entry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(StoreError::write)?;
        {
            let mut stmt = tx.prepare(UPSERT_SQL).map_err(StoreError::write)?;
            for e in entries {
                upsert(&mut stmt, e)?;
            }
        }
        tx.commit().map_err(StoreError::write)?;
        Ok(())
    }

    fn delete(&self, ids: &BTreeSet<EntryId>) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(StoreError::write)?;
        let mut removed = 0;
        {
            let mut stmt = tx
                .prepare("DELETE FROM entries WHERE id = ?1")
                .map_err(StoreError::write)?;
            for id in ids {
                removed += stmt
                    .execute(params![id.to_string()])
                    .map_err(StoreError::write)?;
            }
        }
        tx.commit().map_err(StoreError::write)?;
        Ok(removed)
    }

    fn commit(&self, merges: &[DayMerge]) -> Result<CommitReport, StoreError> {
        let mut report = CommitReport::default();
        if merges.is_empty() {
            return Ok(report);
        }
        let mut conn = self.lock()?;
        // IMMEDIATE takes the write lock before the stamps are checked.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::write)?;
        {
            let mut stamp = tx
                .prepare("SELECT updated_at FROM entries WHERE id = ?1")
                .map_err(StoreError::write)?;
            let mut save = tx.prepare(UPSERT_SQL).map_err(StoreError::write)?;
            let mut remove = tx
                .prepare("DELETE FROM entries WHERE id = ?1")
                .map_err(StoreError::write)?;

            for merge in merges {
                let members = std::iter::once((merge.keeper.id, merge.keeper_read_at))
                    .chain(merge.losers.iter().copied());
                let mut stale = Vec::new();
                for (id, read_at) in members {
                    let current = stamp
                        .query_row(params![id.to_string()], |row| {
                            let raw: String = row.get(0)?;
                            parse_ts(0, &raw)
                        })
                        .optional()
                        .map_err(StoreError::write)?;
                    if current != Some(read_at) {
                        stale.push(id);
                    }
                }
                if !stale.is_empty() {
                    tracing::debug!(day = %merge.day, ?stale, "day changed since read; skipping");
                    report.conflicted_days += 1;
                    report.conflicts.extend(stale);
                    continue;
                }

                if merge.changed {
                    upsert(&mut save, &merge.keeper)?;
                    report.saved += 1;
                }
                for (id, _) in &merge.losers {
                    report.deleted += remove
                        .execute(params![id.to_string()])
                        .map_err(StoreError::write)?;
                }
            }
        }
        tx.commit().map_err(StoreError::write)?;
        Ok(report)
    }
}

fn upsert(stmt: &mut Statement<'_>, e: &Entry) -> Result<(), StoreError> {
    let tags = serde_json::to_string(&e.tags).map_err(|err| StoreError::WriteFailed(err.to_string()))?;
    stmt.execute(params![
        e.id.to_string(),
        e.day.map(ts),
        e.text,
        e.photo,
        e.is_starred,
        e.mood_score,
        e.energy_score,
        e.weather_score,
        tags,
        ts(e.created_at),
        ts(e.updated_at),
    ])
    .map_err(StoreError::write)?;
    Ok(())
}

/// Fixed-width UTC timestamps keep lexical and chronological order identical.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let id: String = row.get(0)?;
    let id = id
        .parse::<EntryId>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    let day = row
        .get::<_, Option<String>>(1)?
        .map(|raw| parse_ts(1, &raw))
        .transpose()?;
    let tags: String = row.get(8)?;
    let tags: BTreeSet<String> = serde_json::from_str(&tags)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(Entry {
        id,
        day,
        text: row.get(2)?,
        photo: row.get(3)?,
        is_starred: row.get(4)?,
        mood_score: row.get(5)?,
        energy_score: row.get(6)?,
        weather_score: row.get(7)?,
        tags,
        created_at: parse_ts(9, &created_at)?,
        updated_at: parse_ts(10, &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::day::DayZone;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, d).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 15, 9, 30, 0).unwrap() + Duration::nanoseconds(123_456_789)
    }

    #[test]
    fn save_and_fetch_preserves_every_field() {
        let store = SqliteEntryStore::open_memory().unwrap();
        let zone = DayZone::utc();
        let mut e = Entry::new(day(15), &zone, now());
        e.text = Some("Walked 2 miles".into());
        e.photo = Some(vec![0xff, 0xd8, 0xff]);
        e.is_starred = true;
        e.mood_score = Some(4);
        e.weather_score = Some(2);
        e.tags.insert("walk".into());
        store.insert(&e).unwrap();

        let all = store.fetch_all(None).unwrap();
        assert_eq!(all, vec![e.clone()]);
        assert_eq!(store.get(e.id).unwrap(), Some(e));
    }

    #[test]
    fn save_upserts_by_id() {
        let store = SqliteEntryStore::open_memory().unwrap();
        let zone = DayZone::utc();
        let mut e = Entry::new(day(15), &zone, now());
        store.insert(&e).unwrap();
        e.text = Some("edited".into());
        e.touch(now() + Duration::minutes(5));
        store.insert(&e).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get(e.id).unwrap().unwrap().text.as_deref(), Some("edited"));
    }

    #[test]
    fn delete_is_idempotent() {
        let store = SqliteEntryStore::open_memory().unwrap();
        let zone = DayZone::utc();
        let e = Entry::new(day(15), &zone, now());
        store.insert(&e).unwrap();

        let ids: BTreeSet<EntryId> = [e.id].into_iter().collect();
        assert_eq!(store.delete(&ids).unwrap(), 1);
        assert_eq!(store.delete(&ids).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    fn merge_of(keeper: &Entry, losers: &[&Entry]) -> DayMerge {
        let mut merged = keeper.clone();
        merged.is_starred = true;
        DayMerge {
            day: day(15),
            keeper: merged,
            changed: true,
            keeper_read_at: keeper.updated_at,
            losers: losers.iter().map(|l| (l.id, l.updated_at)).collect(),
        }
    }

    #[test]
    fn commit_writes_keeper_and_removes_losers() {
        let store = SqliteEntryStore::open_memory().unwrap();
        let zone = DayZone::utc();
        let keeper = Entry::new(day(15), &zone, now());
        let loser = Entry::new(day(15), &zone, now() - Duration::minutes(5));
        store.save(&[keeper.clone(), loser.clone()]).unwrap();

        let report = store.commit(&[merge_of(&keeper, &[&loser])]).unwrap();
        assert_eq!(report.saved, 1);
        assert_eq!(report.deleted, 1);
        assert!(report.conflicts.is_empty());
        assert!(store.get(keeper.id).unwrap().unwrap().is_starred);
        assert!(store.get(loser.id).unwrap().is_none());
    }

    #[test]
    fn commit_skips_day_edited_after_read() {
        let store = SqliteEntryStore::open_memory().unwrap();
        let zone = DayZone::utc();
        let keeper = Entry::new(day(15), &zone, now());
        let loser = Entry::new(day(15), &zone, now() - Duration::minutes(5));
        store.save(&[keeper.clone(), loser.clone()]).unwrap();
        let merge = merge_of(&keeper, &[&loser]);

        let mut edited = loser.clone();
        edited.text = Some("late edit".into());
        edited.touch(now() + Duration::minutes(1));
        store.save(&[edited.clone()]).unwrap();

        let report = store.commit(&[merge]).unwrap();
        assert_eq!(report.conflicted_days, 1);
        assert_eq!(report.conflicts, BTreeSet::from([loser.id]));
        assert_eq!((report.saved, report.deleted), (0, 0));
        assert_eq!(store.get(loser.id).unwrap(), Some(edited));
        assert!(!store.get(keeper.id).unwrap().unwrap().is_starred);
    }

    #[test]
    fn commit_treats_vanished_rows_as_conflicts() {
        let store = SqliteEntryStore::open_memory().unwrap();
        let zone = DayZone::utc();
        let keeper = Entry::new(day(15), &zone, now());
        let loser = Entry::new(day(15), &zone, now() - Duration::minutes(5));
        store.save(&[keeper.clone(), loser.clone()]).unwrap();
        let merge = merge_of(&keeper, &[&loser]);

        store.delete(&BTreeSet::from([keeper.id])).unwrap();
        let report = store.commit(&[merge]).unwrap();
        assert_eq!(report.conflicts, BTreeSet::from([keeper.id]));
        assert!(store.get(keeper.id).unwrap().is_none());
        assert!(store.get(loser.id).unwrap().is_some());
    }

    #[test]
    fn window_filters_by_day_and_skips_dayless_entries() {
        let store = SqliteEntryStore::open_memory().unwrap();
        let zone = DayZone::utc();
        let old = Entry::new(day(1), &zone, now());
        let recent = Entry::new(day(14), &zone, now());
        let mut dayless = Entry::new(day(15), &zone, now());
        dayless.day = None;
        store.save(&[old.clone(), recent.clone(), dayless.clone()]).unwrap();

        let window = DayWindow::trailing_days(7, now(), &zone);
        let ids: Vec<EntryId> = store
            .fetch_all(Some(&window))
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![recent.id]);

        assert_eq!(store.fetch_all(None).unwrap().len(), 3);
    }

    #[test]
    fn reopening_file_store_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("havn.db");
        let zone = DayZone::utc();
        let e = Entry::new(day(15), &zone, now());
        {
            let store = SqliteEntryStore::open(&path).unwrap();
            store.insert(&e).unwrap();
        }
        let store = SqliteEntryStore::open(&path).unwrap();
        assert_eq!(store.fetch_all(None).unwrap(), vec![e]);
    }
}
