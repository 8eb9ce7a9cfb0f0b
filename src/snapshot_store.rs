//! Snapshot persistence between runs
//!
//! Uses parameterized queries exclusively (no SQL string concatenation).
//! Each store's snapshot and last-run timestamp are replaced inside a single
//! transaction, so a reader sees either the old snapshot or the new one.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::error::{Result, WatchError};
use crate::models::{ListingId, PreviousRun, RunMetadata, Snapshot};
use crate::money::Money;
use crate::reconcile::ReconcileStats;

/// Result type for database operations
pub type DbResult<T> = rusqlite::Result<T>;

/// Initialize the database schema
///
/// Creates tables if they don't exist:
/// - `snapshot_listings`: flat id,price table per store (latest snapshot only)
/// - `store_runs`: last successful run timestamp per store
/// - `run_history`: one row per run, complete or partial
pub fn init_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS snapshot_listings (
            store_name TEXT NOT NULL,
            listing_id TEXT NOT NULL,
            price TEXT NOT NULL,
            PRIMARY KEY (store_name, listing_id)
        );

        CREATE TABLE IF NOT EXISTS store_runs (
            store_name TEXT PRIMARY KEY,
            last_run_at TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS run_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            store_name TEXT NOT NULL,
            started_at TEXT NOT NULL,
            complete INTEGER NOT NULL,
            listings INTEGER NOT NULL,
            new_count INTEGER NOT NULL,
            increased_count INTEGER NOT NULL,
            reduced_count INTEGER NOT NULL,
            removed_count INTEGER NOT NULL,
            duplicate_count INTEGER NOT NULL,
            error TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_run_history_store ON run_history(store_name, started_at);
        ",
    )?;

    log::info!("Database schema initialized");
    Ok(())
}

/// Render a run timestamp the way it is stored
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a stored run timestamp
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Load a store's previous snapshot and timestamp, surfacing corrupt data
pub fn try_load_previous(conn: &Connection, store_name: &str) -> Result<PreviousRun> {
    let raw_ts: Option<String> = conn
        .query_row(
            "SELECT last_run_at FROM store_runs WHERE store_name = ?1",
            params![store_name],
            |row| row.get(0),
        )
        .optional()?;

    let last_run_at = match raw_ts {
        Some(raw) => Some(parse_timestamp(&raw).ok_or_else(|| WatchError::CorruptTimestamp {
            store: store_name.to_string(),
            raw: raw.clone(),
        })?),
        None => None,
    };

    Ok(PreviousRun {
        snapshot: load_snapshot_only(conn, store_name)?,
        last_run_at,
    })
}

/// Load a store's previous run, never failing.
///
/// A corrupt timestamp drops only the timestamp. A corrupt snapshot, or a
/// database error, demotes the store to a first run.
pub fn load_previous(conn: &Connection, store_name: &str) -> PreviousRun {
    match try_load_previous(conn, store_name) {
        Ok(previous) => {
            log::info!(
                "Loaded previous snapshot for '{}': {} listing(s), last run {}",
                store_name,
                previous.snapshot.len(),
                previous
                    .last_run_at
                    .map(|ts| format_timestamp(&ts))
                    .unwrap_or_else(|| "never".to_string())
            );
            previous
        }
        Err(WatchError::CorruptTimestamp { store, raw }) => {
            log::warn!(
                "Ignoring unparsable last-run timestamp '{}' for store '{}'",
                raw,
                store
            );
            match load_snapshot_only(conn, store_name) {
                Ok(snapshot) => PreviousRun {
                    snapshot,
                    last_run_at: None,
                },
                Err(e) => {
                    log::warn!("{}; treating store '{}' as a first run", e, store_name);
                    PreviousRun::first_run()
                }
            }
        }
        Err(e) => {
            log::warn!("{}; treating store '{}' as a first run", e, store_name);
            PreviousRun::first_run()
        }
    }
}

fn load_snapshot_only(conn: &Connection, store_name: &str) -> Result<Snapshot> {
    let mut stmt = conn.prepare_cached(
        "SELECT listing_id, price FROM snapshot_listings WHERE store_name = ?1",
    )?;
    let rows = stmt.query_map(params![store_name], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut snapshot = Snapshot::new();
    for row in rows {
        let (listing_id, raw_price) = row?;
        let price = Money::parse(&raw_price).map_err(|_| WatchError::CorruptSnapshot {
            store: store_name.to_string(),
            listing_id: listing_id.clone(),
            raw: raw_price.clone(),
        })?;
        snapshot.insert_new(ListingId::new(listing_id), price);
    }
    Ok(snapshot)
}

/// Replace a store's snapshot and last-run timestamp
///
/// Delete-then-rewrite inside one transaction; on any error the previous
/// snapshot stays in place.
pub fn save_snapshot(conn: &mut Connection, run: &RunMetadata, snapshot: &Snapshot) -> DbResult<usize> {
    let tx = conn.transaction()?;
    let count = replace_snapshot_tx(&tx, &run.store_name, snapshot)?;
    tx.execute(
        "INSERT OR REPLACE INTO store_runs (store_name, last_run_at, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![&run.store_name, format_timestamp(&run.timestamp)],
    )?;
    tx.commit()?;

    log::info!(
        "Saved snapshot for '{}': {} listing(s) at {}",
        run.store_name,
        count,
        format_timestamp(&run.timestamp)
    );
    Ok(count)
}

/// Replace a store's snapshot but keep its last-run timestamp
///
/// Used after a partial fetch: the timestamp must keep gating listings the
/// partial run never saw.
pub fn save_snapshot_keep_timestamp(
    conn: &mut Connection,
    store_name: &str,
    snapshot: &Snapshot,
) -> DbResult<usize> {
    let tx = conn.transaction()?;
    let count = replace_snapshot_tx(&tx, store_name, snapshot)?;
    tx.commit()?;

    log::info!(
        "Saved carry-forward snapshot for '{}': {} listing(s), last-run timestamp unchanged",
        store_name,
        count
    );
    Ok(count)
}

fn replace_snapshot_tx(tx: &Transaction<'_>, store_name: &str, snapshot: &Snapshot) -> DbResult<usize> {
    tx.execute(
        "DELETE FROM snapshot_listings WHERE store_name = ?1",
        params![store_name],
    )?;

    let mut stmt = tx.prepare_cached(
        "INSERT INTO snapshot_listings (store_name, listing_id, price) VALUES (?1, ?2, ?3)",
    )?;

    let mut count = 0;
    for (id, price) in snapshot.iter() {
        stmt.execute(params![store_name, id.as_str(), price.to_string()])?;
        count += 1;
    }
    Ok(count)
}

/// One row of the run history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub store_name: String,
    pub started_at: String,
    pub complete: bool,
    pub listings: usize,
    pub new_count: usize,
    pub increased_count: usize,
    pub reduced_count: usize,
    pub removed_count: usize,
    pub duplicate_count: usize,
    pub error: Option<String>,
}

/// Append a run to the history
pub fn record_run(
    conn: &Connection,
    run: &RunMetadata,
    listings: usize,
    stats: &ReconcileStats,
    error: Option<&str>,
) -> DbResult<()> {
    conn.execute(
        "INSERT INTO run_history
         (store_name, started_at, complete, listings, new_count, increased_count,
          reduced_count, removed_count, duplicate_count, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            &run.store_name,
            format_timestamp(&run.timestamp),
            error.is_none(),
            listings,
            stats.new,
            stats.increased,
            stats.reduced,
            stats.removed,
            stats.duplicates,
            error,
        ],
    )?;
    Ok(())
}

/// Most recently recorded runs for a store, newest first
pub fn recent_runs(conn: &Connection, store_name: &str, limit: usize) -> DbResult<Vec<RunRecord>> {
    let mut stmt = conn.prepare(
        "SELECT store_name, started_at, complete, listings, new_count, increased_count,
                reduced_count, removed_count, duplicate_count, error
         FROM run_history
         WHERE store_name = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;

    let results: DbResult<Vec<RunRecord>> = stmt
        .query_map(params![store_name, limit], |row| {
            Ok(RunRecord {
                store_name: row.get(0)?,
                started_at: row.get(1)?,
                complete: row.get(2)?,
                listings: row.get(3)?,
                new_count: row.get(4)?,
                increased_count: row.get(5)?,
                reduced_count: row.get(6)?,
                removed_count: row.get(7)?,
                duplicate_count: row.get(8)?,
                error: row.get(9)?,
            })
        })?
        .collect();
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Create an in-memory database for testing
    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn m(raw: &str) -> Money {
        Money::parse(raw).unwrap()
    }

    fn snapshot(pairs: &[(&str, &str)]) -> Snapshot {
        pairs.iter().map(|(id, price)| (ListingId::from(*id), m(price))).collect()
    }

    fn run(store: &str, ts: DateTime<Utc>) -> RunMetadata {
        RunMetadata {
            store_name: store.to_string(),
            timestamp: ts,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 12, 30, 15).unwrap()
    }

    #[test]
    fn init_schema_creates_tables() {
        let conn = test_db();
        for table in ["snapshot_listings", "store_runs", "run_history"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "{table}");
        }
    }

    #[test]
    fn init_schema_is_repeatable() {
        let conn = test_db();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn missing_store_loads_as_first_run() {
        let conn = test_db();
        let previous = load_previous(&conn, "Nobody");
        assert_eq!(previous, PreviousRun::first_run());
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut conn = test_db();
        let saved = snapshot(&[("A", "10.00"), ("B", "0.99"), ("C", "1234.5")]);
        let ts = t0() + chrono::Duration::microseconds(123_456);

        let count = save_snapshot(&mut conn, &run("Shop", ts), &saved).unwrap();
        assert_eq!(count, 3);

        let previous = try_load_previous(&conn, "Shop").unwrap();
        assert_eq!(previous.snapshot, saved);
        assert_eq!(previous.last_run_at, Some(ts));
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let mut conn = test_db();
        save_snapshot(&mut conn, &run("Shop", t0()), &snapshot(&[("A", "1"), ("B", "2")])).unwrap();

        let later = t0() + chrono::Duration::days(1);
        save_snapshot(&mut conn, &run("Shop", later), &snapshot(&[("C", "3")])).unwrap();

        let previous = load_previous(&conn, "Shop");
        assert_eq!(previous.snapshot, snapshot(&[("C", "3")]));
        assert_eq!(previous.last_run_at, Some(later));
    }

    #[test]
    fn stores_are_independent() {
        let mut conn = test_db();
        save_snapshot(&mut conn, &run("One", t0()), &snapshot(&[("A", "1")])).unwrap();
        save_snapshot(&mut conn, &run("Two", t0()), &snapshot(&[("A", "5"), ("B", "6")])).unwrap();

        assert_eq!(load_previous(&conn, "One").snapshot, snapshot(&[("A", "1")]));
        assert_eq!(load_previous(&conn, "Two").snapshot.len(), 2);
    }

    #[test]
    fn keep_timestamp_save_leaves_last_run_alone() {
        let mut conn = test_db();
        save_snapshot(&mut conn, &run("Shop", t0()), &snapshot(&[("A", "1")])).unwrap();
        save_snapshot_keep_timestamp(&mut conn, "Shop", &snapshot(&[("A", "2"), ("B", "3")])).unwrap();

        let previous = load_previous(&conn, "Shop");
        assert_eq!(previous.snapshot, snapshot(&[("A", "2"), ("B", "3")]));
        assert_eq!(previous.last_run_at, Some(t0()));
    }

    #[test]
    fn corrupt_price_demotes_to_first_run() {
        let mut conn = test_db();
        save_snapshot(&mut conn, &run("Shop", t0()), &snapshot(&[("A", "1")])).unwrap();
        conn.execute(
            "UPDATE snapshot_listings SET price = 'twelve' WHERE listing_id = 'A'",
            [],
        )
        .unwrap();

        match try_load_previous(&conn, "Shop") {
            Err(WatchError::CorruptSnapshot { listing_id, raw, .. }) => {
                assert_eq!(listing_id, "A");
                assert_eq!(raw, "twelve");
            }
            other => panic!("Expected CorruptSnapshot, got: {other:?}"),
        }

        assert_eq!(load_previous(&conn, "Shop"), PreviousRun::first_run());
    }

    #[test]
    fn corrupt_timestamp_keeps_snapshot() {
        let mut conn = test_db();
        save_snapshot(&mut conn, &run("Shop", t0()), &snapshot(&[("A", "1")])).unwrap();
        conn.execute(
            "UPDATE store_runs SET last_run_at = 'yesterday-ish' WHERE store_name = 'Shop'",
            [],
        )
        .unwrap();

        assert!(matches!(
            try_load_previous(&conn, "Shop"),
            Err(WatchError::CorruptTimestamp { .. })
        ));

        let previous = load_previous(&conn, "Shop");
        assert_eq!(previous.snapshot, snapshot(&[("A", "1")]));
        assert_eq!(previous.last_run_at, None);
    }

    #[test]
    fn timestamp_format_round_trips() {
        let ts = t0() + chrono::Duration::microseconds(42);
        let raw = format_timestamp(&ts);
        assert_eq!(raw, "2023-01-01T12:30:15.000042Z");
        assert_eq!(parse_timestamp(&raw), Some(ts));
        assert_eq!(parse_timestamp("not a time"), None);
    }

    #[test]
    fn run_history_newest_first() {
        let conn = test_db();
        let stats = ReconcileStats {
            new: 2,
            removed: 1,
            ..Default::default()
        };
        record_run(&conn, &run("Shop", t0()), 10, &stats, None).unwrap();
        record_run(
            &conn,
            &run("Shop", t0() + chrono::Duration::hours(1)),
            4,
            &ReconcileStats::default(),
            Some("HTTP error: 503 Service Unavailable"),
        )
        .unwrap();
        record_run(&conn, &run("Other", t0()), 1, &stats, None).unwrap();

        let runs = recent_runs(&conn, "Shop", 10).unwrap();
        assert_eq!(runs.len(), 2);
        assert!(!runs[0].complete);
        assert_eq!(runs[0].listings, 4);
        assert_eq!(runs[0].error.as_deref(), Some("HTTP error: 503 Service Unavailable"));
        assert!(runs[1].complete);
        assert_eq!(runs[1].new_count, 2);
        assert_eq!(runs[1].removed_count, 1);

        assert_eq!(recent_runs(&conn, "Shop", 1).unwrap().len(), 1);
    }

    #[test]
    fn run_history_orders_sub_second_runs() {
        let conn = test_db();
        let stats = ReconcileStats::default();
        let earlier = t0() + chrono::Duration::milliseconds(100);
        let later = earlier + chrono::Duration::microseconds(1);
        record_run(&conn, &run("Shop", earlier), 1, &stats, None).unwrap();
        record_run(&conn, &run("Shop", later), 2, &stats, None).unwrap();

        let latest = recent_runs(&conn, "Shop", 1).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].listings, 2);
        assert_eq!(latest[0].started_at, format_timestamp(&later));
    }
}
