//! CSV change reports and snapshot exports

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use csv::WriterBuilder;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::{ChangeEntry, RunMetadata, Snapshot};
use crate::money::Money;
use crate::reconcile::ReconcileOutcome;

const CHANGE_COLUMNS: [&str; 7] = [
    "itemId",
    "status",
    "title",
    "price",
    "last_price",
    "price_difference",
    "url",
];

/// Where and how reports are written
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub output_dir: PathBuf,
    /// Append a `list_date` column with each listing's start time
    pub include_list_date: bool,
    /// Time zone used for the timestamp in file names
    pub timezone: Tz,
}

/// Files produced for one store run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLocation {
    pub changes: PathBuf,
    pub snapshot: PathBuf,
}

/// Timestamp used in report file names, e.g. `2023-01-02-033015PM--000000`
pub fn report_stamp(ts: &DateTime<Utc>, timezone: Tz) -> String {
    ts.with_timezone(&timezone)
        .format("%Y-%m-%d-%I%M%S%p--%6f")
        .to_string()
}

/// Store names go into file names; keep them to a safe character set
fn file_safe(store_name: &str) -> String {
    let cleaned: String = store_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "store".to_string()
    } else {
        cleaned
    }
}

/// Write change rows with a header line
pub fn write_changes<W: io::Write>(
    writer: W,
    entries: &[ChangeEntry],
    include_list_date: bool,
) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);

    let mut header: Vec<&str> = CHANGE_COLUMNS.to_vec();
    if include_list_date {
        header.push("list_date");
    }
    wtr.write_record(&header)?;

    for entry in entries {
        let mut row = vec![
            entry.id.to_string(),
            entry.status.to_string(),
            entry.title.clone().unwrap_or_default(),
            optional_money(entry.price),
            optional_money(entry.last_price),
            optional_money(entry.price_difference),
            entry.url.clone().unwrap_or_default(),
        ];
        if include_list_date {
            row.push(
                entry
                    .listed_at
                    .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_default(),
            );
        }
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

fn optional_money(value: Option<Money>) -> String {
    value.map(|m| m.to_string()).unwrap_or_default()
}

/// Write a flat `itemId,price` table
pub fn write_snapshot<W: io::Write>(writer: W, snapshot: &Snapshot) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(["itemId", "price"])?;
    for (id, price) in snapshot.iter() {
        let price = price.to_string();
        wtr.write_record([id.as_str(), price.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

fn create_file(path: &Path) -> Result<fs::File> {
    Ok(fs::File::create(path)?)
}

/// Write the change report and snapshot export for one store run
///
/// For a partial run both file names carry `-partial` and the snapshot export
/// holds only what was actually fetched.
pub fn write_report(
    options: &ReportOptions,
    run: &RunMetadata,
    outcome: &ReconcileOutcome,
) -> Result<ReportLocation> {
    fs::create_dir_all(&options.output_dir)?;

    let mut stem = format!(
        "{}--{}",
        file_safe(&run.store_name),
        report_stamp(&run.timestamp, options.timezone)
    );
    if outcome.is_partial() {
        stem.push_str("-partial");
    }

    let location = ReportLocation {
        changes: options.output_dir.join(format!("{stem}-changes.csv")),
        snapshot: options.output_dir.join(format!("{stem}-snapshot.csv")),
    };

    write_changes(
        create_file(&location.changes)?,
        &outcome.entries,
        options.include_list_date,
    )?;
    write_snapshot(create_file(&location.snapshot)?, &outcome.snapshot)?;

    log::info!(
        "Wrote {} change(s) to {} and {} listing(s) to {}",
        outcome.entries.len(),
        location.changes.display(),
        outcome.snapshot.len(),
        location.snapshot.display()
    );
    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingId, ListingRecord};
    use crate::reconcile::ReconcileStats;
    use chrono::TimeZone;

    fn m(raw: &str) -> Money {
        Money::parse(raw).unwrap()
    }

    fn sample_entries() -> Vec<ChangeEntry> {
        let mut x = ListingRecord::new("X", m("24.99"));
        x.title = Some("Lotus, Black".to_string());
        x.url = Some("https://www.ebay.com/itm/X".to_string());

        let mut y = ListingRecord::new("Y", m("9.99"));
        y.listed_at = Some(Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap());

        vec![
            ChangeEntry::repriced(x, m("19.99")),
            ChangeEntry::new_listing(y),
            ChangeEntry::removed(ListingId::from("Z"), m("3")),
        ]
    }

    fn render_changes(include_list_date: bool) -> String {
        let mut buf = Vec::new();
        write_changes(&mut buf, &sample_entries(), include_list_date).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn changes_have_fixed_column_order() {
        let csv = render_changes(false);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "itemId,status,title,price,last_price,price_difference,url"
        );
        assert_eq!(
            lines[1],
            "X,INCREASED,\"Lotus, Black\",24.99,19.99,5.00,https://www.ebay.com/itm/X"
        );
        assert_eq!(lines[2], "Y,NEW,,9.99,,,");
        assert_eq!(lines[3], "Z,REMOVED,,,3.00,,");
    }

    #[test]
    fn changes_with_list_date_column() {
        let csv = render_changes(true);
        let lines: Vec<&str> = csv.lines().collect();
        assert!(lines[0].ends_with(",url,list_date"));
        assert_eq!(lines[2], "Y,NEW,,9.99,,,,2023-01-02T00:00:00Z");
        assert!(lines[3].ends_with(",,"));
    }

    #[test]
    fn empty_report_has_header_only() {
        let mut buf = Vec::new();
        write_changes(&mut buf, &[], false).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 1);
    }

    #[test]
    fn snapshot_export_is_flat_table() {
        let snapshot: Snapshot = vec![(ListingId::from("B"), m("2")), (ListingId::from("A"), m("1.5"))]
            .into_iter()
            .collect();
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &snapshot).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "itemId,price\nA,1.50\nB,2.00\n");
    }

    #[test]
    fn report_stamp_uses_timezone() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 2, 15, 30, 15).unwrap();
        assert_eq!(report_stamp(&ts, chrono_tz::UTC), "2023-01-02-033015PM--000000");
        assert_eq!(
            report_stamp(&ts, chrono_tz::Europe::Berlin),
            "2023-01-02-043015PM--000000"
        );
    }

    #[test]
    fn file_safe_replaces_separators() {
        assert_eq!(file_safe("Card Corner/EU"), "Card_Corner_EU");
        assert_eq!(file_safe("  "), "store");
        assert_eq!(file_safe("shop-42_x"), "shop-42_x");
    }

    #[test]
    fn write_report_creates_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let options = ReportOptions {
            output_dir: dir.path().join("reports"),
            include_list_date: false,
            timezone: chrono_tz::UTC,
        };
        let run = RunMetadata {
            store_name: "Card Corner".to_string(),
            timestamp: Utc.with_ymd_and_hms(2023, 1, 2, 9, 5, 0).unwrap(),
        };
        let outcome = ReconcileOutcome {
            snapshot: vec![(ListingId::from("X"), m("24.99"))].into_iter().collect(),
            carry_forward: None,
            entries: sample_entries(),
            stats: ReconcileStats::default(),
        };

        let location = write_report(&options, &run, &outcome).unwrap();
        assert_eq!(
            location.changes.file_name().unwrap().to_str().unwrap(),
            "Card_Corner--2023-01-02-090500AM--000000-changes.csv"
        );

        let changes = fs::read_to_string(&location.changes).unwrap();
        assert_eq!(changes.lines().count(), 4);
        assert_eq!(changes.lines().nth(1).map(|l| l.starts_with("X,INCREASED")), Some(true));

        let snapshot = fs::read_to_string(&location.snapshot).unwrap();
        assert_eq!(snapshot, "itemId,price\nX,24.99\n");
    }

    #[test]
    fn partial_report_is_marked() {
        let dir = tempfile::tempdir().unwrap();
        let options = ReportOptions {
            output_dir: dir.path().to_path_buf(),
            include_list_date: true,
            timezone: chrono_tz::UTC,
        };
        let run = RunMetadata {
            store_name: "Shop".to_string(),
            timestamp: Utc.with_ymd_and_hms(2023, 1, 2, 9, 5, 0).unwrap(),
        };
        let outcome = ReconcileOutcome {
            snapshot: Snapshot::new(),
            carry_forward: Some(Snapshot::new()),
            entries: Vec::new(),
            stats: ReconcileStats::default(),
        };

        let location = write_report(&options, &run, &outcome).unwrap();
        let name = location.snapshot.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.ends_with("-partial-snapshot.csv"), "{name}");
        assert!(location.changes.exists());
    }
}
