//! Runtime configuration shared by every store run

use chrono_tz::Tz;
use std::path::PathBuf;
use std::time::Duration;

use crate::ebay::FINDING_API_URL;
use crate::reconcile::ReconcileOptions;
use crate::report::ReportOptions;

/// Default timeout for a single Finding API request
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Everything a pass over the configured stores needs
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Store names to process, in order
    pub stores: Vec<String>,
    /// eBay application id (`SECURITY-APPNAME`)
    pub app_id: String,
    pub api_base_url: String,
    pub request_timeout: Duration,
    /// Path to the SQLite snapshot database
    pub database: PathBuf,
    /// Double-check removal candidates with a keyword search
    pub verify_removals: bool,
    pub reconcile: ReconcileOptions,
    pub report: ReportOptions,
}

impl WatchConfig {
    /// Configuration with defaults for everything but the credentials and stores
    pub fn new(app_id: impl Into<String>, stores: Vec<String>) -> Self {
        Self {
            stores,
            app_id: app_id.into(),
            api_base_url: FINDING_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            database: PathBuf::from(default_db_path()),
            verify_removals: false,
            reconcile: ReconcileOptions::default(),
            report: ReportOptions {
                output_dir: PathBuf::from("."),
                include_list_date: false,
                timezone: Tz::UTC,
            },
        }
    }
}

/// Returns the default database path: ~/.local/share/listing_watch/snapshots.db
pub fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("listing_watch")
        .join("snapshots.db")
        .to_string_lossy()
        .to_string()
}

/// Split a comma-separated store list, dropping blanks and duplicates
pub fn parse_store_list<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut stores: Vec<String> = Vec::new();
    for value in raw {
        for name in value.as_ref().split(',') {
            let name = name.trim();
            if !name.is_empty() && !stores.iter().any(|s| s == name) {
                stores.push(name.to_string());
            }
        }
    }
    stores
}

/// Parse an IANA time zone name such as `Europe/Berlin`
pub fn parse_timezone(raw: &str) -> Result<Tz, String> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|_| format!("unknown time zone '{}'", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_has_defaults() {
        let config = WatchConfig::new("APP", vec!["Shop".to_string()]);
        assert_eq!(config.api_base_url, FINDING_API_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(!config.verify_removals);
        assert!(!config.reconcile.keep_unchanged);
        assert!(!config.reconcile.new_on_first_run);
        assert!(config.database.ends_with("listing_watch/snapshots.db"));
    }

    #[test]
    fn store_list_splits_and_dedups() {
        assert_eq!(
            parse_store_list(["Card Corner, Shop2", "Shop2", " ,Third"]),
            vec!["Card Corner", "Shop2", "Third"]
        );
        assert!(parse_store_list(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn timezone_parsing() {
        assert_eq!(parse_timezone("Europe/Berlin"), Ok(chrono_tz::Europe::Berlin));
        assert_eq!(parse_timezone(" UTC "), Ok(Tz::UTC));
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
