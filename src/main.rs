//! Listing Watch - eBay store price change reports
//!
//! Runs once or as a daemon that re-checks every configured store on a
//! fixed interval.

use chrono_tz::Tz;
use clap::Parser;
use listing_watch::config::{default_db_path, parse_store_list, parse_timezone, DEFAULT_TIMEOUT_SECS};
use listing_watch::ebay::FINDING_API_URL;
use listing_watch::report::ReportOptions;
use listing_watch::{run_all, snapshot_store, EbayClient, ReconcileOptions, RunContext, WatchConfig};
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::interval;

/// eBay store watcher - reports new, removed and repriced listings between runs
#[derive(Parser, Debug)]
#[command(name = "listing_watch")]
#[command(version, about, long_about = None)]
struct Args {
    /// Store name(s) to watch; repeat or separate with commas
    #[arg(short, long = "store", env = "EBAY_STORES", value_delimiter = ',')]
    stores: Vec<String>,

    /// eBay application id used as SECURITY-APPNAME
    #[arg(long, env = "EBAY_APP_ID", hide_env_values = true)]
    app_id: String,

    /// Path to the SQLite snapshot database
    #[arg(short, long, env = "LISTING_WATCH_DB", default_value_t = default_db_path())]
    database: String,

    /// Directory for change reports and snapshot exports
    #[arg(short, long, env = "LISTING_WATCH_OUTPUT", default_value = ".")]
    output_dir: PathBuf,

    /// Keep NOCHANGE rows in the change report
    #[arg(long, default_value_t = false)]
    keep_unchanged: bool,

    /// Report every listing as NEW on a store's first run
    #[arg(long, default_value_t = false)]
    new_on_first_run: bool,

    /// Double-check removed listings with a marketplace-wide keyword search
    #[arg(long, default_value_t = false)]
    verify_removals: bool,

    /// Add a list_date column to change reports
    #[arg(long, default_value_t = false)]
    list_date: bool,

    /// Time zone for report file names (IANA name)
    #[arg(long, default_value = "UTC", value_parser = parse_timezone)]
    timezone: Tz,

    /// Timeout in seconds for each eBay API request
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Finding API endpoint (e.g. the sandbox)
    #[arg(long, default_value = FINDING_API_URL)]
    api_url: String,

    /// Run once and exit (default: run continuously on a schedule)
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Check interval in hours when running continuously
    #[arg(long, default_value_t = 24)]
    interval_hours: u64,
}

impl Args {
    fn to_config(&self) -> WatchConfig {
        WatchConfig {
            stores: parse_store_list(&self.stores),
            app_id: self.app_id.clone(),
            api_base_url: self.api_url.clone(),
            request_timeout: Duration::from_secs(self.timeout_secs),
            database: PathBuf::from(&self.database),
            verify_removals: self.verify_removals,
            reconcile: ReconcileOptions {
                keep_unchanged: self.keep_unchanged,
                new_on_first_run: self.new_on_first_run,
            },
            report: ReportOptions {
                output_dir: self.output_dir.clone(),
                include_list_date: self.list_date,
                timezone: self.timezone,
            },
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.to_config();

    if config.stores.is_empty() {
        log::error!("No store names given (use --store or EBAY_STORES)");
        std::process::exit(2);
    }

    log::info!("Starting listing_watch...");
    log::info!("Database path: {}", config.database.display());
    log::info!("Stores: {}", config.stores.join(", "));

    // Ensure parent directory exists
    if let Some(parent) = config.database.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    let mut conn = match Connection::open(&config.database) {
        Ok(conn) => {
            log::info!("Opened database: {}", config.database.display());
            conn
        }
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = snapshot_store::init_schema(&conn) {
        log::error!("Failed to initialize database schema: {}", e);
        std::process::exit(1);
    }

    let client = match EbayClient::new(config.app_id.clone(), config.request_timeout) {
        Ok(client) => client.with_base_url(config.api_base_url.clone()),
        Err(e) => {
            log::error!("Failed to create eBay client: {}", e);
            std::process::exit(1);
        }
    };

    if args.once {
        if !run_pass(&client, &mut conn, &config).await {
            std::process::exit(1);
        }
    } else {
        log::info!(
            "Running in daemon mode, checking every {} hour(s)",
            args.interval_hours
        );
        run_daemon(&client, &mut conn, &config, args.interval_hours).await;
    }
}

/// Re-run every store on a fixed interval until Ctrl-C
async fn run_daemon(client: &EbayClient, conn: &mut Connection, config: &WatchConfig, interval_hours: u64) {
    let mut ticker = interval(Duration::from_secs(interval_hours.max(1) * 3600));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // The first tick completes immediately, so this also runs on startup
            _ = ticker.tick() => {
                log::info!("Scheduled check triggered");
                run_pass(client, conn, config).await;
            }
            _ = &mut shutdown => {
                log::info!("Shutdown requested, exiting");
                break;
            }
        }
    }
}

/// Process every store once. Returns false if any store failed.
async fn run_pass(client: &EbayClient, conn: &mut Connection, config: &WatchConfig) -> bool {
    let mut ctx = RunContext {
        client,
        conn,
        config,
    };
    let results = run_all(&mut ctx).await;

    let failed: Vec<&str> = results
        .iter()
        .filter(|r| r.result.is_err())
        .map(|r| r.store_name.as_str())
        .collect();

    if failed.is_empty() {
        log::info!("All {} store(s) processed successfully.", results.len());
        true
    } else {
        log::error!(
            "{} of {} store(s) failed: {}",
            failed.len(),
            results.len(),
            failed.join(", ")
        );
        false
    }
}
