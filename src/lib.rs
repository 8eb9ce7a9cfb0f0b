//! Listing Watch - eBay store price change reports
//!
//! Polls the eBay Finding API for a seller's active listings, compares them
//! with the snapshot saved by the previous run and writes a change report
//! (new, removed, price increased, price reduced).

pub mod config;
pub mod ebay;
pub mod error;
pub mod models;
pub mod money;
pub mod reconcile;
pub mod report;
pub mod run;
pub mod snapshot_store;

pub use config::WatchConfig;
pub use ebay::{EbayClient, ListingFetcher, PartialFetchFailure};
pub use error::{Result, WatchError};
pub use models::{ChangeEntry, ChangeStatus, ListingId, ListingRecord, PreviousRun, RunMetadata, Snapshot};
pub use money::Money;
pub use reconcile::{reconcile, ReconcileOptions, ReconcileOutcome, ReconcileStats, Reconciler};
pub use run::{run_all, run_store, RunContext, StoreResult, StoreRunSummary};
