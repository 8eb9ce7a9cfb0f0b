//! Per-store run orchestration
//!
//! Load previous → fetch and reconcile page by page → verify removals →
//! write report → persist snapshot. Stores are handled one at a time and
//! share nothing but the client and the database connection.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::HashSet;

use crate::config::WatchConfig;
use crate::ebay::{EbayClient, ListingFetcher};
use crate::error::Result;
use crate::models::{ListingId, RunMetadata};
use crate::reconcile::{ReconcileStats, Reconciler};
use crate::report::{self, ReportLocation};
use crate::snapshot_store;

/// Explicit state for one pass over the configured stores
pub struct RunContext<'a> {
    pub client: &'a EbayClient,
    pub conn: &'a mut Connection,
    pub config: &'a WatchConfig,
}

/// What a finished store run produced
#[derive(Debug, Clone)]
pub struct StoreRunSummary {
    pub store_name: String,
    pub started_at: DateTime<Utc>,
    /// Listings in the snapshot built this run
    pub listings: usize,
    pub stats: ReconcileStats,
    pub location: ReportLocation,
}

/// Outcome of one store within a pass
pub struct StoreResult {
    pub store_name: String,
    pub result: Result<StoreRunSummary>,
}

/// Run one store end to end.
///
/// A fetch that stops early still writes its partial report and a
/// carry-forward snapshot before the fetch error is returned.
pub async fn run_store(ctx: &mut RunContext<'_>, store_name: &str) -> Result<StoreRunSummary> {
    let run = RunMetadata {
        store_name: store_name.to_string(),
        timestamp: Utc::now(),
    };
    log::info!("Processing store '{}'", store_name);

    let previous = snapshot_store::load_previous(ctx.conn, store_name);
    let mut reconciler = Reconciler::new(previous, ctx.config.reconcile);
    if reconciler.is_first_run() {
        log::info!("No previous run recorded for '{}'", store_name);
    }

    let mut fetcher = ListingFetcher::new(ctx.client, store_name);
    let fetched = fetcher
        .for_each_listing(|record| reconciler.observe(record))
        .await;

    let (outcome, failure) = match fetched {
        Ok(_) => {
            let candidates = reconciler.removal_candidates();
            let still_active = if ctx.config.verify_removals {
                verify_candidates(ctx.client, candidates).await
            } else {
                HashSet::new()
            };
            (reconciler.finish(&still_active), None)
        }
        Err(failure) => {
            log::warn!(
                "Store '{}' fetch incomplete, skipping removal pass: {}",
                store_name,
                failure
            );
            (reconciler.finish_partial(), Some(failure))
        }
    };

    // Report first: if it cannot be written, leave the old snapshot in place
    // so the next run reports the same changes.
    let location = report::write_report(&ctx.config.report, &run, &outcome)?;

    match &failure {
        None => {
            snapshot_store::save_snapshot(ctx.conn, &run, &outcome.snapshot)?;
        }
        Some(_) => {
            snapshot_store::save_snapshot_keep_timestamp(
                ctx.conn,
                store_name,
                outcome.snapshot_to_persist(),
            )?;
        }
    }

    let error_text = failure.as_ref().map(|f| f.to_string());
    if let Err(e) = snapshot_store::record_run(
        ctx.conn,
        &run,
        outcome.snapshot.len(),
        &outcome.stats,
        error_text.as_deref(),
    ) {
        log::warn!("Failed to record run history for '{}': {}", store_name, e);
    }

    if let Some(failure) = failure {
        return Err(failure.into_error());
    }

    let stats = outcome.stats;
    log::info!(
        "Store '{}': {} new, {} increased, {} reduced, {} removed, {} unchanged, {} duplicate(s)",
        store_name,
        stats.new,
        stats.increased,
        stats.reduced,
        stats.removed,
        stats.unchanged,
        stats.duplicates
    );

    Ok(StoreRunSummary {
        store_name: store_name.to_string(),
        started_at: run.timestamp,
        listings: outcome.snapshot.len(),
        stats,
        location,
    })
}

/// Ask the marketplace about each removal candidate once.
///
/// A failed check counts as "not active" so the listing is still reported
/// as removed.
async fn verify_candidates(client: &EbayClient, candidates: Vec<ListingId>) -> HashSet<ListingId> {
    let mut still_active = HashSet::new();
    if candidates.is_empty() {
        return still_active;
    }

    log::info!("Verifying {} removal candidate(s)", candidates.len());
    for id in candidates {
        match client.verify_still_active(&id).await {
            Ok(true) => {
                still_active.insert(id);
            }
            Ok(false) => log::debug!("Listing {} confirmed gone", id),
            Err(e) => log::warn!(
                "Could not verify listing {} ({}), reporting it as removed",
                id,
                e
            ),
        }
    }
    still_active
}

/// Run every configured store in order; one failure never stops the rest
pub async fn run_all(ctx: &mut RunContext<'_>) -> Vec<StoreResult> {
    let stores = ctx.config.stores.clone();
    let mut results = Vec::with_capacity(stores.len());

    for store_name in stores {
        let result = run_store(ctx, &store_name).await;
        match &result {
            Ok(summary) => log::info!(
                "Store '{}' done: {} listing(s), report at {}",
                summary.store_name,
                summary.listings,
                summary.location.changes.display()
            ),
            Err(e) if e.is_remote() => {
                log::error!("Store '{}' failed talking to eBay: {}", store_name, e)
            }
            Err(e) => log::error!("Store '{}' failed: {}", store_name, e),
        }
        results.push(StoreResult { store_name, result });
    }

    results
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
