//! Snapshot-diff reconciliation
//!
//! Folds a stream of fetched listings into the current snapshot while
//! classifying each one against the previous run, then runs a removal pass
//! over whatever the previous snapshot had that this run did not see.
//!
//! The reconciler does no I/O. Removal verification is done by the caller,
//! which passes the set of ids the marketplace still reports as active.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::models::{ChangeEntry, ChangeStatus, ListingId, ListingRecord, PreviousRun, Snapshot};

/// Report policies that differ between deployments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Keep NOCHANGE rows in the report instead of dropping them
    pub keep_unchanged: bool,
    /// Report every listing as NEW when there is no previous run at all
    pub new_on_first_run: bool,
}

/// Counters collected while reconciling one store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Records received from the fetcher, duplicates included
    pub observed: usize,
    pub duplicates: usize,
    pub new: usize,
    pub increased: usize,
    pub reduced: usize,
    pub unchanged: usize,
    pub removed: usize,
    /// Removal candidates the marketplace still reported as active
    pub still_active: usize,
    /// Listings absent from the previous snapshot but listed before the last run
    pub unseen_not_new: usize,
}

/// Result of reconciling one store
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// Every listing seen this run with its first-seen price
    pub snapshot: Snapshot,
    /// Set when the fetch was partial: the previous snapshot with this run's
    /// prices laid over it. This is what should be persisted instead of
    /// `snapshot`.
    pub carry_forward: Option<Snapshot>,
    /// Report rows in first-seen order, removals last
    pub entries: Vec<ChangeEntry>,
    pub stats: ReconcileStats,
}

impl ReconcileOutcome {
    pub fn is_partial(&self) -> bool {
        self.carry_forward.is_some()
    }

    /// The snapshot the next run should compare against
    pub fn snapshot_to_persist(&self) -> &Snapshot {
        self.carry_forward.as_ref().unwrap_or(&self.snapshot)
    }
}

/// Incremental reconciler for a single store run
pub struct Reconciler {
    previous: Snapshot,
    last_run_at: Option<DateTime<Utc>>,
    options: ReconcileOptions,
    current: Snapshot,
    entries: Vec<ChangeEntry>,
    stats: ReconcileStats,
}

impl Reconciler {
    pub fn new(previous: PreviousRun, options: ReconcileOptions) -> Self {
        Self {
            previous: previous.snapshot,
            last_run_at: previous.last_run_at,
            options,
            current: Snapshot::new(),
            entries: Vec::new(),
            stats: ReconcileStats::default(),
        }
    }

    /// No last-run timestamp means nothing to gate NEW listings against
    pub fn is_first_run(&self) -> bool {
        self.last_run_at.is_none()
    }

    /// Fold one fetched record into the current snapshot and report
    pub fn observe(&mut self, record: ListingRecord) {
        self.stats.observed += 1;

        if !self.current.insert_new(record.id.clone(), record.price) {
            self.stats.duplicates += 1;
            log::warn!(
                "Duplicate listing {} in this fetch (price {}), keeping first occurrence at {}",
                record.id,
                record.price,
                self.current
                    .get(&record.id)
                    .map(|p| p.to_string())
                    .unwrap_or_default()
            );
            return;
        }

        match self.previous.get(&record.id) {
            Some(last_price) => {
                let entry = ChangeEntry::repriced(record, last_price);
                match entry.status {
                    ChangeStatus::Increased => self.stats.increased += 1,
                    ChangeStatus::Reduced => self.stats.reduced += 1,
                    ChangeStatus::NoChange => {
                        self.stats.unchanged += 1;
                        if !self.options.keep_unchanged {
                            return;
                        }
                    }
                    ChangeStatus::New | ChangeStatus::Removed => {}
                }
                self.entries.push(entry);
            }
            None if self.is_new_listing(&record) => {
                self.stats.new += 1;
                self.entries.push(ChangeEntry::new_listing(record));
            }
            None => {
                // Most likely missed by an earlier partial fetch
                self.stats.unseen_not_new += 1;
                log::debug!(
                    "Listing {} not in previous snapshot but listed before last run, not reported as new",
                    record.id
                );
            }
        }
    }

    fn is_new_listing(&self, record: &ListingRecord) -> bool {
        match self.last_run_at {
            None => self.options.new_on_first_run,
            Some(last_run_at) => record
                .listed_at
                .is_some_and(|listed_at| listed_at >= last_run_at),
        }
    }

    /// Ids from the previous snapshot that this run has not seen
    pub fn removal_candidates(&self) -> Vec<ListingId> {
        self.previous.missing_from(&self.current).cloned().collect()
    }

    /// Run the removal pass and close the run.
    ///
    /// Candidates in `still_active` were confirmed live by the marketplace and
    /// are not reported. Only call this when the fetch completed.
    pub fn finish(mut self, still_active: &HashSet<ListingId>) -> ReconcileOutcome {
        for (id, last_price) in self.previous.iter() {
            if self.current.contains(id) {
                continue;
            }
            // Not carried into the new snapshot: a listing the store search
            // keeps missing is neither re-verified nor reported later.
            if still_active.contains(id) {
                self.stats.still_active += 1;
                log::info!("Listing {} missing from store search but still active, not removed", id);
                continue;
            }
            self.stats.removed += 1;
            self.entries.push(ChangeEntry::removed(id.clone(), last_price));
        }

        ReconcileOutcome {
            snapshot: self.current,
            carry_forward: None,
            entries: self.entries,
            stats: self.stats,
        }
    }

    /// Close a run whose fetch stopped early.
    ///
    /// No removal pass: listings on pages that were never fetched would all
    /// look removed.
    pub fn finish_partial(self) -> ReconcileOutcome {
        let carry_forward = self.previous.overlay(&self.current);
        ReconcileOutcome {
            snapshot: self.current,
            carry_forward: Some(carry_forward),
            entries: self.entries,
            stats: self.stats,
        }
    }

    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    pub fn stats(&self) -> &ReconcileStats {
        &self.stats
    }
}

/// Reconcile a complete, already collected fetch in one call
pub fn reconcile(
    previous: PreviousRun,
    records: impl IntoIterator<Item = ListingRecord>,
    options: ReconcileOptions,
    still_active: &HashSet<ListingId>,
) -> ReconcileOutcome {
    let mut reconciler = Reconciler::new(previous, options);
    for record in records {
        reconciler.observe(record);
    }
    reconciler.finish(still_active)
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
