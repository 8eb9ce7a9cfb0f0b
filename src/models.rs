//! Core data model: listings, snapshots and change entries

use chrono::{DateTime, Utc};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use crate::money::Money;

/// Marketplace item identifier, unique within a store's catalog
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListingId(String);

impl ListingId {
    pub fn new(id: impl Into<String>) -> Self {
        ListingId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ListingId {
    fn from(id: &str) -> Self {
        ListingId::new(id)
    }
}

impl From<String> for ListingId {
    fn from(id: String) -> Self {
        ListingId(id)
    }
}

/// One active listing as returned by a search page
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRecord {
    pub id: ListingId,
    pub price: Money,
    pub title: Option<String>,
    pub url: Option<String>,
    pub listed_at: Option<DateTime<Utc>>,
}

impl ListingRecord {
    /// Record with only the required fields set
    pub fn new(id: impl Into<String>, price: Money) -> Self {
        Self {
            id: ListingId::new(id),
            price,
            title: None,
            url: None,
            listed_at: None,
        }
    }
}

/// Price per listing for one store at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    prices: BTreeMap<ListingId, Money>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a listing that is not yet present.
    ///
    /// Returns `false` and leaves the stored price untouched when the id is
    /// already in the snapshot.
    pub fn insert_new(&mut self, id: ListingId, price: Money) -> bool {
        match self.prices.entry(id) {
            btree_map::Entry::Occupied(_) => false,
            btree_map::Entry::Vacant(slot) => {
                slot.insert(price);
                true
            }
        }
    }

    pub fn get(&self, id: &ListingId) -> Option<Money> {
        self.prices.get(id).copied()
    }

    pub fn contains(&self, id: &ListingId) -> bool {
        self.prices.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Iterate over (id, price) pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (&ListingId, Money)> {
        self.prices.iter().map(|(id, price)| (id, *price))
    }

    /// Ids present here but missing from `current`
    pub fn missing_from<'a>(&'a self, current: &'a Snapshot) -> impl Iterator<Item = &'a ListingId> {
        self.prices.keys().filter(move |id| !current.contains(id))
    }

    /// This snapshot with every price in `newer` laid over it
    pub fn overlay(&self, newer: &Snapshot) -> Snapshot {
        let mut prices = self.prices.clone();
        prices.extend(newer.prices.iter().map(|(id, price)| (id.clone(), *price)));
        Snapshot { prices }
    }
}

impl FromIterator<(ListingId, Money)> for Snapshot {
    /// Builds a snapshot keeping the first price seen for each id
    fn from_iter<I: IntoIterator<Item = (ListingId, Money)>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for (id, price) in iter {
            snapshot.insert_new(id, price);
        }
        snapshot
    }
}

/// Identifies one run of one store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMetadata {
    pub store_name: String,
    pub timestamp: DateTime<Utc>,
}

/// What the previous run left behind for a store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviousRun {
    pub snapshot: Snapshot,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl PreviousRun {
    /// No snapshot and no timestamp: nothing has ever been recorded
    pub fn first_run() -> Self {
        Self::default()
    }
}

/// Change classification for a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeStatus {
    New,
    Increased,
    Reduced,
    Removed,
    NoChange,
}

impl ChangeStatus {
    /// Label written to reports
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::New => "NEW",
            ChangeStatus::Increased => "INCREASED",
            ChangeStatus::Reduced => "REDUCED",
            ChangeStatus::Removed => "REMOVED",
            ChangeStatus::NoChange => "NOCHANGE",
        }
    }

    /// Classify a price movement from `previous` to `current`
    pub fn from_prices(previous: Money, current: Money) -> Self {
        let difference = current - previous;
        if difference.is_zero() {
            ChangeStatus::NoChange
        } else if difference.is_negative() {
            ChangeStatus::Reduced
        } else {
            ChangeStatus::Increased
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a change report
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEntry {
    pub id: ListingId,
    pub status: ChangeStatus,
    pub price: Option<Money>,
    pub last_price: Option<Money>,
    pub price_difference: Option<Money>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub listed_at: Option<DateTime<Utc>>,
}

impl ChangeEntry {
    /// Entry for a listing seen for the first time
    pub fn new_listing(record: ListingRecord) -> Self {
        Self {
            id: record.id,
            status: ChangeStatus::New,
            price: Some(record.price),
            last_price: None,
            price_difference: None,
            title: record.title,
            url: record.url,
            listed_at: record.listed_at,
        }
    }

    /// Entry comparing a listing's current price with its previous one
    pub fn repriced(record: ListingRecord, last_price: Money) -> Self {
        Self {
            status: ChangeStatus::from_prices(last_price, record.price),
            price_difference: Some(record.price - last_price),
            price: Some(record.price),
            last_price: Some(last_price),
            id: record.id,
            title: record.title,
            url: record.url,
            listed_at: record.listed_at,
        }
    }

    /// Entry for a listing that disappeared since the previous run
    pub fn removed(id: ListingId, last_price: Money) -> Self {
        Self {
            id,
            status: ChangeStatus::Removed,
            price: None,
            last_price: Some(last_price),
            price_difference: None,
            title: None,
            url: None,
            listed_at: None,
        }
    }
}
