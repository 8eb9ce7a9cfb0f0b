//! Sequential pagination over a seller's store listings

use thiserror::Error;

use super::finding::{FindingRequest, StoreSearchEnvelope};
use super::EbayClient;
use crate::error::{Result, WatchError};
use crate::models::ListingRecord;

/// One decoded page of store search results
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub page_number: u32,
    pub total_pages: u32,
    pub records: Vec<ListingRecord>,
}

/// A fully drained fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSummary {
    pub pages_fetched: u32,
    pub records_yielded: usize,
}

/// The fetch stopped early. Records yielded before the failure were already
/// handed to the sink and must be treated as incomplete.
#[derive(Debug, Error)]
#[error("fetch stopped after {pages_fetched} page(s) with {records_yielded} listing(s) collected: {error}")]
pub struct PartialFetchFailure {
    pub store_name: String,
    pub pages_fetched: u32,
    pub records_yielded: usize,
    #[source]
    pub error: WatchError,
}

impl PartialFetchFailure {
    /// Convert into the store-level error reported to the caller
    pub fn into_error(self) -> WatchError {
        WatchError::PartialFetch {
            store: self.store_name,
            pages_fetched: self.pages_fetched,
            source: Box::new(self.error),
        }
    }
}

impl EbayClient {
    /// Fetch a single page of a store's listings
    pub async fn fetch_store_page(&self, store_name: &str, page_number: u32) -> Result<SearchPage> {
        let request = FindingRequest::store_page(&self.app_id, store_name, page_number);
        let envelope: StoreSearchEnvelope = self.call(&request).await?;
        let response = envelope.into_response();
        response.check_ack()?;

        let total_pages = response.total_pages();
        log::debug!(
            "Store '{}' page {}/{}: {} result(s), {} total",
            store_name,
            page_number,
            total_pages,
            response.result_count(),
            response
                .total_entries()
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string())
        );

        Ok(SearchPage {
            page_number,
            total_pages,
            records: response.into_records(),
        })
    }
}

/// Lazy, non-restartable page cursor over one store.
///
/// The total page count is only known after page 1, so pages are requested
/// strictly one after another. After an error the cursor is exhausted.
pub struct ListingFetcher<'a> {
    client: &'a EbayClient,
    store_name: String,
    next_page: u32,
    total_pages: Option<u32>,
    pages_fetched: u32,
    exhausted: bool,
}

impl<'a> ListingFetcher<'a> {
    pub fn new(client: &'a EbayClient, store_name: &str) -> Self {
        Self {
            client,
            store_name: store_name.to_string(),
            next_page: 1,
            total_pages: None,
            pages_fetched: 0,
            exhausted: false,
        }
    }

    /// Fetch the next page, or `None` once every page has been consumed
    pub async fn next_page(&mut self) -> Result<Option<Vec<ListingRecord>>> {
        if self.exhausted {
            return Ok(None);
        }
        if let Some(total) = self.total_pages {
            if self.next_page > total {
                self.exhausted = true;
                return Ok(None);
            }
        }

        let page = match self
            .client
            .fetch_store_page(&self.store_name, self.next_page)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                self.exhausted = true;
                return Err(e);
            }
        };

        self.pages_fetched += 1;
        self.next_page += 1;
        self.total_pages = Some(page.total_pages);
        if page.total_pages == 0 {
            self.exhausted = true;
        }
        Ok(Some(page.records))
    }

    /// Drain every page into `sink`, one record at a time
    pub async fn for_each_listing<F>(
        &mut self,
        mut sink: F,
    ) -> std::result::Result<FetchSummary, PartialFetchFailure>
    where
        F: FnMut(ListingRecord),
    {
        let mut records_yielded = 0;
        loop {
            match self.next_page().await {
                Ok(Some(records)) => {
                    records_yielded += records.len();
                    records.into_iter().for_each(&mut sink);
                }
                Ok(None) => break,
                Err(error) => {
                    log::error!(
                        "Fetching store '{}' failed on page {}: {}",
                        self.store_name,
                        self.next_page,
                        error
                    );
                    return Err(PartialFetchFailure {
                        store_name: self.store_name.clone(),
                        pages_fetched: self.pages_fetched,
                        records_yielded,
                        error,
                    });
                }
            }
        }

        log::info!(
            "Fetched {} listing(s) across {} page(s) for store '{}'",
            records_yielded,
            self.pages_fetched,
            self.store_name
        );
        Ok(FetchSummary {
            pages_fetched: self.pages_fetched,
            records_yielded,
        })
    }
}
