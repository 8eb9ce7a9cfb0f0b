//! eBay Finding API client: store listing pagination and removal checks
//!
//! One `EbayClient` is built per invocation and passed to each store run;
//! there is no shared session or parameter state between calls.

mod fetcher;
mod finding;
mod verify;

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{Result, WatchError};
use finding::FindingRequest;

pub use fetcher::{FetchSummary, ListingFetcher, PartialFetchFailure, SearchPage};

/// Production Finding API endpoint
pub const FINDING_API_URL: &str = "https://svcs.ebay.com/services/search/FindingService/v1";

/// Client for the eBay Finding API
pub struct EbayClient {
    pub(crate) client: Client,
    pub(crate) app_id: String,
    pub(crate) base_url: String,
}

impl EbayClient {
    /// Creates a client for the given application id with a per-request timeout.
    pub fn new(app_id: String, timeout: Duration) -> Result<Self> {
        log::debug!("Creating eBay client (timeout {:?})", timeout);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("listing_watch/1.0")
            .build()?;
        Ok(Self {
            client,
            app_id,
            base_url: FINDING_API_URL.to_string(),
        })
    }

    /// Point the client at another endpoint (sandbox, mock server)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Issue one GET and decode the JSON body.
    ///
    /// Non-success statuses become `HttpStatus`; the ack is left to the caller.
    async fn call<T: DeserializeOwned>(&self, request: &FindingRequest) -> Result<T> {
        log::debug!("Calling {} at {}", request.operation(), self.base_url);

        let response = self
            .client
            .get(&self.base_url)
            .query(&request.query())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            log::error!("{} failed with HTTP {}", request.operation(), status);
            return Err(WatchError::HttpStatus(status));
        }

        let body = response.text().await?;
        log::trace!("{} response: {} bytes", request.operation(), body.len());
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
#[path = "tests/mod.rs"]
pub(crate) mod tests;
