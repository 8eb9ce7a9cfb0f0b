//! Double-checking removal candidates against a marketplace-wide search

use super::finding::{FindingRequest, KeywordSearchEnvelope};
use super::EbayClient;
use crate::error::Result;
use crate::models::ListingId;

impl EbayClient {
    /// Search the whole marketplace for the listing id.
    ///
    /// A store-scoped search can miss live items (indexing lag, category
    /// filters), so any hit here means the listing is still active.
    pub async fn verify_still_active(&self, id: &ListingId) -> Result<bool> {
        let request = FindingRequest::keywords(&self.app_id, id.as_str());
        let envelope: KeywordSearchEnvelope = self.call(&request).await?;
        let response = envelope.into_response();
        response.check_ack()?;

        let count = response.result_count();
        log::debug!("Keyword search for listing {} returned {} result(s)", id, count);
        Ok(count > 0)
    }
}
