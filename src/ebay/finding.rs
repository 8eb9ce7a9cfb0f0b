//! eBay Finding API request parameters and response shapes
//!
//! Every field in the JSON flavour of the Finding API is wrapped in a
//! single-element array, so most fields here are `Vec`s read through `first()`.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Result, WatchError};
use crate::models::ListingRecord;
use crate::money::Money;

pub(crate) const OP_STORE_SEARCH: &str = "findItemsIneBayStores";
pub(crate) const OP_KEYWORD_SEARCH: &str = "findItemsByKeywords";
const SERVICE_VERSION: &str = "1.0.0";

/// Query parameters for one Finding API call.
///
/// Built fresh for every request; never mutated between pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FindingRequest {
    operation: &'static str,
    app_id: String,
    extra: Vec<(&'static str, String)>,
}

impl FindingRequest {
    /// One page of a seller's store listings
    pub(crate) fn store_page(app_id: &str, store_name: &str, page: u32) -> Self {
        Self {
            operation: OP_STORE_SEARCH,
            app_id: app_id.to_string(),
            extra: vec![
                ("storeName", store_name.to_string()),
                ("paginationInput.pageNumber", page.to_string()),
            ],
        }
    }

    /// Marketplace-wide keyword search
    pub(crate) fn keywords(app_id: &str, keywords: &str) -> Self {
        Self {
            operation: OP_KEYWORD_SEARCH,
            app_id: app_id.to_string(),
            extra: vec![("keywords", keywords.to_string())],
        }
    }

    pub(crate) fn operation(&self) -> &'static str {
        self.operation
    }

    pub(crate) fn query(&self) -> Vec<(&str, String)> {
        let mut params = vec![
            ("OPERATION-NAME", self.operation.to_string()),
            ("SERVICE-VERSION", SERVICE_VERSION.to_string()),
            ("SECURITY-APPNAME", self.app_id.clone()),
            ("RESPONSE-DATA-FORMAT", "JSON".to_string()),
            ("REST-PAYLOAD", String::new()),
        ];
        params.extend(self.extra.iter().map(|(k, v)| (*k, v.clone())));
        params
    }
}

/// `findItemsIneBayStores` response root
#[derive(Debug, Deserialize)]
pub(crate) struct StoreSearchEnvelope {
    #[serde(rename = "findItemsIneBayStoresResponse", default)]
    pub responses: Vec<FindingResponse>,
}

/// `findItemsByKeywords` response root
#[derive(Debug, Deserialize)]
pub(crate) struct KeywordSearchEnvelope {
    #[serde(rename = "findItemsByKeywordsResponse", default)]
    pub responses: Vec<FindingResponse>,
}

/// Body shared by all Finding API operations
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FindingResponse {
    #[serde(default)]
    pub ack: Vec<String>,
    #[serde(default)]
    pub error_message: Vec<ErrorMessage>,
    #[serde(default)]
    pub pagination_output: Vec<PaginationOutput>,
    #[serde(default)]
    pub search_result: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorMessage {
    #[serde(default)]
    pub error: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub message: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PaginationOutput {
    #[serde(default)]
    pub total_pages: Vec<String>,
    #[serde(default)]
    pub total_entries: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResult {
    #[serde(rename = "@count", default)]
    pub count: Option<String>,
    #[serde(default)]
    pub item: Vec<FindingItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FindingItem {
    #[serde(default)]
    pub item_id: Vec<String>,
    #[serde(default)]
    pub title: Vec<String>,
    #[serde(rename = "viewItemURL", default)]
    pub view_item_url: Vec<String>,
    #[serde(default)]
    pub selling_status: Vec<SellingStatus>,
    #[serde(default)]
    pub listing_info: Vec<ListingInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SellingStatus {
    #[serde(default)]
    pub current_price: Vec<Amount>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Amount {
    #[serde(rename = "@currencyId", default)]
    pub currency_id: Option<String>,
    #[serde(rename = "__value__", default)]
    pub value: Option<RawAmount>,
}

/// The API sends amounts as strings, but tolerate bare numbers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawAmount {
    Text(String),
    Number(serde_json::Number),
}

impl RawAmount {
    fn as_text(&self) -> String {
        match self {
            RawAmount::Text(s) => s.clone(),
            RawAmount::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListingInfo {
    #[serde(default)]
    pub start_time: Vec<String>,
}

impl StoreSearchEnvelope {
    pub(crate) fn into_response(self) -> FindingResponse {
        self.responses.into_iter().next().unwrap_or_default()
    }
}

impl KeywordSearchEnvelope {
    pub(crate) fn into_response(self) -> FindingResponse {
        self.responses.into_iter().next().unwrap_or_default()
    }
}

impl FindingResponse {
    /// Fail unless the API acknowledged `Success` or `Warning`
    pub(crate) fn check_ack(&self) -> Result<()> {
        let ack = self.ack.first().map(String::as_str).unwrap_or("");
        match ack {
            "Success" => Ok(()),
            "Warning" => {
                log::warn!("eBay API returned a warning: {}", self.error_text());
                Ok(())
            }
            _ => Err(WatchError::RemoteAck {
                ack: ack.to_string(),
                message: self.error_text(),
            }),
        }
    }

    /// First human-readable error message in the response
    pub(crate) fn error_text(&self) -> String {
        self.error_message
            .iter()
            .flat_map(|m| m.error.iter())
            .flat_map(|e| e.message.iter())
            .next()
            .cloned()
            .unwrap_or_else(|| "no error message".to_string())
    }

    /// Total number of result pages; 0 when the store has nothing listed
    pub(crate) fn total_pages(&self) -> u32 {
        self.pagination_output
            .first()
            .and_then(|p| p.total_pages.first())
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(0)
    }

    pub(crate) fn total_entries(&self) -> Option<u64> {
        self.pagination_output
            .first()
            .and_then(|p| p.total_entries.first())
            .and_then(|n| n.trim().parse().ok())
    }

    /// Number of results on this page as reported by `@count`
    pub(crate) fn result_count(&self) -> u64 {
        match self.search_result.first() {
            Some(result) => result
                .count
                .as_deref()
                .and_then(|c| c.trim().parse().ok())
                .unwrap_or(result.item.len() as u64),
            None => 0,
        }
    }

    /// Convert the page's items, dropping any without an id or a usable price
    pub(crate) fn into_records(self) -> Vec<ListingRecord> {
        self.search_result
            .into_iter()
            .flat_map(|r| r.item)
            .filter_map(FindingItem::into_record)
            .collect()
    }
}

impl FindingItem {
    fn into_record(self) -> Option<ListingRecord> {
        let Some(id) = self.item_id.into_iter().next().filter(|id| !id.is_empty()) else {
            log::warn!("Skipping search result without an itemId");
            return None;
        };

        let amount = self
            .selling_status
            .first()
            .and_then(|s| s.current_price.first());
        let raw_price = amount
            .and_then(|a| a.value.as_ref())
            .map(RawAmount::as_text)
            .unwrap_or_default();
        let price = match Money::parse(&raw_price) {
            Ok(price) => price,
            Err(e) => {
                log::warn!("Skipping listing {}: {}", id, e);
                return None;
            }
        };
        if let Some(currency) = amount.and_then(|a| a.currency_id.as_deref()) {
            log::trace!("Listing {} priced in {}", id, currency);
        }

        let listed_at = self
            .listing_info
            .into_iter()
            .next()
            .and_then(|info| info.start_time.into_iter().next())
            .and_then(|raw| parse_start_time(&id, &raw));

        Some(ListingRecord {
            id: id.into(),
            price,
            title: self.title.into_iter().next(),
            url: self.view_item_url.into_iter().next(),
            listed_at,
        })
    }
}

fn parse_start_time(id: &str, raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            log::debug!("Listing {} has unparsable startTime '{}': {}", id, raw, e);
            None
        }
    }
}
