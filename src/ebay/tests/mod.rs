//! Unit tests for the eBay Finding API client.


use super::EbayClient;
use std::time::Duration;

pub(crate) fn client_with_mock(mock_uri: &str) -> EbayClient {
    EbayClient::new("TEST-APP-ID".to_string(), Duration::from_secs(5))
        .unwrap()
        .with_base_url(mock_uri)
}

/// Builds a `findItemsIneBayStores` page with the given (itemId, price) pairs.
pub(crate) fn store_page_json(total_pages: u32, items: &[(&str, &str)]) -> serde_json::Value {
    let items: Vec<serde_json::Value> = items
        .iter()
        .map(|(id, price)| {
            serde_json::json!({
                "itemId": [id],
                "title": [format!("Item {id}")],
                "viewItemURL": [format!("https://www.ebay.com/itm/{id}")],
                "sellingStatus": [{
                    "currentPrice": [{ "@currencyId": "USD", "__value__": price }]
                }],
                "listingInfo": [{ "startTime": ["2023-01-02T00:00:00.000Z"] }]
            })
        })
        .collect();

    serde_json::json!({
        "findItemsIneBayStoresResponse": [{
            "ack": ["Success"],
            "paginationOutput": [{
                "totalPages": [total_pages.to_string()],
                "totalEntries": [items.len().to_string()]
            }],
            "searchResult": [{
                "@count": items.len().to_string(),
                "item": items
            }]
        }]
    })
}

/// Builds a `findItemsByKeywords` response reporting `count` hits.
pub(crate) fn keyword_json(count: u32) -> serde_json::Value {
    serde_json::json!({
        "findItemsByKeywordsResponse": [{
            "ack": ["Success"],
            "searchResult": [{ "@count": count.to_string() }]
        }]
    })
}

pub(crate) fn failure_json(operation_root: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        operation_root: [{
            "ack": ["Failure"],
            "errorMessage": [{ "error": [{ "message": [message] }] }]
        }]
    })
}
