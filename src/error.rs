//! Error types for listing_watch

use thiserror::Error;

/// Unified error type for listing_watch operations
#[derive(Debug, Error)]
pub enum WatchError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP error status code from the marketplace API
    #[error("HTTP error: {0}")]
    HttpStatus(reqwest::StatusCode),
    /// Failed to parse JSON response
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// The API answered 200 but acknowledged a failure in the body
    #[error("eBay API returned ack '{ack}': {message}")]
    RemoteAck { ack: String, message: String },
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// CSV serialization failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// A stored snapshot row holds a price that does not parse
    #[error("Corrupt snapshot for store '{store}': listing {listing_id} has price '{raw}'")]
    CorruptSnapshot {
        store: String,
        listing_id: String,
        raw: String,
    },
    /// The stored last-run timestamp does not parse
    #[error("Corrupt last-run timestamp for store '{store}': '{raw}'")]
    CorruptTimestamp { store: String, raw: String },
    /// The fetch for a store stopped early; whatever was collected has been written
    #[error("Fetch for store '{store}' stopped after {pages_fetched} page(s): {source}")]
    PartialFetch {
        store: String,
        pages_fetched: u32,
        #[source]
        source: Box<WatchError>,
    },
}

impl WatchError {
    /// True for failures of the remote API call itself (transport, status or ack)
    pub fn is_remote(&self) -> bool {
        match self {
            WatchError::Network(_)
            | WatchError::HttpStatus(_)
            | WatchError::Parse(_)
            | WatchError::RemoteAck { .. } => true,
            WatchError::PartialFetch { source, .. } => source.is_remote(),
            _ => false,
        }
    }
}

/// Result alias for listing_watch operations
pub type Result<T> = std::result::Result<T, WatchError>;
