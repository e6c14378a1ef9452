use ledger_common::ConfigError;
use ledger_store::StoreError;

/// Errors surfaced by the sync engine.
///
/// Channel failures never show up here: the channel retries forever and only
/// reports through [`crate::Connectivity`].
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected response body from {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
