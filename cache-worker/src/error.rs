use std::path::PathBuf;

use crate::fetch::FetchError;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache record {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("invalid cache name '{0}'")]
    InvalidName(String),

    #[error("failed to precache {resource}: {reason}")]
    Install { resource: String, reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] ledger_store::StoreError),

    #[error("failed to open window at {url}: {reason}")]
    Window { url: String, reason: String },

    #[error("no notification with tag '{0}' is showing")]
    UnknownNotification(String),

    #[error("invalid worker settings: {0}")]
    Settings(String),

    #[error("worker runtime stopped")]
    Stopped,
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
