//! Runtime settings of the sync engine, resolved from [`LedgerConfig`].

use std::time::Duration;

use ledger_common::LedgerConfig;
use url::Url;

use crate::error::Result;
use crate::error::SyncError;

/// Resolved endpoints and timings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// `ws://` or `wss://` URL of the real-time channel.
    pub channel_url: Url,
    /// Full snapshot resource (`GET` → `{"data": PeriodMap}`).
    pub entries_url: Url,
    pub reconnect_delay: Duration,
    pub reconcile_interval: Duration,
    pub post_add_reconcile_delay: Duration,
    pub ping_interval: Option<Duration>,
    pub request_timeout: Duration,
}

impl SyncConfig {
    /// Endpoints as given, default timings.
    pub fn new(channel_url: Url, entries_url: Url) -> Self {
        Self {
            channel_url,
            entries_url,
            reconnect_delay: Duration::from_millis(3000),
            reconcile_interval: Duration::from_millis(5000),
            post_add_reconcile_delay: Duration::from_millis(500),
            ping_interval: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_ledger(config: &LedgerConfig) -> Result<Self> {
        let origin = config.server.origin_url()?;
        let entries_url = config.server.endpoint(&config.server.entries_path)?;
        Ok(Self {
            channel_url: channel_url(&origin, &config.server.channel_path)?,
            entries_url,
            reconnect_delay: config.sync.reconnect_delay(),
            reconcile_interval: config.sync.reconcile_interval(),
            post_add_reconcile_delay: config.sync.post_add_reconcile_delay(),
            ping_interval: config.sync.ping_interval(),
            request_timeout: config.sync.request_timeout(),
        })
    }
}

/// Derive the channel URL from the page origin: `http` → `ws`, `https` → `wss`.
pub fn channel_url(origin: &Url, path: &str) -> Result<Url> {
    let scheme = match origin.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(SyncError::Endpoint(format!(
                "unsupported origin scheme '{other}'"
            )));
        }
    };
    let host = origin
        .host_str()
        .ok_or_else(|| SyncError::Endpoint(format!("origin {origin} has no host")))?;
    let authority = match origin.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    Url::parse(&format!("{scheme}://{authority}{path}"))
        .map_err(|e| SyncError::Endpoint(format!("{scheme}://{authority}{path}: {e}")))
}
