//! Replays the foreground's pending queue to the sync endpoint.
//!
//! The state file belongs to the foreground, so it is only ever read here.
//! Actions are not dequeued: the foreground drains its own queue the next
//! time its channel opens, which means an action can reach the server twice.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use backon::ExponentialBuilder;
use backon::Retryable;
use ledger_store::PendingAction;
use reqwest::Method;
use url::Url;

use crate::error::Result;
use crate::fetch::FetchError;
use crate::fetch::FetchRequest;
use crate::fetch::Fetcher;

/// Outcome of one background sync event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
enum PostError {
    #[error(transparent)]
    Network(#[from] FetchError),
    #[error("status {0}")]
    Status(u16),
}

impl PostError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status(status) => *status >= 500 || *status == 429,
        }
    }
}

pub struct BackgroundSync {
    fetcher: Arc<dyn Fetcher>,
    sync_url: Url,
    state_file: PathBuf,
    backoff: ExponentialBuilder,
}

impl BackgroundSync {
    pub fn new(fetcher: Arc<dyn Fetcher>, sync_url: Url, state_file: PathBuf) -> Self {
        Self {
            fetcher,
            sync_url,
            state_file,
            backoff: ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(200))
                .with_max_delay(Duration::from_secs(5))
                .with_max_times(3),
        }
    }

    /// Override the retry schedule.
    pub fn with_backoff(mut self, min_delay: Duration, max_times: usize) -> Self {
        self.backoff = ExponentialBuilder::default()
            .with_min_delay(min_delay)
            .with_max_delay(min_delay * 8)
            .with_max_times(max_times);
        self
    }

    /// POST every queued action once. Per-action failures are logged and
    /// counted; only an unreadable state file fails the whole event.
    pub async fn run(&self) -> Result<SyncReport> {
        let state = ledger_store::load_snapshot(&self.state_file)?;
        let mut report = SyncReport::default();
        for action in &state.pending_actions {
            report.attempted += 1;
            match self.post(action).await {
                Ok(()) => {
                    report.delivered += 1;
                    tracing::debug!(kind = action.kind(), "background sync delivered");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(kind = action.kind(), "background sync failed: {e}");
                }
            }
        }
        tracing::info!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "background sync finished"
        );
        Ok(report)
    }

    async fn post(&self, action: &PendingAction) -> std::result::Result<(), PostError> {
        let body = serde_json::to_vec(action).map_err(|e| FetchError::Network {
            url: self.sync_url.to_string(),
            reason: format!("encode: {e}"),
        })?;
        let attempt = || async {
            let request = FetchRequest::new(Method::POST, self.sync_url.clone())
                .with_header("Content-Type", "application/json")
                .with_body(body.clone());
            let response = self.fetcher.fetch(request).await?;
            if (200..300).contains(&response.status) {
                Ok::<(), PostError>(())
            } else {
                Err(PostError::Status(response.status))
            }
        };
        attempt
            .retry(self.backoff)
            .when(PostError::is_transient)
            .notify(|e, delay| tracing::debug!("retrying background sync in {delay:?}: {e}"))
            .await
    }
}
