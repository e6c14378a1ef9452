//! Full-snapshot reconciliation against the entries resource.

use std::sync::Arc;

use ledger_store::LocalStore;
use ledger_store::PeriodMap;
use serde::Deserialize;
use url::Url;

use crate::connectivity::Connectivity;
use crate::connectivity::ConnectivityTracker;
use crate::error::Result;
use crate::error::SyncError;

#[derive(Deserialize)]
struct EntriesResponse {
    data: PeriodMap,
}

/// Pulls the authoritative period map and replaces the local one with it.
pub struct Reconciler {
    client: reqwest::Client,
    entries_url: Url,
    store: Arc<LocalStore>,
    connectivity: ConnectivityTracker,
}

impl Reconciler {
    pub fn new(
        client: reqwest::Client,
        entries_url: Url,
        store: Arc<LocalStore>,
        connectivity: ConnectivityTracker,
    ) -> Self {
        Self {
            client,
            entries_url,
            store,
            connectivity,
        }
    }

    /// `GET` the entries resource and replace the local map.
    ///
    /// Success marks the app online; any failure marks it offline and is
    /// returned. Local state is left untouched on failure.
    pub async fn pull(&self) -> Result<()> {
        match self.fetch().await {
            Ok(entries) => {
                tracing::debug!(
                    periods = entries.len(),
                    entries = entries.entry_count(),
                    "reconciled"
                );
                self.connectivity.set(Connectivity::Online);
                if let Err(e) = self.store.replace_entries(entries) {
                    tracing::warn!("failed to persist reconciled entries: {e}");
                }
                Ok(())
            }
            Err(e) => {
                self.connectivity.set(Connectivity::Offline);
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<PeriodMap> {
        let url = self.entries_url.to_string();
        let response = self
            .client
            .get(self.entries_url.clone())
            .send()
            .await
            .map_err(|source| SyncError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| SyncError::Http {
            url: url.clone(),
            source,
        })?;
        let parsed: EntriesResponse =
            serde_json::from_slice(&body).map_err(|e| SyncError::Body {
                url,
                reason: e.to_string(),
            })?;
        Ok(parsed.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_store::LedgerEntry;
    use pretty_assertions::assert_eq;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    fn reconciler(server: &MockServer, store: Arc<LocalStore>) -> (Reconciler, ConnectivityTracker) {
        let connectivity = ConnectivityTracker::new();
        let url = Url::parse(&format!("{}/api/entries", server.uri())).unwrap();
        (
            Reconciler::new(reqwest::Client::new(), url, store, connectivity.clone()),
            connectivity,
        )
    }

    #[tokio::test]
    async fn pull_replaces_local_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/entries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "2025-03": [
                        {"date": "02.03.2025", "symbols": "Acme", "amount": 120.0, "row_idx": 4}
                    ]
                }
            })))
            .mount(&server)
            .await;

        let store = Arc::new(LocalStore::in_memory());
        let mut stale = PeriodMap::new();
        stale.insert("2024-12", vec![LedgerEntry::revenue("01.12.2024", "Old", 1.0)]);
        store.replace_entries(stale).unwrap();

        let (reconciler, connectivity) = reconciler(&server, Arc::clone(&store));
        reconciler.pull().await.unwrap();

        let entries = store.entries();
        assert_eq!(entries.periods().collect::<Vec<_>>(), vec!["2025-03"]);
        assert_eq!(
            entries.find("2025-03", 4),
            Some(&LedgerEntry::revenue("02.03.2025", "Acme", 120.0).with_row_idx(4))
        );
        assert_eq!(connectivity.get(), Connectivity::Online);
    }

    #[tokio::test]
    async fn server_error_marks_offline_and_keeps_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/entries"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = Arc::new(LocalStore::in_memory());
        let mut local = PeriodMap::new();
        local.insert("2025-01", vec![LedgerEntry::salary("05.01.2025", "Me", 50.0)]);
        store.replace_entries(local.clone()).unwrap();

        let (reconciler, connectivity) = reconciler(&server, Arc::clone(&store));
        connectivity.set(Connectivity::Online);

        let err = reconciler.pull().await.unwrap_err();
        assert!(matches!(err, SyncError::Status { status: 500, .. }));
        assert_eq!(connectivity.get(), Connectivity::Offline);
        assert_eq!(store.entries(), local);
    }

    #[tokio::test]
    async fn malformed_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/entries"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let store = Arc::new(LocalStore::in_memory());
        let (reconciler, _) = reconciler(&server, store);
        assert!(matches!(
            reconciler.pull().await,
            Err(SyncError::Body { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let server = MockServer::builder().start().await;
        let store = Arc::new(LocalStore::in_memory());
        let (reconciler, connectivity) = reconciler(&server, store);
        drop(server);

        assert!(matches!(
            reconciler.pull().await,
            Err(SyncError::Http { .. })
        ));
        assert_eq!(connectivity.get(), Connectivity::Offline);
    }
}
