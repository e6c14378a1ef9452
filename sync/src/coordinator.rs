//! Optimistic mutations.
//!
//! Each user action is turned into a channel action and either sent right
//! away or parked in the pending queue. Updates and deletes are applied to the
//! local map immediately regardless; adds wait for the server to assign a row
//! and show up through the next reconciliation. Nothing here fails towards the
//! caller: persistence problems are logged and the in-memory state carries on.

use std::sync::Arc;
use std::time::Duration;

use ledger_store::ChannelAction;
use ledger_store::LedgerEntry;
use ledger_store::LocalStore;

use crate::channel::ChannelHandle;
use crate::channel::Delivery;
use crate::reconcile::Reconciler;
use crate::task::Supervisor;

pub struct MutationCoordinator {
    channel: ChannelHandle,
    store: Arc<LocalStore>,
    reconciler: Arc<Reconciler>,
    supervisor: Supervisor,
    post_add_reconcile_delay: Duration,
}

impl MutationCoordinator {
    pub fn new(
        channel: ChannelHandle,
        store: Arc<LocalStore>,
        reconciler: Arc<Reconciler>,
        supervisor: Supervisor,
        post_add_reconcile_delay: Duration,
    ) -> Self {
        Self {
            channel,
            store,
            reconciler,
            supervisor,
            post_add_reconcile_delay,
        }
    }

    /// Submit a new entry. Once sent, a pull is scheduled so the
    /// server-assigned row shows up locally.
    pub fn add_entry(&self, entry: LedgerEntry) -> Delivery {
        let delivery = self.dispatch(ChannelAction::add(entry));
        if delivery == Delivery::Sent {
            let reconciler = Arc::clone(&self.reconciler);
            self.supervisor.spawn_delayed(
                "post-add-reconcile",
                self.post_add_reconcile_delay,
                move || async move {
                    if let Err(e) = reconciler.pull().await {
                        tracing::warn!("post-add reconciliation failed: {e}");
                    }
                },
            );
        }
        delivery
    }

    /// Replace the entry at `row_idx` in `period` with `entry`.
    pub fn update_entry(&self, period: &str, row_idx: u64, entry: LedgerEntry) -> Delivery {
        let delivery = self.dispatch(ChannelAction::update(row_idx, &entry));
        match self
            .store
            .replace_entry(period, row_idx, entry.with_row_idx(row_idx))
        {
            Ok(true) => {}
            Ok(false) => tracing::debug!(period, row_idx, "update for unknown local entry"),
            Err(e) => tracing::warn!("failed to persist optimistic update: {e}"),
        }
        delivery
    }

    /// Remove the entry at `row_idx` from `period`.
    pub fn delete_entry(&self, period: &str, row_idx: u64) -> Delivery {
        let delivery = self.dispatch(ChannelAction::delete(row_idx));
        match self.store.remove_entry(period, row_idx) {
            Ok(true) => {}
            Ok(false) => tracing::debug!(period, row_idx, "delete for unknown local entry"),
            Err(e) => tracing::warn!("failed to persist optimistic delete: {e}"),
        }
        delivery
    }

    fn dispatch(&self, action: ChannelAction) -> Delivery {
        let kind = action.kind();
        let (delivery, error) = self.channel.send_or_enqueue(action, &self.store);
        if let Some(e) = error {
            tracing::warn!(kind, "failed to persist queued action: {e}");
        }
        match delivery {
            Delivery::Sent => tracing::debug!(kind, "action sent"),
            Delivery::Queued(len) => tracing::info!(kind, queued = len, "offline, action queued"),
        }
        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_store::PeriodMap;
    use pretty_assertions::assert_eq;
    use url::Url;

    use crate::connectivity::ConnectivityTracker;

    fn offline_coordinator(store: Arc<LocalStore>) -> MutationCoordinator {
        // Nothing listens here; the reconciler is never reached while offline.
        let url = Url::parse("http://127.0.0.1:9/api/entries").unwrap();
        let reconciler = Arc::new(Reconciler::new(
            reqwest::Client::new(),
            url,
            Arc::clone(&store),
            ConnectivityTracker::new(),
        ));
        MutationCoordinator::new(
            ChannelHandle::new(),
            store,
            reconciler,
            Supervisor::new(),
            Duration::from_millis(10),
        )
    }

    fn seeded_store() -> Arc<LocalStore> {
        let store = Arc::new(LocalStore::in_memory());
        let mut map = PeriodMap::new();
        map.insert(
            "2025-01",
            vec![
                LedgerEntry::revenue("03.01.2025", "Acme", 100.0).with_row_idx(7),
                LedgerEntry::revenue("04.01.2025", "Globex", 40.0).with_row_idx(8),
            ],
        );
        store.replace_entries(map).unwrap();
        store
    }

    #[test]
    fn offline_update_is_visible_and_queued() {
        let store = seeded_store();
        let coordinator = offline_coordinator(Arc::clone(&store));

        let delivery = coordinator.update_entry(
            "2025-01",
            7,
            LedgerEntry::salary("03.01.2025", "Acme payout", 150.0),
        );

        assert_eq!(delivery, Delivery::Queued(1));
        let updated = store.entries().find("2025-01", 7).cloned().unwrap();
        assert_eq!(
            updated,
            LedgerEntry::salary("03.01.2025", "Acme payout", 150.0).with_row_idx(7)
        );
        assert_eq!(updated.amount(), None);
        assert_eq!(
            store.pending(),
            vec![ChannelAction::UpdateEntry {
                idx: 7,
                symbols: "Acme payout".to_string(),
                amount: 150.0,
            }]
        );
    }

    #[test]
    fn offline_delete_is_visible_and_queued() {
        let store = seeded_store();
        let coordinator = offline_coordinator(Arc::clone(&store));

        coordinator.delete_entry("2025-01", 8);

        assert_eq!(store.entries_for("2025-01").len(), 1);
        assert_eq!(store.pending(), vec![ChannelAction::delete(8)]);
    }

    #[test]
    fn offline_add_is_only_queued() {
        let store = seeded_store();
        let coordinator = offline_coordinator(Arc::clone(&store));
        let entry = LedgerEntry::revenue("05.01.2025", "Initech", 75.0);

        assert_eq!(coordinator.add_entry(entry.clone()), Delivery::Queued(1));
        assert_eq!(store.entries_for("2025-01").len(), 2);
        assert_eq!(store.pending(), vec![ChannelAction::add(entry)]);
    }

    #[test]
    fn queue_keeps_submission_order() {
        let store = seeded_store();
        let coordinator = offline_coordinator(Arc::clone(&store));
        let add = LedgerEntry::revenue("06.01.2025", "Umbrella", 10.0);

        coordinator.add_entry(add.clone());
        coordinator.update_entry("2025-01", 7, LedgerEntry::revenue("03.01.2025", "Acme", 1.0));
        coordinator.delete_entry("2025-01", 8);

        let kinds: Vec<_> = store.pending().iter().map(ChannelAction::kind).collect();
        assert_eq!(kinds, vec!["add_entry", "update_entry", "delete_entry"]);
    }

    #[test]
    fn unknown_rows_do_not_create_periods() {
        let store = seeded_store();
        let coordinator = offline_coordinator(Arc::clone(&store));

        coordinator.delete_entry("2031-12", 1);
        coordinator.update_entry("2031-12", 1, LedgerEntry::revenue("01.12.2031", "X", 1.0));

        assert_eq!(store.entries().len(), 1);
        assert_eq!(store.pending_len(), 2);
    }
}
