//! The real-time channel.
//!
//! One task owns the WebSocket for its whole life and cycles through
//! `Disconnected → Connecting → Connected → Disconnected` until shutdown,
//! waiting `reconnect_delay` after every close. Every failure funnels into
//! the same close path, so each disconnect schedules exactly one reconnect.
//!
//! Callers never touch the socket. They hold a [`ChannelHandle`] and hand it
//! actions; while a session is open the handle carries a *link* (the sending
//! half of an mpsc channel the session drains into the socket).
//!
//! The link slot doubles as the ordering lock: the session publishes its link
//! and drains the pending queue under it, and [`ChannelHandle::send_or_enqueue`]
//! checks the link and enqueues under it. An action is therefore either in
//! the queue before the drain or behind the link after it.

use std::collections::VecDeque;
use std::future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::SinkExt;
use futures::StreamExt;
use ledger_store::ChannelAction;
use ledger_store::LocalStore;
use ledger_store::StoreError;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::connectivity::Connectivity;
use crate::connectivity::ConnectivityTracker;
use crate::protocol::PING_FRAME;
use crate::protocol::ServerMessage;
use crate::protocol::parse_server_message;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Link = mpsc::UnboundedSender<ChannelAction>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// Where an action ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the open session.
    Sent,
    /// Appended to the pending queue; the value is the new queue length.
    Queued(usize),
}

/// Cloneable front of the channel.
#[derive(Clone)]
pub struct ChannelHandle {
    shared: Arc<Shared>,
}

struct Shared {
    link: Mutex<Option<Link>>,
    state: watch::Sender<ChannelState>,
    attempts: AtomicU64,
}

impl ChannelHandle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                link: Mutex::new(None),
                state,
                attempts: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Whether a link is currently published.
    pub fn is_open(&self) -> bool {
        self.lock_link().is_some()
    }

    /// Connection attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Hand `action` to the open session, or give it back if there is none.
    pub fn transmit(&self, action: ChannelAction) -> Result<(), ChannelAction> {
        let link = self.lock_link();
        Self::try_send(link.as_ref(), action)
    }

    /// Transmit `action`, or append it to `store`'s pending queue when no
    /// session is open.
    ///
    /// The queue write happens even if persisting it fails; the error is
    /// returned alongside so the caller can report it.
    pub fn send_or_enqueue(
        &self,
        action: ChannelAction,
        store: &LocalStore,
    ) -> (Delivery, Option<StoreError>) {
        let link = self.lock_link();
        match Self::try_send(link.as_ref(), action) {
            Ok(()) => (Delivery::Sent, None),
            Err(action) => match store.enqueue(action) {
                Ok(len) => (Delivery::Queued(len), None),
                Err(e) => (Delivery::Queued(store.pending_len()), Some(e)),
            },
        }
    }

    /// Wait until the channel reports `Connected`, up to `timeout`.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.subscribe_state();
        tokio::time::timeout(timeout, rx.wait_for(|s| *s == ChannelState::Connected))
            .await
            .is_ok_and(|res| res.is_ok())
    }

    fn try_send(link: Option<&Link>, action: ChannelAction) -> Result<(), ChannelAction> {
        match link {
            Some(tx) => tx.send(action).map_err(|e| e.0),
            None => Err(action),
        }
    }

    fn lock_link(&self) -> MutexGuard<'_, Option<Link>> {
        self.shared.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ChannelState) {
        self.shared.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }
}

impl Default for ChannelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the owner task needs.
pub struct ChannelManager {
    pub url: Url,
    pub reconnect_delay: Duration,
    pub ping_interval: Option<Duration>,
    pub handle: ChannelHandle,
    pub store: Arc<LocalStore>,
    pub connectivity: ConnectivityTracker,
    /// Notified once per opened session to request a reconciliation pull.
    pub reconcile_kick: Arc<Notify>,
}

/// Actions accepted by a session that never reached the socket.
#[derive(Default)]
struct Unsent(VecDeque<ChannelAction>);

impl ChannelManager {
    /// Connect, serve, and reconnect until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let attempt = self.handle.shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            self.handle.set_state(ChannelState::Connecting);
            tracing::debug!(attempt, "connecting to {}", self.url);

            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                res = tokio_tungstenite::connect_async(self.url.as_str()) => res,
            };
            match connected {
                Ok((socket, _response)) => {
                    tracing::info!("channel open: {}", self.url);
                    let (rx, backlog) = self.open_link();
                    let (rx, unsent) = self.session(socket, rx, backlog, &cancel).await;
                    self.close_link(rx, unsent);
                }
                Err(e) => {
                    tracing::warn!(attempt, "channel connect failed: {e}");
                }
            }

            self.handle.set_state(ChannelState::Disconnected);
            self.connectivity.set(Connectivity::Offline);
            if cancel.is_cancelled() {
                break;
            }
            tracing::debug!("reconnecting in {:?}", self.reconnect_delay);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
        self.handle.set_state(ChannelState::Disconnected);
        tracing::debug!("channel task stopped");
    }

    /// Publish a fresh link and drain the pending queue, atomically with
    /// respect to `send_or_enqueue`.
    fn open_link(&self) -> (mpsc::UnboundedReceiver<ChannelAction>, Unsent) {
        let mut link = self.handle.lock_link();
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = self.store.pending();
        let drained = match self.store.take_pending() {
            Ok(actions) => actions,
            Err(e) => {
                tracing::warn!("failed to persist drained queue: {e}");
                queued
            }
        };
        *link = Some(tx);
        drop(link);

        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "replaying pending actions");
        }
        self.handle.set_state(ChannelState::Connected);
        self.connectivity.set(Connectivity::Online);
        self.reconcile_kick.notify_one();
        (rx, Unsent(drained.into()))
    }

    /// Clear the link, then requeue whatever the session accepted but never
    /// wrote. Both happen under the link lock, so a caller that finds the
    /// link gone enqueues behind these actions.
    fn close_link(&self, mut rx: mpsc::UnboundedReceiver<ChannelAction>, mut unsent: Unsent) {
        let mut link = self.handle.lock_link();
        *link = None;
        rx.close();
        while let Ok(action) = rx.try_recv() {
            unsent.0.push_back(action);
        }
        if !unsent.0.is_empty() {
            tracing::info!(count = unsent.0.len(), "requeueing unsent actions");
        }
        for action in unsent.0.drain(..) {
            if let Err(e) = self.store.enqueue(action) {
                tracing::warn!("failed to persist requeued action: {e}");
            }
        }
        drop(link);
    }

    async fn session(
        &self,
        socket: Socket,
        mut rx: mpsc::UnboundedReceiver<ChannelAction>,
        mut unsent: Unsent,
        cancel: &CancellationToken,
    ) -> (mpsc::UnboundedReceiver<ChannelAction>, Unsent) {
        let (mut sink, mut stream) = socket.split();

        while let Some(action) = unsent.0.pop_front() {
            match encode(&action) {
                Some(frame) => {
                    if let Err(e) = sink.send(frame).await {
                        tracing::warn!("channel write failed during replay: {e}");
                        unsent.0.push_front(action);
                        return (rx, unsent);
                    }
                    tracing::debug!(kind = action.kind(), "replayed");
                }
                None => continue,
            }
        }

        let mut ping = self.ping_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Whatever callers already handed over goes out before the close.
                    while let Ok(action) = rx.try_recv() {
                        let Some(frame) = encode(&action) else { continue };
                        if let Err(e) = sink.send(frame).await {
                            tracing::warn!("channel write failed during shutdown: {e}");
                            unsent.0.push_back(action);
                            return (rx, unsent);
                        }
                    }
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                outbound = rx.recv() => {
                    let Some(action) = outbound else { break };
                    let Some(frame) = encode(&action) else { continue };
                    if let Err(e) = sink.send(frame).await {
                        tracing::warn!("channel write failed: {e}");
                        unsent.0.push_back(action);
                        break;
                    }
                    tracing::debug!(kind = action.kind(), "sent");
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_inbound(&text),
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = sink.send(Message::Pong(payload)).await {
                            tracing::warn!("channel pong failed: {e}");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!("channel closed by server: {frame:?}");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("channel error: {e}");
                        break;
                    }
                    None => {
                        tracing::info!("channel closed");
                        break;
                    }
                },
                _ = next_ping(&mut ping) => {
                    if let Err(e) = sink.send(Message::Text(PING_FRAME.to_string())).await {
                        tracing::warn!("channel ping failed: {e}");
                        break;
                    }
                }
            }
        }
        (rx, unsent)
    }

    fn handle_inbound(&self, text: &str) {
        match parse_server_message(text) {
            Ok(ServerMessage::Snapshot { kind, data }) => {
                tracing::debug!(?kind, periods = data.len(), "snapshot received");
                if let Err(e) = self.store.replace_entries(data) {
                    tracing::warn!("failed to persist snapshot: {e}");
                }
            }
            Ok(ServerMessage::Ignored { kind }) => {
                tracing::trace!("ignoring '{kind}' frame");
            }
            Err(e) => {
                tracing::warn!("dropping malformed frame: {e}");
            }
        }
    }
}

fn encode(action: &ChannelAction) -> Option<Message> {
    match action.to_json() {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            tracing::error!(kind = action.kind(), "failed to encode action: {e}");
            None
        }
    }
}

async fn next_ping(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending::<()>().await,
    }
}
