#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]
//! Shared fixtures: an in-process channel server and config helpers.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::SinkExt;
use futures::StreamExt;
use ledger_sync::SyncConfig;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

#[derive(Debug, Clone)]
enum Control {
    Send(String),
    DropAll,
}

/// A WebSocket server that records every text frame it receives.
pub struct FakeChannelServer {
    pub url: Url,
    received: mpsc::UnboundedReceiver<Value>,
    control: broadcast::Sender<Control>,
    connections: Arc<AtomicUsize>,
    init_frame: Arc<Mutex<Option<String>>>,
    accept_loop: JoinHandle<()>,
}

impl FakeChannelServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (frames_tx, received) = mpsc::unbounded_channel();
        let (control, _) = broadcast::channel(64);
        let connections = Arc::new(AtomicUsize::new(0));
        let init_frame = Arc::new(Mutex::new(None::<String>));

        let accept_loop = tokio::spawn({
            let control = control.clone();
            let connections = Arc::clone(&connections);
            let init_frame = Arc::clone(&init_frame);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                        continue;
                    };
                    connections.fetch_add(1, Ordering::SeqCst);
                    let frames_tx = frames_tx.clone();
                    let mut control_rx = control.subscribe();
                    let init = init_frame.lock().unwrap().clone();
                    tokio::spawn(async move {
                        let (mut sink, mut stream) = ws.split();
                        if let Some(init) = init {
                            let _ = sink.send(Message::Text(init)).await;
                        }
                        loop {
                            tokio::select! {
                                ctl = control_rx.recv() => match ctl {
                                    Ok(Control::Send(text)) => {
                                        let _ = sink.send(Message::Text(text)).await;
                                    }
                                    Ok(Control::DropAll) | Err(_) => break,
                                },
                                frame = stream.next() => match frame {
                                    Some(Ok(Message::Text(text))) => {
                                        if let Ok(value) = serde_json::from_str(&text) {
                                            let _ = frames_tx.send(value);
                                        }
                                    }
                                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                    Some(Ok(_)) => {}
                                },
                            }
                        }
                    });
                }
            }
        });

        Self {
            url: Url::parse(&format!("ws://{addr}/ws")).unwrap(),
            received,
            control,
            connections,
            init_frame,
            accept_loop,
        }
    }

    /// Frame sent to every connection right after the handshake.
    pub fn set_init(&self, frame: Value) {
        *self.init_frame.lock().unwrap() = Some(frame.to_string());
    }

    /// Send `frame` to every open connection.
    pub fn broadcast(&self, frame: Value) {
        let _ = self.control.send(Control::Send(frame.to_string()));
    }

    /// Abruptly drop every open connection.
    pub fn drop_connections(&self) {
        let _ = self.control.send(Control::DropAll);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Next frame received from any client.
    pub async fn next_frame(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("server stopped")
    }

    /// Next frame that is not an application ping.
    pub async fn next_action(&mut self) -> Value {
        loop {
            let frame = self.next_frame().await;
            if frame["type"] != "ping" {
                return frame;
            }
        }
    }

    /// Assert no frame arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(Some(frame)) = tokio::time::timeout(window, self.received.recv()).await {
            panic!("unexpected frame: {frame}");
        }
    }
}

impl Drop for FakeChannelServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
        let _ = self.control.send(Control::DropAll);
    }
}

/// Config with test-friendly timings.
pub fn fast_config(channel_url: Url, entries_url: Url) -> SyncConfig {
    let mut config = SyncConfig::new(channel_url, entries_url);
    config.reconnect_delay = Duration::from_millis(50);
    config.reconcile_interval = Duration::from_secs(3600);
    config.post_add_reconcile_delay = Duration::from_millis(20);
    config.request_timeout = Duration::from_secs(2);
    config
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F: FnMut() -> bool>(what: &str, mut check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
