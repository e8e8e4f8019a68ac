use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::client::stats::Stats;
use crate::config::Config;
use crate::types::{ClientMessage, ServerMessage};

pub(crate) mod consts;
mod stats;
mod utils;

pub use stats::Stats as TransportStats;
pub(crate) use utils::cookie_value;

pub type TransportTx = mpsc::UnboundedSender<TransportEvent>;
pub type TransportRx = mpsc::UnboundedReceiver<TransportEvent>;

/// Connection-level faults. They reach callers only as [`TransportEvent::Error`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid handshake request: {0}")]
    Request(#[source] tokio_tungstenite::tungstenite::Error),
    #[error("failed to connect: {0}")]
    Handshake(#[source] tokio_tungstenite::tungstenite::Error),
    #[error("connection fault: {0}")]
    Connection(#[source] tokio_tungstenite::tungstenite::Error),
}

/// Everything a transport reports, one variant per kind with a fixed payload.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Open,
    Close { reason: Option<String> },
    Error(Arc<TransportError>),
    Server(ServerMessage),
    /// A binary frame. Zero length is meaningful (playback sentinel).
    Audio(Vec<u8>),
}

/// The duplex protocol link as the session sees it.
///
/// Implementations never return errors from these calls: sends on a link
/// that is not open are dropped and logged, and connection faults arrive as
/// events on the channel handed to the implementation at construction.
pub trait Transport: Send {
    fn connect(&mut self);
    fn send(&mut self, message: ClientMessage);
    fn send_audio(&mut self, bytes: Vec<u8>);
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

enum Outbound {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// WebSocket implementation of [`Transport`].
pub struct Client {
    ws_url: String,
    session_cookie: Option<SecretString>,
    capacity: usize,
    events: TransportTx,
    out_tx: Option<mpsc::Sender<Outbound>>,
    state: Arc<Mutex<LinkState>>,
    stats: Arc<Mutex<Stats>>,
}

impl Client {
    pub fn new(config: &Config, events: TransportTx) -> Self {
        Self {
            ws_url: config.ws_url().to_string(),
            session_cookie: config.session_cookie().cloned(),
            capacity: config.channel_capacity(),
            events,
            out_tx: None,
            state: Arc::new(Mutex::new(LinkState::Idle)),
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(LinkState::Closed)
    }

    pub fn stats(&self) -> anyhow::Result<TransportStats> {
        if let Ok(stats_guard) = self.stats.lock() {
            Ok(stats_guard.clone())
        } else {
            Err(anyhow::anyhow!("failed to get stats"))
        }
    }

    fn set_state(&self, next: LinkState) {
        set_state(&self.state, next);
    }

    fn record(&self, f: impl FnOnce(&mut Stats)) {
        if let Ok(mut stats_guard) = self.stats.lock() {
            f(&mut stats_guard);
        }
    }

    fn enqueue(&mut self, outbound: Outbound, kind: &str) {
        if self.state() != LinkState::Open {
            tracing::warn!("dropping {}: connection is not open", kind);
            self.record(Stats::record_dropped_send);
            return;
        }
        let Some(tx) = self.out_tx.as_ref() else {
            tracing::warn!("dropping {}: no writer", kind);
            self.record(Stats::record_dropped_send);
            return;
        };
        if let Err(e) = tx.try_send(outbound) {
            tracing::error!("failed to queue {}: {}", kind, e);
            self.record(Stats::record_dropped_send);
        }
    }
}

impl Transport for Client {
    fn connect(&mut self) {
        match self.state() {
            LinkState::Connecting | LinkState::Open => {
                tracing::warn!("connect called while a connection is active or pending");
                return;
            }
            _ => {}
        }
        self.set_state(LinkState::Connecting);

        let (out_tx, out_rx) = mpsc::channel(self.capacity);
        self.out_tx = Some(out_tx);

        let ws_url = self.ws_url.clone();
        let session_cookie = self.session_cookie.clone();
        let events = self.events.clone();
        let state = self.state.clone();
        let stats = self.stats.clone();
        tokio::spawn(async move {
            run_connection(ws_url, session_cookie, events, state, stats, out_rx).await;
        });
    }

    fn send(&mut self, message: ClientMessage) {
        let kind = message.kind();
        match serde_json::to_string(&message) {
            Ok(text) => {
                tracing::debug!("sending message: {}", kind);
                self.enqueue(Outbound::Text(text), kind);
            }
            Err(e) => {
                tracing::error!("failed to serialize message {}: {}", kind, e);
            }
        }
    }

    fn send_audio(&mut self, bytes: Vec<u8>) {
        self.enqueue(Outbound::Binary(bytes), "audio frame");
    }

    fn close(&mut self) {
        match self.state() {
            LinkState::Open => {
                self.set_state(LinkState::Closing);
                if let Some(tx) = self.out_tx.as_ref() {
                    if let Err(e) = tx.try_send(Outbound::Close) {
                        tracing::warn!("failed to queue close frame: {}", e);
                    }
                }
            }
            LinkState::Connecting => {
                // The connection task notices the dropped writer once the handshake completes.
                self.set_state(LinkState::Closing);
                self.out_tx = None;
            }
            _ => {}
        }
    }
}

fn set_state(state: &Mutex<LinkState>, next: LinkState) {
    if let Ok(mut guard) = state.lock() {
        *guard = next;
    }
}

fn emit(events: &TransportTx, event: TransportEvent) {
    if events.send(event).is_err() {
        tracing::debug!("transport event dropped: listener gone");
    }
}

async fn run_connection(
    ws_url: String,
    session_cookie: Option<SecretString>,
    events: TransportTx,
    state: Arc<Mutex<LinkState>>,
    stats: Arc<Mutex<Stats>>,
    mut out_rx: mpsc::Receiver<Outbound>,
) {
    let request = match utils::build_request(&ws_url, session_cookie.as_ref()) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!("failed to build request for {}: {}", ws_url, e);
            fail(&events, &state, TransportError::Request(e));
            return;
        }
    };

    let ws_stream = match tokio_tungstenite::connect_async(request).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            tracing::error!("failed to connect to {}: {}", ws_url, e);
            fail(&events, &state, TransportError::Handshake(e));
            return;
        }
    };

    let closing_early = state
        .lock()
        .map(|s| *s == LinkState::Closing)
        .unwrap_or(false);
    let (mut write, mut read) = ws_stream.split();
    if closing_early {
        let _ = write.send(Message::Close(None)).await;
        set_state(&state, LinkState::Closed);
        emit(&events, TransportEvent::Close { reason: None });
        return;
    }

    set_state(&state, LinkState::Open);
    tracing::info!("connected to {}", ws_url);
    emit(&events, TransportEvent::Open);

    let writer_stats = stats.clone();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            let (message, is_close) = match outbound {
                Outbound::Text(text) => (Message::Text(text), false),
                Outbound::Binary(bytes) => (Message::Binary(bytes), false),
                Outbound::Close => (Message::Close(None), true),
            };
            let is_text = matches!(message, Message::Text(_));
            if let Err(e) = write.send(message).await {
                tracing::error!("failed to send message: {}", e);
                continue;
            }
            if let Ok(mut stats_guard) = writer_stats.lock() {
                if is_text {
                    stats_guard.record_text_sent();
                } else if !is_close {
                    stats_guard.record_audio_sent();
                }
            }
            if is_close {
                break;
            }
        }
    });

    let mut reason = None;
    while let Some(message) = read.next().await {
        let message = match message {
            Err(e) => {
                tracing::error!("failed to read message: {}", e);
                emit(
                    &events,
                    TransportEvent::Error(Arc::new(TransportError::Connection(e))),
                );
                break;
            }
            Ok(message) => message,
        };
        match message {
            Message::Text(text) => {
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
                    let event_type = json.get("type").and_then(|v| v.as_str());
                    tracing::debug!("received message: {}", event_type.unwrap_or("unknown"));
                }
                match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(server_message) => {
                        if let Ok(mut stats_guard) = stats.lock() {
                            stats_guard.record_text_received();
                        }
                        emit(&events, TransportEvent::Server(server_message));
                    }
                    Err(e) => {
                        if let Ok(mut stats_guard) = stats.lock() {
                            stats_guard.record_malformed();
                        }
                        tracing::error!("failed to deserialize message: {}, text=> {:?}", e, text);
                    }
                }
            }
            Message::Binary(bin) => {
                tracing::debug!("received audio frame: {} bytes", bin.len());
                if let Ok(mut stats_guard) = stats.lock() {
                    stats_guard.record_audio_received();
                }
                emit(&events, TransportEvent::Audio(bin));
            }
            Message::Close(frame) => {
                tracing::info!("connection closed: {:?}", frame);
                reason = frame.map(|f| f.reason.to_string());
                break;
            }
            _ => {}
        }
    }

    writer.abort();
    set_state(&state, LinkState::Closed);
    emit(&events, TransportEvent::Close { reason });
}

fn fail(events: &TransportTx, state: &Mutex<LinkState>, error: TransportError) {
    set_state(state, LinkState::Closed);
    emit(events, TransportEvent::Error(Arc::new(error)));
    emit(events, TransportEvent::Close { reason: None });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::*;

    fn test_client() -> (Client, TransportRx) {
        let config = Config::builder()
            .with_ws_url("ws://127.0.0.1:9/ws")
            .build()
            .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        (Client::new(&config, tx), rx)
    }

    #[test]
    fn test_send_before_connect_is_dropped() {
        let (mut client, mut rx) = test_client();
        client.send(ClientMessage::InterruptStarted);
        client.send_audio(vec![1, 2, 3]);

        let stats = client.stats().unwrap();
        assert_eq!(stats.dropped_sends(), 2);
        assert_eq!(stats.text_sent(), 0);
        assert!(rx.try_recv().is_err(), "dropped sends must not raise events");
    }

    #[tokio::test]
    async fn test_failed_handshake_surfaces_error_then_close() {
        let (mut client, mut rx) = test_client();
        client.connect();
        assert_eq!(client.state(), LinkState::Connecting);

        // A second call while pending is ignored.
        client.connect();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, TransportEvent::Error(_)), "got {:?}", first);
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, TransportEvent::Close { .. }), "got {:?}", second);
        assert_eq!(client.state(), LinkState::Closed);
        assert!(rx.try_recv().is_err(), "only one connection attempt expected");
    }

    async fn next_event(rx: &mut TransportRx) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("transport event channel closed")
    }

    #[tokio::test]
    async fn test_frames_from_server_become_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            // Nothing is sent until the client has written after open.
            let mut received = Vec::new();
            while received.len() < 2 {
                match ws.next().await {
                    Some(Ok(message)) => received.push(message),
                    other => panic!("client went away: {:?}", other),
                }
            }

            for message in [
                Message::Text(r#"{"type":"reading_started"}"#.to_string()),
                Message::Text("not json".to_string()),
                Message::Text(r#"{"type":"reading_rewound"}"#.to_string()),
                Message::Binary(Vec::new()),
                Message::Binary(vec![1, 2, 3]),
                Message::Close(None),
            ] {
                ws.send(message).await.unwrap();
            }
            received
        });

        let config = Config::builder()
            .with_ws_url(&format!("ws://{}/ws", addr))
            .build()
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut client = Client::new(&config, tx);
        client.connect();

        assert!(matches!(next_event(&mut rx).await, TransportEvent::Open));
        assert_eq!(client.state(), LinkState::Open);
        client.send(ClientMessage::PauseReading);
        client.send_audio(vec![7, 7]);

        let event = next_event(&mut rx).await;
        assert!(
            matches!(event, TransportEvent::Server(ServerMessage::ReadingStarted)),
            "got {:?}",
            event
        );
        let event = next_event(&mut rx).await;
        assert!(
            matches!(&event, TransportEvent::Audio(bytes) if bytes.is_empty()),
            "got {:?}",
            event
        );
        let event = next_event(&mut rx).await;
        assert!(
            matches!(&event, TransportEvent::Audio(bytes) if bytes == &[1, 2, 3]),
            "got {:?}",
            event
        );
        let event = next_event(&mut rx).await;
        assert!(matches!(event, TransportEvent::Close { reason: None }), "got {:?}", event);

        let received = server.await.unwrap();
        match &received[0] {
            Message::Text(text) => {
                let json: serde_json::Value = serde_json::from_str(text).unwrap();
                assert_eq!(json["type"], "pause_reading");
            }
            other => panic!("expected pause_reading, got {:?}", other),
        }
        assert_eq!(received[1], Message::Binary(vec![7, 7]));

        let stats = client.stats().unwrap();
        assert_eq!(stats.malformed_received(), 2);
        assert_eq!(stats.text_received(), 1);
        assert_eq!(stats.audio_received(), 2);
        assert_eq!(client.state(), LinkState::Closed);
        assert!(rx.try_recv().is_err());
    }
}
