// Connection supervision: owns the WebSocket, drives the
// connect / connected / reconnect lifecycle, and is the only place that
// writes to the socket sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::{Sink, SinkExt, StreamExt};
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::models::{ConnectionState, ConnectionStatus};

use super::dispatch::Dispatcher;
use super::identity;
use super::outbound::OutboundQueue;
use super::protocol::ClientFrame;
use super::RealtimeError;

pub(crate) const MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub(crate) const RECONNECT_BASE: Duration = Duration::from_secs(3);
pub(crate) const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

const RELOAD_MESSAGE: &str = "connection lost, please reload to reconnect";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Derive the realtime socket endpoint from the HTTP API base URL.
pub fn websocket_url(api_base: &str) -> Result<String, RealtimeError> {
    let base = api_base.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        return Err(RealtimeError::InvalidBaseUrl(api_base.to_string()));
    };
    Ok(format!("{}/ws", ws_base))
}

/// What to do after an abnormal close or failed connect attempt.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CloseOutcome {
    Retry { attempt: u32, delay: Duration },
    GiveUp,
}

pub(crate) fn mark_connecting(status: &Mutex<ConnectionStatus>) {
    if let Ok(mut status) = status.lock() {
        status.state = ConnectionState::Connecting;
    }
}

pub(crate) fn mark_connected(status: &Mutex<ConnectionStatus>) {
    if let Ok(mut status) = status.lock() {
        status.state = ConnectionState::Connected;
        status.error = None;
        status.reconnect_attempts = 0;
    }
}

pub(crate) fn record_error(status: &Mutex<ConnectionStatus>, message: String) {
    if let Ok(mut status) = status.lock() {
        status.error = Some(message);
    }
}

/// Reset to a clean disconnected state, as after an intentional disconnect.
pub(crate) fn reset_status(status: &Mutex<ConnectionStatus>) {
    if let Ok(mut status) = status.lock() {
        *status = ConnectionStatus::default();
    }
}

/// Advance the reconnect bookkeeping after a close that was not asked for.
/// Attempt 5 is terminal: the status becomes `Failed` and no further retry
/// is scheduled.
pub(crate) fn note_abnormal_close(status: &Mutex<ConnectionStatus>) -> CloseOutcome {
    match status.lock() {
        Ok(mut status) => {
            status.reconnect_attempts += 1;
            if status.reconnect_attempts >= MAX_RECONNECT_ATTEMPTS {
                status.state = ConnectionState::Failed;
                status.error = Some(RELOAD_MESSAGE.to_string());
                CloseOutcome::GiveUp
            } else {
                let attempt = status.reconnect_attempts;
                status.state = ConnectionState::Disconnected;
                status.error = Some(format!(
                    "reconnecting ({}/{})",
                    attempt, MAX_RECONNECT_ATTEMPTS
                ));
                CloseOutcome::Retry {
                    attempt,
                    delay: RECONNECT_BASE * attempt,
                }
            }
        }
        Err(_) => CloseOutcome::GiveUp,
    }
}

/// The supervisor task. One instance runs per `connect()` call, looping
/// through connect / drive / backoff until shut down or out of attempts.
pub(crate) struct Supervisor {
    pub ws_url: String,
    pub api_base: String,
    pub token: String,
    pub self_id: Arc<OnceCell<u64>>,
    pub status: Arc<Mutex<ConnectionStatus>>,
    pub outbound: Arc<Mutex<OutboundQueue>>,
    pub live_tx: Arc<Mutex<Option<mpsc::Sender<ClientFrame>>>>,
    pub dispatcher: Dispatcher,
    pub shutdown: Arc<Notify>,
    pub shutting_down: Arc<AtomicBool>,
}

impl Supervisor {
    pub async fn run(self) {
        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                reset_status(&self.status);
                break;
            }

            self.resolve_identity().await;
            mark_connecting(&self.status);
            info!("Connecting to {}", self.ws_url);

            let stream = tokio::select! {
                _ = self.shutdown.notified() => {
                    reset_status(&self.status);
                    break;
                }
                result = connect_async(self.ws_url.as_str()) => match result {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        error!("WebSocket connect failed: {}", e);
                        record_error(&self.status, format!("connection error: {}", e));
                        if self.backoff_or_stop().await {
                            continue;
                        }
                        break;
                    }
                }
            };

            let normal_close = self.drive(stream).await;
            self.release_sender();

            if normal_close || self.shutting_down.load(Ordering::SeqCst) {
                reset_status(&self.status);
                break;
            }
            if !self.backoff_or_stop().await {
                break;
            }
        }
        debug!("Connection supervisor stopped");
    }

    /// Fetch the authenticated identity if it has not been resolved yet.
    /// Dispatch stays suspended until this succeeds; the connection itself
    /// is still attempted so a later retry can pick the identity up.
    async fn resolve_identity(&self) {
        if self.self_id.get().is_some() {
            return;
        }
        match identity::fetch_current_user(&self.api_base, &self.token).await {
            Ok(user) => {
                info!("Authenticated as {} (id {})", user.username, user.id);
                let _ = self.self_id.set(user.id);
            }
            Err(e) => {
                error!("Failed to resolve identity, inbound dispatch suspended: {}", e);
            }
        }
    }

    /// Decide what happens after an abnormal close. Returns true when a
    /// retry is due (after sleeping out the backoff), false when the
    /// supervisor should stop.
    async fn backoff_or_stop(&self) -> bool {
        match note_abnormal_close(&self.status) {
            CloseOutcome::GiveUp => {
                warn!(
                    "Giving up after {} reconnect attempts",
                    MAX_RECONNECT_ATTEMPTS
                );
                false
            }
            CloseOutcome::Retry { attempt, delay } => {
                info!(
                    "Reconnecting in {:?} (attempt {}/{})",
                    delay, attempt, MAX_RECONNECT_ATTEMPTS
                );
                tokio::select! {
                    _ = self.shutdown.notified() => {
                        reset_status(&self.status);
                        false
                    }
                    _ = tokio::time::sleep(delay) => true,
                }
            }
        }
    }

    /// Run one live connection to completion. Returns true if the close was
    /// intentional (shutdown requested), false for any abnormal end.
    async fn drive(&self, stream: WsStream) -> bool {
        let (mut sink, mut reader) = stream.split();

        // Install the live sender before flushing so concurrent sends line
        // up in the channel behind the queued backlog instead of racing it.
        let (tx, mut rx) = mpsc::channel::<ClientFrame>(256);
        if let Ok(mut slot) = self.live_tx.lock() {
            *slot = Some(tx);
        }
        mark_connected(&self.status);
        info!("Realtime connection established");

        let backlog = match self.outbound.lock() {
            Ok(mut queue) => queue.drain(),
            Err(_) => Vec::new(),
        };
        if !backlog.is_empty() {
            info!("Flushing {} queued frames", backlog.len());
            if let Err(leftover) = flush_frames(&mut sink, backlog).await {
                if let Ok(mut queue) = self.outbound.lock() {
                    queue.requeue_front(leftover);
                }
                return false;
            }
        }

        let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    let close = Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    }));
                    if let Err(e) = sink.send(close).await {
                        debug!("Close frame not delivered: {}", e);
                    }
                    return true;
                }
                _ = heartbeat.tick() => {
                    let ping = ClientFrame::Ping { timestamp: Utc::now() };
                    if let Err(e) = send_frame(&mut sink, &ping).await {
                        error!("Heartbeat failed: {}", e);
                        return false;
                    }
                }
                outgoing = rx.recv() => match outgoing {
                    Some(frame) => {
                        if let Err(e) = send_frame(&mut sink, &frame).await {
                            error!("Send failed: {}", e);
                            if let Ok(mut queue) = self.outbound.lock() {
                                queue.requeue_front(vec![frame]);
                            }
                            return false;
                        }
                    }
                    // All senders dropped; nothing further can be sent.
                    None => return false,
                },
                inbound = reader.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = self.dispatcher.handle_text(&text) {
                            if let Err(e) = send_frame(&mut sink, &reply).await {
                                error!("Failed to send reply frame: {}", e);
                                return false;
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("Server closed the connection: {:?}", frame);
                        return false;
                    }
                    // Binary frames and protocol-level ping/pong, which
                    // tungstenite answers on its own.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        record_error(&self.status, format!("connection error: {}", e));
                        return false;
                    }
                    None => {
                        info!("WebSocket stream ended");
                        return false;
                    }
                },
            }
        }
    }

    /// Clear the live sender slot, but only if it still holds the sender
    /// this supervisor installed; a newer session may already own the slot.
    fn release_sender(&self) {
        if let Ok(mut slot) = self.live_tx.lock() {
            let stale = match slot.as_ref() {
                Some(tx) => tx.is_closed(),
                None => false,
            };
            if stale {
                *slot = None;
            }
        }
    }
}

async fn send_frame<S, E>(sink: &mut S, frame: &ClientFrame) -> Result<(), E>
where
    S: Sink<Message, Error = E> + Unpin,
{
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode outbound frame: {}", e);
            return Ok(());
        }
    };
    sink.send(Message::Text(text)).await
}

/// Transmit queued frames strictly in order. On failure the unsent tail
/// (including the frame that failed) is handed back for requeueing.
async fn flush_frames<S, E>(sink: &mut S, frames: Vec<ClientFrame>) -> Result<(), Vec<ClientFrame>>
where
    S: Sink<Message, Error = E> + Unpin,
    E: std::fmt::Display,
{
    let mut pending = frames.into_iter();
    while let Some(frame) = pending.next() {
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode queued frame: {}", e);
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text)).await {
            error!("Failed to flush queued frame: {}", e);
            let mut leftover = vec![frame];
            leftover.extend(pending);
            return Err(leftover);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_substitutes_scheme_and_appends_path() {
        assert_eq!(
            websocket_url("http://localhost:8000").unwrap(),
            "ws://localhost:8000/ws"
        );
        assert_eq!(
            websocket_url("https://api.example.com/").unwrap(),
            "wss://api.example.com/ws"
        );
    }

    #[test]
    fn websocket_url_rejects_unknown_schemes() {
        assert!(websocket_url("ftp://example.com").is_err());
        assert!(websocket_url("example.com").is_err());
    }

    #[test]
    fn reconnect_backs_off_linearly_then_gives_up() {
        let status = Mutex::new(ConnectionStatus::default());

        for attempt in 1..MAX_RECONNECT_ATTEMPTS {
            match note_abnormal_close(&status) {
                CloseOutcome::Retry { attempt: n, delay } => {
                    assert_eq!(n, attempt);
                    assert_eq!(delay, RECONNECT_BASE * attempt);
                }
                CloseOutcome::GiveUp => panic!("gave up too early on attempt {}", attempt),
            }
            let snapshot = status.lock().unwrap().clone();
            assert_eq!(snapshot.state, ConnectionState::Disconnected);
            assert_eq!(
                snapshot.error.as_deref(),
                Some(format!("reconnecting ({}/5)", attempt).as_str())
            );
        }

        // The fifth consecutive abnormal close is terminal.
        assert_eq!(note_abnormal_close(&status), CloseOutcome::GiveUp);
        let snapshot = status.lock().unwrap().clone();
        assert_eq!(snapshot.state, ConnectionState::Failed);
        assert!(snapshot.error.is_some());

        // And stays terminal.
        assert_eq!(note_abnormal_close(&status), CloseOutcome::GiveUp);
    }

    #[test]
    fn successful_open_resets_the_attempt_counter() {
        let status = Mutex::new(ConnectionStatus::default());
        note_abnormal_close(&status);
        note_abnormal_close(&status);
        mark_connected(&status);

        let snapshot = status.lock().unwrap().clone();
        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert_eq!(snapshot.reconnect_attempts, 0);
        assert!(snapshot.error.is_none());

        // A fresh run of failures starts counting from one again.
        match note_abnormal_close(&status) {
            CloseOutcome::Retry { attempt, .. } => assert_eq!(attempt, 1),
            CloseOutcome::GiveUp => panic!("should retry after a successful open"),
        }
    }

    #[tokio::test]
    async fn flush_preserves_enqueue_order() {
        let (mut tx, mut rx) = futures::channel::mpsc::unbounded::<Message>();
        let frames: Vec<ClientFrame> = ["m1", "m2", "m3"]
            .iter()
            .map(|content| ClientFrame::PrivateMessage {
                to: 42,
                content: content.to_string(),
                timestamp: Utc::now(),
            })
            .collect();

        flush_frames(&mut tx, frames).await.expect("flush should succeed");

        let mut sent = Vec::new();
        while let Ok(Some(Message::Text(text))) = rx.try_next() {
            sent.push(text);
        }
        assert_eq!(sent.len(), 3);
        for (text, expected) in sent.iter().zip(["m1", "m2", "m3"]) {
            let value: serde_json::Value = serde_json::from_str(text).unwrap();
            assert_eq!(value["type"], "private_message");
            assert_eq!(value["to"], 42);
            assert_eq!(value["content"], expected);
        }
    }
}
