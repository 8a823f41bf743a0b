// Realtime session manager: one persistent WebSocket multiplexing private
// and group messages, typing indicators, read receipts, presence, and
// notifications.
//
// The embedding application owns exactly one `RealtimeClient` per
// authenticated session. All socket writes go through the client's send
// methods (queue-if-closed), all inbound traffic is routed by the
// dispatcher into the trackers, and the presentation layer only ever
// reads the trackers through the accessors here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::models::{ChatMessage, ConnectionStatus, Notification};

pub mod connection;
pub mod conversation;
mod dispatch;
pub mod identity;
pub mod outbound;
pub mod presence;
pub mod protocol;
pub mod typing;
pub mod unread;

pub use connection::websocket_url;
pub use conversation::ConversationKey;

use conversation::ConversationStore;
use dispatch::Dispatcher;
use outbound::OutboundQueue;
use presence::PresenceSet;
use protocol::{ClientFrame, TypingRequest};
use typing::TypingTracker;
use unread::UnreadCounters;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("invalid API base URL '{0}': expected an http:// or https:// scheme")]
    InvalidBaseUrl(String),
    #[error("identity request failed: {0}")]
    Identity(String),
}

/// Settings for one authenticated realtime session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP base of the backend API, e.g. `https://api.example.com`.
    /// The socket endpoint is derived from it by scheme substitution.
    pub api_base: String,
    /// Bearer token of the authenticated session.
    pub token: String,
}

/// One supervisor spawn. Holding the shutdown primitives per session keeps
/// a disconnect from leaking into a session started later.
struct SessionHandle {
    task: JoinHandle<()>,
    shutdown: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
}

pub struct RealtimeClient {
    config: ClientConfig,
    self_id: Arc<OnceCell<u64>>,
    status: Arc<Mutex<ConnectionStatus>>,
    conversations: Arc<Mutex<ConversationStore>>,
    presence: Arc<Mutex<PresenceSet>>,
    typing: TypingTracker,
    unread: Arc<Mutex<UnreadCounters>>,
    outbound: Arc<Mutex<OutboundQueue>>,
    live_tx: Arc<Mutex<Option<mpsc::Sender<ClientFrame>>>>,
    notifications_tx: mpsc::Sender<Notification>,
    session: Mutex<Option<SessionHandle>>,
}

impl RealtimeClient {
    /// Create a client and the receiving end of its notification sink.
    pub fn new(config: ClientConfig) -> (Self, mpsc::Receiver<Notification>) {
        let (notifications_tx, notifications_rx) = mpsc::channel(100);
        (
            RealtimeClient {
                config,
                self_id: Arc::new(OnceCell::new()),
                status: Arc::new(Mutex::new(ConnectionStatus::default())),
                conversations: Arc::new(Mutex::new(ConversationStore::new())),
                presence: Arc::new(Mutex::new(PresenceSet::new())),
                typing: TypingTracker::new(),
                unread: Arc::new(Mutex::new(UnreadCounters::new())),
                outbound: Arc::new(Mutex::new(OutboundQueue::new())),
                live_tx: Arc::new(Mutex::new(None)),
                notifications_tx,
                session: Mutex::new(None),
            },
            notifications_rx,
        )
    }

    /// Start (or restart) the connection supervisor. A no-op while a session
    /// is already connecting or connected, and when no token is configured.
    pub fn connect(&self) -> Result<(), RealtimeError> {
        if self.config.token.is_empty() {
            warn!("connect() ignored: no authenticated session");
            return Ok(());
        }

        let ws_url = connection::websocket_url(&self.config.api_base)?;

        let mut session = match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = session.as_ref() {
            if !handle.task.is_finished() && !handle.shutting_down.load(Ordering::SeqCst) {
                debug!("connect() ignored: session already active");
                return Ok(());
            }
        }

        let shutdown = Arc::new(Notify::new());
        let shutting_down = Arc::new(AtomicBool::new(false));
        let supervisor = connection::Supervisor {
            ws_url,
            api_base: self.config.api_base.clone(),
            token: self.config.token.clone(),
            self_id: Arc::clone(&self.self_id),
            status: Arc::clone(&self.status),
            outbound: Arc::clone(&self.outbound),
            live_tx: Arc::clone(&self.live_tx),
            dispatcher: self.dispatcher(),
            shutdown: Arc::clone(&shutdown),
            shutting_down: Arc::clone(&shutting_down),
        };
        let task = tokio::spawn(supervisor.run());
        *session = Some(SessionHandle {
            task,
            shutdown,
            shutting_down,
        });
        Ok(())
    }

    /// Tear the session down: close the socket with a normal closure, cancel
    /// the heartbeat and any pending reconnect, drop every live typing
    /// timer, and reset the visible status. Idempotent.
    pub fn disconnect(&self) {
        let handle = match self.session.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            info!("Disconnecting realtime session");
            handle.shutting_down.store(true, Ordering::SeqCst);
            handle.shutdown.notify_one();
        }
        self.typing.clear();
        connection::reset_status(&self.status);
    }

    // ---- outbound -------------------------------------------------------

    /// Send a private message. Returns true when the frame was handed to the
    /// live socket, false when it was queued for the next reconnect (the
    /// caller may fall back to a non-realtime path).
    pub fn send_private_message(&self, to: u64, content: &str) -> bool {
        self.send_frame(ClientFrame::PrivateMessage {
            to,
            content: content.to_string(),
            timestamp: Utc::now(),
        })
    }

    pub fn send_group_message(&self, group_id: u64, content: &str) -> bool {
        self.send_frame(ClientFrame::GroupMessage {
            group_id,
            content: content.to_string(),
            timestamp: Utc::now(),
        })
    }

    pub fn notify_typing_private(&self, to: u64, is_typing: bool) -> bool {
        self.send_frame(ClientFrame::Typing {
            to: Some(to),
            group_id: None,
            data: TypingRequest { is_typing },
            timestamp: Utc::now(),
        })
    }

    pub fn notify_typing_group(&self, group_id: u64, is_typing: bool) -> bool {
        self.send_frame(ClientFrame::Typing {
            to: None,
            group_id: Some(group_id),
            data: TypingRequest { is_typing },
            timestamp: Utc::now(),
        })
    }

    /// Tell the peer we have read their messages.
    pub fn send_read_receipt(&self, to: u64) -> bool {
        self.send_frame(ClientFrame::ReadStatus {
            to,
            timestamp: Utc::now(),
        })
    }

    /// Clear the local unread counter for a conversation, as when the
    /// presentation layer opens it.
    pub fn mark_conversation_read(&self, key: ConversationKey) {
        if let Ok(mut unread) = self.unread.lock() {
            unread.clear(&key);
        }
    }

    fn send_frame(&self, frame: ClientFrame) -> bool {
        if let Ok(slot) = self.live_tx.lock() {
            if let Some(tx) = slot.as_ref() {
                if tx.try_send(frame.clone()).is_ok() {
                    return true;
                }
            }
        }
        // Transport unavailable: hold the frame for the reconnect flush.
        if let Ok(mut queue) = self.outbound.lock() {
            queue.enqueue(frame);
            debug!("Transport closed, frame queued ({} pending)", queue.len());
        }
        false
    }

    // ---- read accessors -------------------------------------------------

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status
            .lock()
            .map(|status| status.clone())
            .unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_status().is_connected()
    }

    /// The authenticated user id, once resolved.
    pub fn self_id(&self) -> Option<u64> {
        self.self_id.get().copied()
    }

    pub fn messages(&self, key: ConversationKey) -> Vec<ChatMessage> {
        self.conversations
            .lock()
            .map(|store| store.messages(&key).to_vec())
            .unwrap_or_default()
    }

    pub fn unread_count(&self, key: ConversationKey) -> u32 {
        self.unread
            .lock()
            .map(|unread| unread.count(&key))
            .unwrap_or(0)
    }

    pub fn total_unread(&self) -> u32 {
        self.unread.lock().map(|unread| unread.total()).unwrap_or(0)
    }

    pub fn typing_users(&self, key: ConversationKey) -> Vec<u64> {
        self.typing.typing_users(&key)
    }

    pub fn is_online(&self, user_id: u64) -> bool {
        self.presence
            .lock()
            .map(|presence| presence.is_online(user_id))
            .unwrap_or(false)
    }

    pub fn online_users(&self) -> Vec<u64> {
        self.presence
            .lock()
            .map(|presence| presence.online_users())
            .unwrap_or_default()
    }

    /// Frames waiting for the next successful (re)connect.
    pub fn pending_outbound(&self) -> usize {
        self.outbound.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            self_id: Arc::clone(&self.self_id),
            status: Arc::clone(&self.status),
            conversations: Arc::clone(&self.conversations),
            presence: Arc::clone(&self.presence),
            typing: self.typing.clone(),
            unread: Arc::clone(&self.unread),
            notifications: self.notifications_tx.clone(),
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client() -> (RealtimeClient, mpsc::Receiver<Notification>) {
        RealtimeClient::new(ClientConfig {
            api_base: "http://localhost:8000".to_string(),
            token: "test-token".to_string(),
        })
    }

    #[tokio::test]
    async fn send_while_disconnected_queues_and_reports_deferral() {
        let (client, _rx) = offline_client();
        assert!(!client.send_private_message(42, "hi"));
        assert_eq!(client.pending_outbound(), 1);
        assert!(!client.send_group_message(7, "hello group"));
        assert_eq!(client.pending_outbound(), 2);
    }

    #[tokio::test]
    async fn mark_conversation_read_clears_the_counter() {
        let (client, _rx) = offline_client();
        let key = ConversationKey::private(1, 42);
        let dispatcher = client.dispatcher();
        client.self_id.set(1).unwrap();

        for _ in 0..5 {
            dispatcher
                .handle_text(r#"{"type":"private_message","from":42,"to":1,"content":"hey"}"#);
        }
        assert_eq!(client.unread_count(key), 5);

        client.mark_conversation_read(key);
        assert_eq!(client.unread_count(key), 0);
        // Messages themselves are untouched.
        assert_eq!(client.messages(key).len(), 5);
    }

    #[tokio::test]
    async fn accessors_default_to_empty_state() {
        let (client, _rx) = offline_client();
        let key = ConversationKey::group(3);
        assert!(client.messages(key).is_empty());
        assert_eq!(client.unread_count(key), 0);
        assert!(client.typing_users(key).is_empty());
        assert!(!client.is_online(9));
        assert!(client.online_users().is_empty());
        assert!(client.self_id().is_none());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn connect_without_a_token_is_a_no_op() {
        let (client, _rx) = RealtimeClient::new(ClientConfig {
            api_base: "http://localhost:8000".to_string(),
            token: String::new(),
        });
        client.connect().unwrap();
        assert!(client.session.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn connect_rejects_a_non_http_base_url() {
        let (client, _rx) = RealtimeClient::new(ClientConfig {
            api_base: "ldap://example.com".to_string(),
            token: "t".to_string(),
        });
        assert!(matches!(
            client.connect(),
            Err(RealtimeError::InvalidBaseUrl(_))
        ));
    }
}
