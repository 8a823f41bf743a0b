// Inbound frame routing. Every text frame from the socket lands here;
// each parsed frame mutates exactly one piece of session state, and the
// only traffic generated in response is the pong reply to a server ping.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use log::{debug, error, warn};
use once_cell::sync::OnceCell;
use tokio::sync::mpsc;

use crate::models::{ChatMessage, ConnectionStatus, Notification};

use super::conversation::{ConversationKey, ConversationStore};
use super::presence::PresenceSet;
use super::protocol::{ClientFrame, MessagePayload, ServerFrame};
use super::typing::TypingTracker;
use super::unread::UnreadCounters;

/// Routes parsed frames into the session's trackers. Cheap to clone; all
/// state is shared with the owning client.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    pub self_id: Arc<OnceCell<u64>>,
    pub status: Arc<Mutex<ConnectionStatus>>,
    pub conversations: Arc<Mutex<ConversationStore>>,
    pub presence: Arc<Mutex<PresenceSet>>,
    pub typing: TypingTracker,
    pub unread: Arc<Mutex<UnreadCounters>>,
    pub notifications: mpsc::Sender<Notification>,
}

impl Dispatcher {
    /// Parse and route one raw text frame. Returns the reply frame to send,
    /// if any. Malformed frames are logged and dropped; they never take the
    /// connection down.
    pub fn handle_text(&self, text: &str) -> Option<ClientFrame> {
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(frame) => self.handle_frame(frame),
            Err(e) => {
                warn!("Discarding malformed frame: {}", e);
                None
            }
        }
    }

    pub fn handle_frame(&self, frame: ServerFrame) -> Option<ClientFrame> {
        // Until the authenticated identity is resolved, conversation keys
        // and own-message detection are meaningless, so nothing dispatches.
        let self_id = match self.self_id.get() {
            Some(id) => *id,
            None => {
                debug!("Identity not resolved yet, dropping inbound frame");
                return None;
            }
        };

        match frame {
            ServerFrame::PrivateMessage {
                from,
                to,
                content,
                message_id,
                timestamp,
                data,
            } => {
                let key = ConversationKey::private(from, to);
                self.store_message(
                    key,
                    ChatMessage {
                        id: message_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                        content: frame_content(content, data),
                        sender_id: from,
                        recipient_id: Some(to),
                        group_id: None,
                        timestamp: timestamp.unwrap_or_else(Utc::now),
                        is_own: from == self_id,
                        read_at: None,
                    },
                    self_id,
                );
            }
            ServerFrame::GroupMessage {
                from,
                group_id,
                content,
                message_id,
                timestamp,
                data,
            } => {
                let key = ConversationKey::group(group_id);
                self.store_message(
                    key,
                    ChatMessage {
                        id: message_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                        content: frame_content(content, data),
                        sender_id: from,
                        recipient_id: None,
                        group_id: Some(group_id),
                        timestamp: timestamp.unwrap_or_else(Utc::now),
                        is_own: from == self_id,
                        read_at: None,
                    },
                    self_id,
                );
            }
            ServerFrame::Typing {
                from,
                to,
                group_id,
                data,
            } => {
                if from == self_id {
                    return None;
                }
                let Some(key) = ConversationKey::resolve(Some(from), to, group_id) else {
                    warn!("Typing frame from {} with no resolvable conversation", from);
                    return None;
                };
                if data.is_typing {
                    self.typing.started(key, from);
                } else {
                    self.typing.stopped(key, from);
                }
            }
            ServerFrame::ReadStatus {
                from,
                to,
                timestamp,
                data,
            } => {
                let reader = data.and_then(|d| d.read_by).unwrap_or(from);
                if reader == self_id {
                    // Our own read ack echoed back; nothing to stamp.
                    return None;
                }
                let key = ConversationKey::private(from, to);
                let read_at = timestamp.unwrap_or_else(Utc::now);
                if let Ok(mut conversations) = self.conversations.lock() {
                    let stamped = conversations.stamp_read(&key, read_at);
                    debug!("Peer {} read {}: stamped {} messages", reader, key, stamped);
                }
            }
            ServerFrame::UserOnline { data } => {
                if let Ok(mut presence) = self.presence.lock() {
                    if presence.set_online(data.user_id) {
                        debug!("User {} came online", data.user_id);
                    }
                }
            }
            ServerFrame::UserOffline { data } => {
                if let Ok(mut presence) = self.presence.lock() {
                    if presence.set_offline(data.user_id) {
                        debug!("User {} went offline", data.user_id);
                    }
                }
            }
            ServerFrame::UserList { data } => {
                if let Ok(mut presence) = self.presence.lock() {
                    debug!("Presence snapshot: {} users online", data.online_users.len());
                    presence.replace(data.online_users);
                }
            }
            ServerFrame::Notification { data } => {
                debug!("Forwarding {} notification {}", data.kind, data.id);
                if let Err(e) = self.notifications.try_send(data) {
                    error!("Failed to forward notification: {}", e);
                }
            }
            ServerFrame::Error { content } => {
                let message = content.unwrap_or_else(|| "server reported an error".to_string());
                warn!("Server error frame: {}", message);
                if let Ok(mut status) = self.status.lock() {
                    status.error = Some(message);
                }
            }
            ServerFrame::Ping => {
                return Some(ClientFrame::Pong {
                    timestamp: Utc::now(),
                });
            }
            ServerFrame::Pong => {
                // Liveness confirmation only.
            }
            ServerFrame::Unknown => {
                warn!("Ignoring frame of unknown kind");
            }
        }
        None
    }

    fn store_message(&self, key: ConversationKey, message: ChatMessage, self_id: u64) {
        let from_peer = message.sender_id != self_id;
        debug!("Message {} appended to {}", message.id, key);
        if let Ok(mut conversations) = self.conversations.lock() {
            conversations.append(key, message);
        }
        if from_peer {
            if let Ok(mut unread) = self.unread.lock() {
                unread.increment(key);
            }
        }
    }
}

fn frame_content(content: Option<String>, data: Option<MessagePayload>) -> String {
    content
        .or_else(|| data.and_then(|d| d.message))
        .unwrap_or_default()
}
