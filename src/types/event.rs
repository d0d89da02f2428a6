//! Real-time Event Types
//!
//! The closed set of events exchanged over the event-stream channel, plus the
//! engine-level notifications broadcast to the rendering layer. Inbound
//! payloads deserialize into exactly one `ServerEvent` variant and are
//! dispatched through a single typed handler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::MessagePayload;
use super::presence::OnlineStatus;

/// Server → client events pushed over the stream channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A new message in one of the local user's conversations (including
    /// echoes of the local user's own sends)
    NewMessage { message: MessagePayload },
    /// A message was edited by its author
    MessageEdited {
        id: Uuid,
        text: String,
        edited_at: DateTime<Utc>,
    },
    /// A message was deleted for everyone
    MessageDeleted { id: Uuid },
    /// The other party read the conversation
    MessagesRead {
        conversation_id: String,
        reader_id: Uuid,
    },
    /// A message the local user sent reached the recipient's device
    MessageDelivered {
        id: Uuid,
        delivered_at: DateTime<Utc>,
    },
    /// A user's online state changed
    UserStatus {
        user_id: Uuid,
        status: OnlineStatus,
        #[serde(default)]
        last_active: Option<DateTime<Utc>>,
    },
    /// Bulk snapshot of currently-online users, sent once after authenticate
    ActiveUsers { user_ids: Vec<Uuid> },
    /// A peer started typing to the local user
    TypingStart { sender_id: Uuid },
    /// A peer stopped typing
    TypingStop { sender_id: Uuid },
}

/// Client → server events sent over the stream channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Handshake: bind this connection to the local user
    Authenticate { user_id: Uuid },
    /// The local user started typing to a peer
    TypingStart { receiver_id: Uuid },
    /// The local user stopped typing
    TypingStop { receiver_id: Uuid },
}

/// Engine notifications broadcast to the rendering layer.
///
/// These are not wire events: they tell a reactive UI which snapshot to
/// re-read after the stores mutate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The timeline for this peer changed
    TimelineChanged { peer_id: Uuid },
    /// The conversation summary list changed (order, previews, unread)
    ConversationsChanged,
    /// Presence changed for a user
    PresenceChanged { user_id: Uuid },
    /// A peer's typing flag flipped
    TypingChanged { user_id: Uuid, typing: bool },
    /// Logical connection state changed
    ConnectionChanged { connected: bool },
    /// The stream re-established after a real (non-grace) drop; the active
    /// conversation should be re-fetched to heal any gap
    Reconnected,
}
