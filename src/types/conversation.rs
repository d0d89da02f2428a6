//! Conversation Summary Structure
//!
//! One entry per conversation partner, used by the inbox view. The summary
//! list is kept most-recently-active-first by the timeline store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;
use super::user::UserRef;

/// Canonical two-party conversation id: the two participant ids sorted
/// lexicographically and concatenated. Read-receipt events address
/// conversations by this derivation, so it must stay byte-stable.
pub fn conversation_key(a: Uuid, b: Uuid) -> String {
    let (a, b) = (a.to_string(), b.to_string());
    if a <= b {
        format!("{}{}", a, b)
    } else {
        format!("{}{}", b, a)
    }
}

/// Snapshot of the most recent message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastMessage {
    /// Preview text (message text or attachment label)
    pub preview: String,
    pub at: DateTime<Utc>,
    /// Whether the local user sent it
    pub from_local: bool,
}

/// Summary entry for one conversation partner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    /// Canonical conversation id (see [`conversation_key`])
    pub id: String,
    /// The other participant
    pub peer: UserRef,
    /// Snapshot of the last message, for list previews
    pub last_message: Option<LastMessage>,
    pub unread_count: u32,
}

impl Conversation {
    /// Create a summary for a peer with no messages yet
    pub fn new(local_user: Uuid, peer: UserRef) -> Self {
        Self {
            id: conversation_key(local_user, peer.id),
            peer,
            last_message: None,
            unread_count: 0,
        }
    }

    /// Update the last-message snapshot from a timeline entry
    pub fn update_last_message(&mut self, message: &Message) {
        self.last_message = Some(LastMessage {
            preview: message.preview(),
            at: message.created_at,
            from_local: message.sender.is_local(),
        });
    }
}
