//! Message Data Structures
//!
//! Represents a message in a two-party conversation, plus the wire payload
//! shape exchanged with the server.
//!
//! A message is keyed to its conversation by the *other* participant's id
//! from the local user's perspective. Before server confirmation a message
//! carries a client-generated temporary id (`pending = true`) used solely for
//! reconciliation against the confirmed copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who sent a message, resolved from the local user's perspective.
///
/// Outgoing messages are `Local` from the moment they are synthesized, so no
/// placeholder sender id ever flows through the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "side", rename_all = "snake_case")]
pub enum Sender {
    /// The authenticated local user
    Local,
    /// The other party
    Remote { id: Uuid },
}

impl Sender {
    /// Whether this message was sent by the local user
    pub fn is_local(&self) -> bool {
        matches!(self, Sender::Local)
    }

    /// Resolve to a concrete user id
    pub fn resolve(&self, local_user: Uuid) -> Uuid {
        match self {
            Sender::Local => local_user,
            Sender::Remote { id } => *id,
        }
    }
}

/// Kind of media attached to a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
}

impl AttachmentKind {
    /// Printable label used in conversation previews
    pub fn label(&self) -> &'static str {
        match self {
            AttachmentKind::Image => "Photo",
            AttachmentKind::Video => "Video",
        }
    }
}

/// Media attachment reference with optionally known dimensions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    /// CDN URL once uploaded, or a local preview reference while pending
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// An attachment about to be sent: the uploaded reference goes to the
/// server, the local preview (when present) is what the timeline shows until
/// the confirmed copy arrives.
#[derive(Debug, Clone)]
pub struct OutgoingAttachment {
    pub kind: AttachmentKind,
    /// Reference the server will store (upload result)
    pub upload_ref: String,
    /// Device-local reference shown before upload completes
    pub local_preview: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl OutgoingAttachment {
    /// The attachment as it should appear in the optimistic timeline entry
    pub fn preview_attachment(&self) -> Attachment {
        Attachment {
            kind: self.kind,
            url: self
                .local_preview
                .clone()
                .unwrap_or_else(|| self.upload_ref.clone()),
            width: self.width,
            height: self.height,
        }
    }

    /// The attachment as it should be sent to the server
    pub fn upload_attachment(&self) -> Attachment {
        Attachment {
            kind: self.kind,
            url: self.upload_ref.clone(),
            width: self.width,
            height: self.height,
        }
    }
}

/// A message in a two-party conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Stable server id, or a temporary client id while `pending`
    pub id: Uuid,
    pub sender: Sender,
    /// The receiving user's id
    pub receiver: Uuid,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    /// True until the server has confirmed this message
    pub pending: bool,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    /// Tombstone flag: content removed, record retained
    pub is_deleted: bool,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Synthesize the optimistic local entry for an outgoing message
    pub fn outgoing(
        receiver: Uuid,
        text: Option<String>,
        attachment: Option<&OutgoingAttachment>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: Sender::Local,
            receiver,
            text,
            attachment: attachment.map(OutgoingAttachment::preview_attachment),
            created_at: Utc::now(),
            pending: true,
            is_edited: false,
            edited_at: None,
            is_deleted: false,
            read: false,
            read_at: None,
            delivered_at: None,
        }
    }

    /// The conversation partner's id from the local user's perspective
    pub fn peer_id(&self) -> Uuid {
        match self.sender {
            Sender::Local => self.receiver,
            Sender::Remote { id } => id,
        }
    }

    /// Preview label for conversation summaries: the text when present,
    /// otherwise the attachment kind label.
    pub fn preview(&self) -> String {
        if self.is_deleted {
            return "Message deleted".to_string();
        }
        match (&self.text, &self.attachment) {
            (Some(text), _) if !text.is_empty() => text.clone(),
            (_, Some(att)) => att.kind.label().to_string(),
            _ => String::new(),
        }
    }

    /// Whether an inbound echo matches this (pending) entry by content:
    /// same text and same attachment reference.
    pub fn matches_content(&self, other: &Message) -> bool {
        let text_matches = self.text.as_deref().unwrap_or("") == other.text.as_deref().unwrap_or("");
        let attachment_matches = match (&self.attachment, &other.attachment) {
            (Some(a), Some(b)) => a.url == b.url,
            (None, None) => true,
            _ => false,
        };
        text_matches && attachment_matches
    }

    /// Replace content with a tombstone marker
    pub fn tombstone(&mut self) {
        self.is_deleted = true;
        self.text = None;
        self.attachment = None;
    }
}

/// Message as serialized on the wire (API responses and stream pushes).
///
/// The server addresses both sides by id; `into_message` resolves the sender
/// side against the local user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePayload {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl MessagePayload {
    /// Resolve the wire payload into a domain message from the local user's
    /// perspective. Server-confirmed payloads are never pending.
    pub fn into_message(self, local_user: Uuid) -> Message {
        let sender = if self.sender_id == local_user {
            Sender::Local
        } else {
            Sender::Remote { id: self.sender_id }
        };
        Message {
            id: self.id,
            sender,
            receiver: self.receiver_id,
            text: self.text,
            attachment: self.attachment,
            created_at: self.created_at,
            pending: false,
            is_edited: self.is_edited,
            edited_at: self.edited_at,
            is_deleted: self.is_deleted,
            read: self.read,
            read_at: self.read_at,
            delivered_at: self.delivered_at,
        }
    }
}
