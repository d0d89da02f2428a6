//! Message Timeline Store
//!
//! Owns the per-peer message sequences (newest-first), the conversation
//! summary list, unread counters, and the single active-conversation marker.
//! Every mutating operation follows optimistic-apply, then request, then
//! confirm or roll back; inbound stream pushes reconcile through
//! [`MessageStore::add_received_message`].
//!
//! State lives behind one async mutex and is never held across a network
//! await: the store mutates, releases, performs the request, then re-locks to
//! reconcile. A stream echo and the HTTP response for the same optimistic
//! send can therefore interleave in either order; both paths converge on a
//! single confirmed entry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::{ChatApi, SendMessageBody};
use crate::error::{ChatError, ChatResult};
use crate::types::{
    conversation_key, Conversation, EngineEvent, Message, MessagePayload, OutgoingAttachment,
    UserRef,
};

struct TimelineState {
    /// Peer id -> newest-first message sequence
    timelines: HashMap<Uuid, Vec<Message>>,
    /// Most-recently-active-first summary list, at most one entry per peer
    conversations: Vec<Conversation>,
    /// Unread increments are suppressed for this peer while set
    active_peer: Option<Uuid>,
    unread_total: u32,
}

/// Client-side store for message timelines and the conversation index
pub struct MessageStore {
    local_user: Uuid,
    api: Arc<dyn ChatApi>,
    state: Mutex<TimelineState>,
    events: broadcast::Sender<EngineEvent>,
}

impl MessageStore {
    pub fn new(
        local_user: Uuid,
        api: Arc<dyn ChatApi>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            local_user,
            api,
            state: Mutex::new(TimelineState {
                timelines: HashMap::new(),
                conversations: Vec::new(),
                active_peer: None,
                unread_total: 0,
            }),
            events,
        }
    }

    pub fn local_user(&self) -> Uuid {
        self.local_user
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    // ── Sending ──

    /// Optimistically insert an outgoing message, then confirm it with the
    /// server. On failure the temporary entry is removed and the error
    /// returned; the conversation preview is not rolled back.
    pub async fn send_message(
        &self,
        peer: Uuid,
        text: Option<String>,
        attachment: Option<OutgoingAttachment>,
    ) -> ChatResult<Message> {
        let has_text = text.as_deref().map(|t| !t.trim().is_empty()).unwrap_or(false);
        if !has_text && attachment.is_none() {
            return Err(ChatError::EmptyMessage);
        }

        let temp = Message::outgoing(peer, text.clone(), attachment.as_ref());
        let temp_id = temp.id;
        {
            let mut state = self.state.lock().await;
            state.timelines.entry(peer).or_default().insert(0, temp.clone());
            Self::upsert_summary(&mut state, self.local_user, peer, &temp);
        }
        self.emit(EngineEvent::TimelineChanged { peer_id: peer });
        self.emit(EngineEvent::ConversationsChanged);

        let body = SendMessageBody {
            text,
            attachment: attachment.as_ref().map(OutgoingAttachment::upload_attachment),
        };
        match self.api.send_message(peer, body).await {
            Ok(payload) => {
                let confirmed = payload.into_message(self.local_user);
                let mut state = self.state.lock().await;
                let sequence = state.timelines.entry(peer).or_default();
                if sequence.iter().any(|m| m.id == confirmed.id) {
                    // Stream echo won the race; the temp entry is redundant.
                    sequence.retain(|m| m.id != temp_id);
                    debug!(peer = %peer, "send confirmed after stream echo, dropped temp entry");
                } else if let Some(pos) = sequence.iter().position(|m| m.id == temp_id) {
                    sequence[pos] = confirmed.clone();
                } else {
                    // Temp entry was cleared locally while in flight; do not
                    // reintroduce it.
                    debug!(peer = %peer, "send confirmed but temp entry is gone");
                }
                dedup_by_id(sequence);
                drop(state);
                self.emit(EngineEvent::TimelineChanged { peer_id: peer });
                Ok(confirmed)
            }
            Err(err) => {
                warn!(peer = %peer, error = %err, "send failed, rolling back temp entry");
                let mut state = self.state.lock().await;
                if let Some(sequence) = state.timelines.get_mut(&peer) {
                    sequence.retain(|m| m.id != temp_id);
                }
                drop(state);
                self.emit(EngineEvent::TimelineChanged { peer_id: peer });
                Err(err.into())
            }
        }
    }

    // ── Fetching ──

    /// Fetch one page of history. Page 1 replaces the sequence wholesale,
    /// later pages append; both paths re-deduplicate. Returns whether more
    /// pages exist.
    pub async fn fetch_messages(&self, peer: Uuid, page: u32) -> ChatResult<bool> {
        let fetched = self.api.messages(peer, page).await?;
        let has_more = fetched.has_more();
        let messages: Vec<Message> = fetched
            .messages
            .into_iter()
            .map(|p| p.into_message(self.local_user))
            .collect();

        let mut state = self.state.lock().await;
        let sequence = state.timelines.entry(peer).or_default();
        if page <= 1 {
            *sequence = messages;
        } else {
            sequence.extend(messages);
        }
        dedup_by_id(sequence);
        drop(state);
        self.emit(EngineEvent::TimelineChanged { peer_id: peer });
        Ok(has_more)
    }

    /// Replace the conversation summary list from the server.
    pub async fn load_conversations(&self) -> ChatResult<()> {
        let payloads = self.api.conversations().await?;
        let mut state = self.state.lock().await;
        state.conversations = payloads
            .into_iter()
            .map(|p| {
                let mut conv = Conversation::new(self.local_user, p.peer);
                conv.unread_count = p.unread_count;
                if let Some(last) = p.last_message {
                    let last = last.into_message(self.local_user);
                    conv.update_last_message(&last);
                }
                conv
            })
            .collect();
        drop(state);
        self.emit(EngineEvent::ConversationsChanged);
        Ok(())
    }

    /// Refresh the global unread counter from the server.
    pub async fn refresh_unread(&self) -> ChatResult<u32> {
        let count = self.api.unread_count().await?;
        let mut state = self.state.lock().await;
        state.unread_total = count;
        drop(state);
        self.emit(EngineEvent::ConversationsChanged);
        Ok(count)
    }

    // ── Inbound stream reconciliation ──

    /// Reconcile an inbound stream push into the owning peer's timeline.
    ///
    /// An echo of the local user's own pending send (matched by content)
    /// replaces that entry in place; anything else is prepended. Unread
    /// counters increment only for non-self messages in conversations other
    /// than the active one.
    pub async fn add_received_message(&self, payload: MessagePayload) {
        let message = payload.into_message(self.local_user);
        let peer = message.peer_id();
        let from_local = message.sender.is_local();

        let mut state = self.state.lock().await;
        let sequence = state.timelines.entry(peer).or_default();
        let pending_match = from_local
            .then(|| {
                sequence
                    .iter()
                    .position(|m| m.pending && m.matches_content(&message))
            })
            .flatten();
        match pending_match {
            Some(pos) => sequence[pos] = message.clone(),
            None => sequence.insert(0, message.clone()),
        }
        dedup_by_id(sequence);

        let counts_as_unread = !from_local && state.active_peer != Some(peer);
        if counts_as_unread {
            state.unread_total += 1;
        }
        Self::upsert_summary(&mut state, self.local_user, peer, &message);
        if counts_as_unread {
            if let Some(conv) = state.conversations.iter_mut().find(|c| c.peer.id == peer) {
                conv.unread_count += 1;
            }
        }
        drop(state);
        self.emit(EngineEvent::TimelineChanged { peer_id: peer });
        self.emit(EngineEvent::ConversationsChanged);
    }

    // ── Editing and deleting ──

    /// Optimistically edit a message, rolling the entry back if the server
    /// rejects the request.
    pub async fn edit_message(&self, id: Uuid, new_text: String) -> ChatResult<()> {
        let (peer, prior) = {
            let mut state = self.state.lock().await;
            let Some((peer, pos, sequence)) = locate_mut(&mut state, id) else {
                return Err(ChatError::UnknownMessage);
            };
            let prior = sequence[pos].clone();
            sequence[pos].text = Some(new_text.clone());
            sequence[pos].is_edited = true;
            sequence[pos].edited_at = Some(Utc::now());
            (peer, prior)
        };
        self.emit(EngineEvent::TimelineChanged { peer_id: peer });

        if let Err(err) = self.api.edit_message(id, &new_text).await {
            warn!(message = %id, error = %err, "edit failed, restoring entry");
            self.restore_entry(peer, prior).await;
            return Err(err.into());
        }
        Ok(())
    }

    /// Remove a message on this device only, reinserting it if the server
    /// rejects the request.
    pub async fn delete_message_for_me(&self, id: Uuid) -> ChatResult<()> {
        let (peer, pos, removed) = {
            let mut state = self.state.lock().await;
            let Some((peer, pos, sequence)) = locate_mut(&mut state, id) else {
                return Err(ChatError::UnknownMessage);
            };
            let removed = sequence.remove(pos);
            (peer, pos, removed)
        };
        self.emit(EngineEvent::TimelineChanged { peer_id: peer });

        if let Err(err) = self.api.delete_for_me(id).await {
            warn!(message = %id, error = %err, "delete-for-me failed, reinserting entry");
            let mut state = self.state.lock().await;
            let sequence = state.timelines.entry(peer).or_default();
            let at = pos.min(sequence.len());
            sequence.insert(at, removed);
            dedup_by_id(sequence);
            drop(state);
            self.emit(EngineEvent::TimelineChanged { peer_id: peer });
            return Err(err.into());
        }
        Ok(())
    }

    /// Replace a message with a tombstone for both parties, restoring the
    /// content if the server rejects the request. The peer's copy is removed
    /// by a mirrored `message_deleted` stream event.
    pub async fn delete_message_for_everyone(&self, id: Uuid) -> ChatResult<()> {
        let (peer, prior) = {
            let mut state = self.state.lock().await;
            let Some((peer, pos, sequence)) = locate_mut(&mut state, id) else {
                return Err(ChatError::UnknownMessage);
            };
            let prior = sequence[pos].clone();
            sequence[pos].tombstone();
            (peer, prior)
        };
        self.emit(EngineEvent::TimelineChanged { peer_id: peer });

        if let Err(err) = self.api.delete_for_everyone(id).await {
            warn!(message = %id, error = %err, "delete-for-everyone failed, restoring entry");
            self.restore_entry(peer, prior).await;
            return Err(err.into());
        }
        Ok(())
    }

    /// Mirror of a remote edit. Idempotent.
    pub async fn apply_remote_edit(
        &self,
        id: Uuid,
        text: String,
        edited_at: chrono::DateTime<Utc>,
    ) {
        let mut state = self.state.lock().await;
        let Some((peer, pos, sequence)) = locate_mut(&mut state, id) else {
            return;
        };
        let entry = &mut sequence[pos];
        if entry.is_edited && entry.text.as_deref() == Some(text.as_str()) {
            return;
        }
        entry.text = Some(text);
        entry.is_edited = true;
        entry.edited_at = Some(edited_at);
        drop(state);
        self.emit(EngineEvent::TimelineChanged { peer_id: peer });
    }

    /// Mirror of a remote delete-for-everyone. Idempotent against a local
    /// deletion already applied.
    pub async fn apply_remote_delete(&self, id: Uuid) {
        let mut state = self.state.lock().await;
        let Some((peer, pos, sequence)) = locate_mut(&mut state, id) else {
            return;
        };
        if sequence[pos].is_deleted {
            return;
        }
        sequence[pos].tombstone();
        drop(state);
        self.emit(EngineEvent::TimelineChanged { peer_id: peer });
    }

    /// Set the delivery timestamp on a message the local user sent.
    pub async fn apply_delivery(&self, id: Uuid, delivered_at: chrono::DateTime<Utc>) {
        let mut state = self.state.lock().await;
        let Some((peer, pos, sequence)) = locate_mut(&mut state, id) else {
            return;
        };
        if sequence[pos].delivered_at.is_some() {
            return;
        }
        sequence[pos].delivered_at = Some(delivered_at);
        drop(state);
        self.emit(EngineEvent::TimelineChanged { peer_id: peer });
    }

    // ── Read state ──

    /// Zero the conversation's unread counter, tell the server, and refresh
    /// the global counter.
    pub async fn mark_as_read(&self, peer: Uuid) -> ChatResult<()> {
        {
            let mut state = self.state.lock().await;
            if let Some(conv) = state.conversations.iter_mut().find(|c| c.peer.id == peer) {
                conv.unread_count = 0;
            }
        }
        self.emit(EngineEvent::ConversationsChanged);

        self.api.mark_read(peer).await?;
        if let Err(err) = self.refresh_unread().await {
            // The mark-read itself succeeded; a stale global counter heals on
            // the next refresh.
            warn!(error = %err, "unread-count refresh failed after mark-read");
        }
        Ok(())
    }

    /// The other party read the conversation: flip `read` on the local
    /// user's sent messages only. Conversations are matched by the canonical
    /// sorted-id key carried in the event.
    pub async fn apply_read_receipt(&self, conversation_id: &str) {
        let mut state = self.state.lock().await;
        let mut changed_peer = None;
        for (peer, sequence) in state.timelines.iter_mut() {
            if conversation_key(self.local_user, *peer) != conversation_id {
                continue;
            }
            let now = Utc::now();
            let mut changed = false;
            for message in sequence.iter_mut() {
                if message.sender.is_local() && !message.read {
                    message.read = true;
                    message.read_at = Some(now);
                    changed = true;
                }
            }
            if changed {
                changed_peer = Some(*peer);
            }
            break;
        }
        drop(state);
        if let Some(peer) = changed_peer {
            self.emit(EngineEvent::TimelineChanged { peer_id: peer });
        }
    }

    // ── History ──

    /// Empty the local sequence for a peer and request server-side deletion
    /// (device-scoped, not an unsend). Restored on failure.
    pub async fn clear_chat_history(&self, peer: Uuid) -> ChatResult<()> {
        let (removed_sequence, removed_summary) = {
            let mut state = self.state.lock().await;
            let sequence = state.timelines.remove(&peer).unwrap_or_default();
            let pos = state.conversations.iter().position(|c| c.peer.id == peer);
            let summary = pos.map(|p| {
                let conv = state.conversations.remove(p);
                state.unread_total = state.unread_total.saturating_sub(conv.unread_count);
                (p, conv)
            });
            (sequence, summary)
        };
        self.emit(EngineEvent::TimelineChanged { peer_id: peer });
        self.emit(EngineEvent::ConversationsChanged);

        if let Err(err) = self.api.clear_history(peer).await {
            warn!(peer = %peer, error = %err, "clear failed, restoring history");
            let mut state = self.state.lock().await;
            state.timelines.insert(peer, removed_sequence);
            if let Some((pos, conv)) = removed_summary {
                state.unread_total += conv.unread_count;
                let at = pos.min(state.conversations.len());
                state.conversations.insert(at, conv);
            }
            drop(state);
            self.emit(EngineEvent::TimelineChanged { peer_id: peer });
            self.emit(EngineEvent::ConversationsChanged);
            return Err(err.into());
        }
        Ok(())
    }

    // ── Active conversation ──

    /// Mark the conversation currently on screen (at most one). Must be
    /// cleared on navigation away so unread counts resume for that peer.
    pub async fn set_active_conversation(&self, peer: Option<Uuid>) {
        let mut state = self.state.lock().await;
        state.active_peer = peer;
    }

    pub async fn active_conversation(&self) -> Option<Uuid> {
        self.state.lock().await.active_peer
    }

    // ── Snapshots ──

    /// Snapshot of a peer's timeline, newest-first
    pub async fn messages(&self, peer: Uuid) -> Vec<Message> {
        self.state
            .lock()
            .await
            .timelines
            .get(&peer)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of the summary list, most-recently-active-first
    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.lock().await.conversations.clone()
    }

    pub async fn unread_total(&self) -> u32 {
        self.state.lock().await.unread_total
    }

    pub async fn unread_for(&self, peer: Uuid) -> u32 {
        self.state
            .lock()
            .await
            .conversations
            .iter()
            .find(|c| c.peer.id == peer)
            .map(|c| c.unread_count)
            .unwrap_or(0)
    }

    // ── Internals ──

    async fn restore_entry(&self, peer: Uuid, prior: Message) {
        let mut state = self.state.lock().await;
        if let Some(sequence) = state.timelines.get_mut(&peer) {
            if let Some(pos) = sequence.iter().position(|m| m.id == prior.id) {
                sequence[pos] = prior;
            }
        }
        drop(state);
        self.emit(EngineEvent::TimelineChanged { peer_id: peer });
    }

    /// Update or lazily create the summary entry for a peer and move it to
    /// the front of the list.
    fn upsert_summary(state: &mut TimelineState, local_user: Uuid, peer: Uuid, message: &Message) {
        let pos = state.conversations.iter().position(|c| c.peer.id == peer);
        let mut conv = match pos {
            Some(p) => state.conversations.remove(p),
            None => Conversation::new(local_user, UserRef::bare(peer)),
        };
        conv.update_last_message(message);
        state.conversations.insert(0, conv);
    }
}

/// Find the timeline holding a message id, yielding the owning peer, the
/// entry's position, and mutable access to the sequence.
fn locate_mut(
    state: &mut TimelineState,
    id: Uuid,
) -> Option<(Uuid, usize, &mut Vec<Message>)> {
    state.timelines.iter_mut().find_map(|(peer, sequence)| {
        sequence
            .iter()
            .position(|m| m.id == id)
            .map(move |pos| (*peer, pos, sequence))
    })
}

/// Collapse a sequence onto unique ids, keeping the first occurrence.
fn dedup_by_id(sequence: &mut Vec<Message>) {
    let mut seen = std::collections::HashSet::with_capacity(sequence.len());
    sequence.retain(|m| seen.insert(m.id));
}
