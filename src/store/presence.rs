//! Presence & Typing Tracker
//!
//! Per-user online state driven by inbound stream pushes, plus both sides of
//! the typing indicator: inbound flags that expire after a short TTL, and
//! outbound start/stop signals debounced behind a quiet-period timer.
//!
//! Presence transitions are server-driven: a user goes online via a status
//! push or the bulk `active_users` snapshot sent after authenticate, and
//! offline only via an explicit push. Staleness is not inferred client-side.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::types::{ClientEvent, DisplayStatus, EngineEvent, OnlineStatus, Presence};

/// Outbound typing state for one peer: whether a `typing_start` is in
/// flight, and the quiet-period timer that will emit the matching stop.
struct OutboundTyping {
    active: bool,
    quiet_timer: Option<JoinHandle<()>>,
}

struct PresenceState {
    presence: HashMap<Uuid, Presence>,
    /// Peer id -> when their last `typing_start` arrived
    typing_in: HashMap<Uuid, Instant>,
    typing_out: HashMap<Uuid, OutboundTyping>,
    /// Where outbound client events go while the stream is up
    outbound: Option<mpsc::UnboundedSender<ClientEvent>>,
}

/// Tracks who is online and who is typing
pub struct PresenceTracker {
    /// Shared with the quiet-period timer tasks
    state: Arc<Mutex<PresenceState>>,
    events: broadcast::Sender<EngineEvent>,
    quiet_period: Duration,
    typing_ttl: Duration,
    recency_window: chrono::Duration,
}

impl PresenceTracker {
    pub fn new(config: &Config, events: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            state: Arc::new(Mutex::new(PresenceState {
                presence: HashMap::new(),
                typing_in: HashMap::new(),
                typing_out: HashMap::new(),
                outbound: None,
            })),
            events,
            quiet_period: config.typing_quiet_period,
            typing_ttl: config.typing_ttl,
            recency_window: config.recency_window,
        }
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    // ── Inbound presence ──

    /// Apply a `user_status` push.
    pub async fn set_status(
        &self,
        user_id: Uuid,
        status: OnlineStatus,
        last_active: Option<chrono::DateTime<Utc>>,
    ) {
        let mut state = self.state.lock().await;
        let last_active = last_active.or_else(|| {
            // An explicit offline push means the user was active until now.
            matches!(status, OnlineStatus::Offline).then(Utc::now)
        });
        state.presence.insert(
            user_id,
            Presence {
                status,
                last_active,
            },
        );
        drop(state);
        self.emit(EngineEvent::PresenceChanged { user_id });
    }

    /// Rebuild presence from the bulk online-users snapshot sent after the
    /// authenticate handshake. Users absent from the snapshot are dropped.
    pub async fn apply_snapshot(&self, user_ids: Vec<Uuid>) {
        let mut state = self.state.lock().await;
        state.presence = user_ids
            .iter()
            .map(|id| {
                (
                    *id,
                    Presence {
                        status: OnlineStatus::Online,
                        last_active: None,
                    },
                )
            })
            .collect();
        drop(state);
        for user_id in user_ids {
            self.emit(EngineEvent::PresenceChanged { user_id });
        }
    }

    /// Derived display status for a user
    pub async fn display_status(&self, user_id: Uuid) -> DisplayStatus {
        let state = self.state.lock().await;
        match state.presence.get(&user_id) {
            Some(presence) => presence.display_status(Utc::now(), self.recency_window),
            None => DisplayStatus::Offline,
        }
    }

    pub async fn presence(&self, user_id: Uuid) -> Option<Presence> {
        self.state.lock().await.presence.get(&user_id).cloned()
    }

    // ── Inbound typing ──

    /// Apply an inbound `typing_start`/`typing_stop` for a peer.
    pub async fn set_typing(&self, user_id: Uuid, typing: bool) {
        let mut state = self.state.lock().await;
        if typing {
            state.typing_in.insert(user_id, Instant::now());
        } else {
            state.typing_in.remove(&user_id);
        }
        drop(state);
        self.emit(EngineEvent::TypingChanged { user_id, typing });
    }

    /// Whether a peer is currently typing. A flag older than the typing TTL
    /// reads as false: a dropped `typing_stop` must not pin the indicator.
    pub async fn is_typing(&self, user_id: Uuid) -> bool {
        let state = self.state.lock().await;
        match state.typing_in.get(&user_id) {
            Some(since) => since.elapsed() < self.typing_ttl,
            None => false,
        }
    }

    // ── Outbound typing ──

    /// Note a local text-input change addressed to a peer. Emits
    /// `typing_start` once per burst, then (re)arms the quiet-period timer
    /// that will emit `typing_stop`.
    pub async fn note_input(&self, peer: Uuid) {
        let mut state = self.state.lock().await;
        let needs_start = {
            let entry = state
                .typing_out
                .entry(peer)
                .or_insert_with(|| OutboundTyping {
                    active: false,
                    quiet_timer: None,
                });
            let needs_start = !entry.active;
            entry.active = true;
            if let Some(timer) = entry.quiet_timer.take() {
                timer.abort();
            }
            needs_start
        };
        if needs_start {
            Self::send(&state, ClientEvent::TypingStart { receiver_id: peer });
        }
        let handle = Arc::clone(&self.state);
        let quiet_period = self.quiet_period;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            finish_typing(&handle, peer).await;
        });
        if let Some(entry) = state.typing_out.get_mut(&peer) {
            entry.quiet_timer = Some(timer);
        }
    }

    /// The input field was cleared: stop immediately.
    pub async fn input_cleared(&self, peer: Uuid) {
        let mut state = self.state.lock().await;
        let mut send_stop = false;
        if let Some(entry) = state.typing_out.get_mut(&peer) {
            if let Some(timer) = entry.quiet_timer.take() {
                timer.abort();
            }
            if entry.active {
                entry.active = false;
                send_stop = true;
            }
        }
        if send_stop {
            Self::send(&state, ClientEvent::TypingStop { receiver_id: peer });
        }
    }

    // ── Stream lifecycle ──

    /// Attach the outbound channel of a live stream connection.
    pub async fn attach_outbound(&self, sender: mpsc::UnboundedSender<ClientEvent>) {
        self.state.lock().await.outbound = Some(sender);
    }

    /// Detach on transport drop; outbound signals are dropped while down.
    pub async fn detach_outbound(&self) {
        self.state.lock().await.outbound = None;
    }

    /// Wipe all ephemeral state. Presence is only meaningful while
    /// connected, so this runs on explicit disconnect.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.presence.clear();
        state.typing_in.clear();
        for (_, mut entry) in state.typing_out.drain() {
            if let Some(timer) = entry.quiet_timer.take() {
                timer.abort();
            }
        }
        state.outbound = None;
        debug!("presence state cleared");
    }

    fn send(state: &PresenceState, event: ClientEvent) {
        if let Some(tx) = &state.outbound {
            let _ = tx.send(event);
        }
    }
}

/// Quiet period elapsed with no further input: emit the matching stop.
async fn finish_typing(state: &Arc<Mutex<PresenceState>>, peer: Uuid) {
    let mut state = state.lock().await;
    let mut send_stop = false;
    if let Some(entry) = state.typing_out.get_mut(&peer) {
        entry.quiet_timer = None;
        if entry.active {
            entry.active = false;
            send_stop = true;
        }
    }
    if send_stop {
        PresenceTracker::send(&state, ClientEvent::TypingStop { receiver_id: peer });
    }
}
