//! Event-Stream Connection Manager
//!
//! Owns the lifecycle of the single shared stream connection: connect,
//! authenticate, reconnect with capped backoff, and the grace-period
//! debounce that keeps a brief transport blip from flickering the UI into
//! an offline state.
//!
//! Inbound events are dispatched through one typed handler to the timeline
//! store and the presence tracker; consumers observe the results on the
//! engine's broadcast channel.

pub mod sse;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;
use crate::store::{MessageStore, PresenceTracker};
use crate::types::{ClientEvent, EngineEvent, ServerEvent};

pub use sse::SseTransport;

/// Reconnect backoff bounds (doubles per failed attempt)
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// One live transport connection. The incoming channel closing means the
/// transport dropped; the outgoing sender carries client events while up.
pub struct Connection {
    pub incoming: mpsc::UnboundedReceiver<ServerEvent>,
    pub outgoing: mpsc::UnboundedSender<ClientEvent>,
}

/// The stream channel the manager runs over. Production uses
/// [`SseTransport`]; tests inject a channel-backed fake.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open one connection, resolving once the channel is established.
    async fn connect(&self) -> Result<Connection, ApiError>;
}

struct ManagerState {
    task: Option<JoinHandle<()>>,
    /// Outbound side of the live connection, `None` while the transport is
    /// down
    outgoing: Option<mpsc::UnboundedSender<ClientEvent>>,
    /// Logical (authenticated) connection state; survives brief transport
    /// drops thanks to the grace timer
    connected: bool,
    /// Whether this session has ever been logically connected, for
    /// distinguishing a first connect from a reconnect
    was_connected: bool,
    grace_timer: Option<JoinHandle<()>>,
}

/// Everything the connection task needs, shared with the public handle
struct Shared {
    transport: Arc<dyn StreamTransport>,
    messages: Arc<MessageStore>,
    presence: Arc<PresenceTracker>,
    events: broadcast::Sender<EngineEvent>,
    state: Mutex<ManagerState>,
    grace: Duration,
}

impl Shared {
    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

/// Manages the process-wide stream connection and dispatches its events
pub struct StreamManager {
    shared: Arc<Shared>,
}

impl StreamManager {
    pub fn new(
        config: &Config,
        transport: Arc<dyn StreamTransport>,
        messages: Arc<MessageStore>,
        presence: Arc<PresenceTracker>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                messages,
                presence,
                events,
                state: Mutex::new(ManagerState {
                    task: None,
                    outgoing: None,
                    connected: false,
                    was_connected: false,
                    grace_timer: None,
                }),
                grace: config.disconnect_grace,
            }),
        }
    }

    /// Start (or re-authenticate) the stream connection. Idempotent: when a
    /// connection task is already live, the authenticate handshake is
    /// re-issued over the existing channel instead of opening a new one.
    pub async fn connect(&self, user_id: Uuid) {
        let mut state = self.shared.state.lock().await;
        let task_alive = state.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false);
        if task_alive {
            if let Some(tx) = &state.outgoing {
                debug!("connect on live stream, re-issuing authenticate");
                let _ = tx.send(ClientEvent::Authenticate { user_id });
            }
            return;
        }
        let shared = Arc::clone(&self.shared);
        state.task = Some(tokio::spawn(run(shared, user_id)));
    }

    /// Explicit teardown: stop the connection task, flip state immediately
    /// (no grace period for an intentional disconnect), and clear presence.
    pub async fn disconnect(&self) {
        let was_connected = {
            let mut state = self.shared.state.lock().await;
            if let Some(task) = state.task.take() {
                task.abort();
            }
            if let Some(timer) = state.grace_timer.take() {
                timer.abort();
            }
            state.outgoing = None;
            let was_connected = state.connected;
            state.connected = false;
            state.was_connected = false;
            was_connected
        };
        self.shared.presence.clear().await;
        if was_connected {
            info!("stream disconnected");
            self.shared.emit(EngineEvent::ConnectionChanged { connected: false });
        }
    }

    /// Logical connection state
    pub async fn is_connected(&self) -> bool {
        self.shared.state.lock().await.connected
    }
}

/// Connection loop: unbounded retries with capped backoff.
async fn run(shared: Arc<Shared>, user_id: Uuid) {
    let mut reconnect_delay = INITIAL_RECONNECT_DELAY;
    loop {
        match shared.transport.connect().await {
            Ok(connection) => {
                reconnect_delay = INITIAL_RECONNECT_DELAY;
                let Connection {
                    mut incoming,
                    outgoing,
                } = connection;
                // Authenticate before considering ourselves connected.
                let _ = outgoing.send(ClientEvent::Authenticate { user_id });
                transport_up(&shared, outgoing).await;

                while let Some(event) = incoming.recv().await {
                    dispatch(&shared, event).await;
                }
                warn!("stream transport dropped");
                transport_down(&shared).await;
            }
            Err(err) => {
                warn!(error = %err, "stream connect failed, will retry");
            }
        }
        tokio::time::sleep(reconnect_delay).await;
        reconnect_delay = std::cmp::min(reconnect_delay * 2, MAX_RECONNECT_DELAY);
    }
}

async fn transport_up(shared: &Arc<Shared>, outgoing: mpsc::UnboundedSender<ClientEvent>) {
    let (became_connected, is_reconnect) = {
        let mut state = shared.state.lock().await;
        if let Some(timer) = state.grace_timer.take() {
            timer.abort();
        }
        state.outgoing = Some(outgoing.clone());
        let became_connected = !state.connected;
        let is_reconnect = became_connected && state.was_connected;
        state.connected = true;
        state.was_connected = true;
        (became_connected, is_reconnect)
    };
    shared.presence.attach_outbound(outgoing).await;
    if became_connected {
        info!("stream connected");
        shared.emit(EngineEvent::ConnectionChanged { connected: true });
        if is_reconnect {
            shared.emit(EngineEvent::Reconnected);
        }
    }
}

/// Transport dropped: start the grace timer rather than flipping the logical
/// state immediately.
async fn transport_down(shared: &Arc<Shared>) {
    let mut state = shared.state.lock().await;
    state.outgoing = None;
    if let Some(timer) = state.grace_timer.take() {
        timer.abort();
    }
    if state.connected {
        let handle = Arc::clone(shared);
        let grace = shared.grace;
        state.grace_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            grace_elapsed(&handle).await;
        }));
    }
    drop(state);
    shared.presence.detach_outbound().await;
}

async fn grace_elapsed(shared: &Shared) {
    let flipped = {
        let mut state = shared.state.lock().await;
        state.grace_timer = None;
        // Reconnected within the grace period: nothing to report.
        if state.outgoing.is_some() || !state.connected {
            false
        } else {
            state.connected = false;
            true
        }
    };
    if flipped {
        info!("disconnect grace period elapsed");
        shared.emit(EngineEvent::ConnectionChanged { connected: false });
    }
}

/// Route one inbound event to the owning store.
async fn dispatch(shared: &Shared, event: ServerEvent) {
    match event {
        ServerEvent::NewMessage { message } => {
            shared.messages.add_received_message(message).await;
        }
        ServerEvent::MessageEdited {
            id,
            text,
            edited_at,
        } => {
            shared.messages.apply_remote_edit(id, text, edited_at).await;
        }
        ServerEvent::MessageDeleted { id } => {
            shared.messages.apply_remote_delete(id).await;
        }
        ServerEvent::MessagesRead {
            conversation_id, ..
        } => {
            shared.messages.apply_read_receipt(&conversation_id).await;
        }
        ServerEvent::MessageDelivered { id, delivered_at } => {
            shared.messages.apply_delivery(id, delivered_at).await;
        }
        ServerEvent::UserStatus {
            user_id,
            status,
            last_active,
        } => {
            shared.presence.set_status(user_id, status, last_active).await;
        }
        ServerEvent::ActiveUsers { user_ids } => {
            shared.presence.apply_snapshot(user_ids).await;
        }
        ServerEvent::TypingStart { sender_id } => {
            shared.presence.set_typing(sender_id, true).await;
        }
        ServerEvent::TypingStop { sender_id } => {
            shared.presence.set_typing(sender_id, false).await;
        }
    }
}
