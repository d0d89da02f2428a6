//! Chat Engine
//!
//! The dependency-injected service tying the stores, stream manager, and API
//! client together under one explicit lifecycle. Construct it with the
//! collaborators (production or doubles), `init()` after login, `dispose()`
//! on logout or app shutdown.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{ChatApi, HttpChatApi};
use crate::config::Config;
use crate::error::ChatResult;
use crate::store::{MessageStore, PresenceTracker};
use crate::stream::{SseTransport, StreamManager, StreamTransport};
use crate::types::EngineEvent;

/// Capacity of the engine's broadcast channel; a slow consumer lags rather
/// than blocking the stores.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Messaging and presence engine for one authenticated user session
pub struct ChatEngine {
    local_user: Uuid,
    /// Message timelines, conversation index, unread counters
    pub messages: Arc<MessageStore>,
    /// Online state and typing indicators
    pub presence: Arc<PresenceTracker>,
    stream: StreamManager,
    events: broadcast::Sender<EngineEvent>,
    heal_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChatEngine {
    /// Build an engine over explicit collaborators.
    pub fn new(
        config: Config,
        local_user: Uuid,
        api: Arc<dyn ChatApi>,
        transport: Arc<dyn StreamTransport>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let messages = Arc::new(MessageStore::new(local_user, api, events.clone()));
        let presence = Arc::new(PresenceTracker::new(&config, events.clone()));
        let stream = StreamManager::new(
            &config,
            transport,
            Arc::clone(&messages),
            Arc::clone(&presence),
            events.clone(),
        );
        Self {
            local_user,
            messages,
            presence,
            stream,
            events,
            heal_task: Mutex::new(None),
        }
    }

    /// Build an engine over the production HTTP API and SSE transport.
    pub fn over_http(config: Config, local_user: Uuid) -> Self {
        let api = Arc::new(HttpChatApi::new(config.clone()));
        let transport = Arc::new(SseTransport::new(config.clone()));
        Self::new(config, local_user, api, transport)
    }

    pub fn local_user(&self) -> Uuid {
        self.local_user
    }

    /// Subscribe to engine notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Bring the session up: connect the stream, load the inbox, and start
    /// the reconnect-healing listener. The stream keeps retrying on its own;
    /// only the initial inbox load can fail here.
    pub async fn init(&self) -> ChatResult<()> {
        info!(user = %self.local_user, "engine init");
        self.stream.connect(self.local_user).await;

        let mut heal_task = self.heal_task.lock().await;
        if heal_task.is_none() {
            let messages = Arc::clone(&self.messages);
            let mut events = self.events.subscribe();
            *heal_task = Some(tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(EngineEvent::Reconnected) => {
                            // Heal any gap in the conversation on screen.
                            if let Some(peer) = messages.active_conversation().await {
                                if let Err(err) = messages.fetch_messages(peer, 1).await {
                                    warn!(peer = %peer, error = %err, "post-reconnect refetch failed");
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "engine event listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }
        drop(heal_task);

        self.messages.load_conversations().await?;
        if let Err(err) = self.messages.refresh_unread().await {
            warn!(error = %err, "initial unread refresh failed");
        }
        Ok(())
    }

    /// Tear the session down: stop the stream (clearing presence) and the
    /// healing listener. Timelines stay readable until the engine drops.
    pub async fn dispose(&self) {
        info!(user = %self.local_user, "engine dispose");
        if let Some(task) = self.heal_task.lock().await.take() {
            task.abort();
        }
        self.stream.disconnect().await;
    }

    /// Logical stream connection state
    pub async fn is_connected(&self) -> bool {
        self.stream.is_connected().await
    }
}
