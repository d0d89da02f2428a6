//! Common test utilities and helpers
//!
//! Scripted doubles for the HTTP API and the stream transport, plus payload
//! builders shared by the integration tests.

// Each test binary compiles this module separately and uses a subset of it.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use shelftalk::api::{ChatApi, ConversationPayload, MessagePage, SendMessageBody};
use shelftalk::stream::{Connection, StreamTransport};
use shelftalk::types::{ClientEvent, MessagePayload, ServerEvent};
use shelftalk::ApiError;

/// Install a log subscriber for debugging test runs (`RUST_LOG=debug`).
/// Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Build a server-side message payload from `sender` to `receiver`.
pub fn payload(sender: Uuid, receiver: Uuid, text: &str) -> MessagePayload {
    MessagePayload {
        id: Uuid::new_v4(),
        sender_id: sender,
        receiver_id: receiver,
        text: Some(text.to_string()),
        attachment: None,
        created_at: Utc::now(),
        is_edited: false,
        edited_at: None,
        is_deleted: false,
        read: false,
        read_at: None,
        delivered_at: None,
    }
}

/// Scripted [`ChatApi`] double.
///
/// Every method succeeds by default; individual methods can be forced to
/// fail, send responses can be scripted, and history pages preloaded.
pub struct FakeChatApi {
    local_user: Uuid,
    /// Methods (by name) that return a network error
    failing: Mutex<HashSet<&'static str>>,
    /// Scripted results for `send_message`, consumed front-first
    send_script: Mutex<VecDeque<Result<MessagePayload, ApiError>>>,
    /// Delay applied to `send_message`, for interleaving a stream echo ahead
    /// of the HTTP response
    send_delay: Mutex<Option<std::time::Duration>>,
    /// Preloaded history pages keyed by (peer, page)
    pages: Mutex<HashMap<(Uuid, u32), MessagePage>>,
    conversations: Mutex<Vec<ConversationPayload>>,
    unread: AtomicU32,
    /// Method-call log, in order
    pub calls: Mutex<Vec<String>>,
}

impl FakeChatApi {
    pub fn new(local_user: Uuid) -> Self {
        Self {
            local_user,
            failing: Mutex::new(HashSet::new()),
            send_script: Mutex::new(VecDeque::new()),
            send_delay: Mutex::new(None),
            pages: Mutex::new(HashMap::new()),
            conversations: Mutex::new(Vec::new()),
            unread: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Force a method to fail with a network error.
    pub fn fail(&self, method: &'static str) {
        self.failing.lock().unwrap().insert(method);
    }

    pub fn succeed(&self, method: &'static str) {
        self.failing.lock().unwrap().remove(method);
    }

    /// Queue an explicit result for the next `send_message` call.
    pub fn script_send(&self, result: Result<MessagePayload, ApiError>) {
        self.send_script.lock().unwrap().push_back(result);
    }

    /// Hold `send_message` responses for this long.
    pub fn delay_sends(&self, delay: std::time::Duration) {
        *self.send_delay.lock().unwrap() = Some(delay);
    }

    pub fn put_page(&self, peer: Uuid, page: u32, total_pages: u32, messages: Vec<MessagePayload>) {
        self.pages.lock().unwrap().insert(
            (peer, page),
            MessagePage {
                messages,
                page,
                total_pages,
            },
        );
    }

    pub fn put_conversations(&self, conversations: Vec<ConversationPayload>) {
        *self.conversations.lock().unwrap() = conversations;
    }

    pub fn set_unread(&self, count: u32) {
        self.unread.store(count, Ordering::SeqCst);
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn gate(&self, method: &'static str) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(method.to_string());
        if self.failing.lock().unwrap().contains(method) {
            Err(ApiError::Network("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChatApi for FakeChatApi {
    async fn conversations(&self) -> Result<Vec<ConversationPayload>, ApiError> {
        self.gate("conversations")?;
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn messages(&self, peer: Uuid, page: u32) -> Result<MessagePage, ApiError> {
        self.gate("messages")?;
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&(peer, page))
            .cloned()
            .unwrap_or(MessagePage {
                messages: Vec::new(),
                page,
                total_pages: page,
            }))
    }

    async fn send_message(
        &self,
        peer: Uuid,
        body: SendMessageBody,
    ) -> Result<MessagePayload, ApiError> {
        let delay = *self.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.gate("send_message")?;
        if let Some(scripted) = self.send_script.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(MessagePayload {
            id: Uuid::new_v4(),
            sender_id: self.local_user,
            receiver_id: peer,
            text: body.text,
            attachment: body.attachment,
            created_at: Utc::now(),
            is_edited: false,
            edited_at: None,
            is_deleted: false,
            read: false,
            read_at: None,
            delivered_at: None,
        })
    }

    async fn mark_read(&self, _peer: Uuid) -> Result<(), ApiError> {
        self.gate("mark_read")
    }

    async fn edit_message(&self, _id: Uuid, _text: &str) -> Result<(), ApiError> {
        self.gate("edit_message")
    }

    async fn delete_for_me(&self, _id: Uuid) -> Result<(), ApiError> {
        self.gate("delete_for_me")
    }

    async fn delete_for_everyone(&self, _id: Uuid) -> Result<(), ApiError> {
        self.gate("delete_for_everyone")
    }

    async fn clear_history(&self, _peer: Uuid) -> Result<(), ApiError> {
        self.gate("clear_history")
    }

    async fn unread_count(&self) -> Result<u32, ApiError> {
        self.gate("unread_count")?;
        Ok(self.unread.load(Ordering::SeqCst))
    }
}

/// Controller for one scripted transport session.
pub struct SessionController {
    /// Push inbound server events
    pub events: mpsc::UnboundedSender<ServerEvent>,
    /// Observe outbound client events
    pub sent: mpsc::UnboundedReceiver<ClientEvent>,
}

impl SessionController {
    /// Drop the inbound sender, simulating a transport-level disconnect.
    pub fn drop_connection(&mut self) {
        let (orphan, _) = mpsc::unbounded_channel();
        self.events = orphan;
    }

    /// Drain whatever client events have been sent so far.
    pub fn drain_sent(&mut self) -> Vec<ClientEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.sent.try_recv() {
            out.push(event);
        }
        out
    }
}

/// Channel-backed [`StreamTransport`] double. Each prepared session is
/// consumed by one `connect()` call; with none prepared, connects fail (the
/// manager's retry loop keeps polling).
pub struct FakeTransport {
    sessions: Mutex<VecDeque<Connection>>,
    pub connect_attempts: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(VecDeque::new()),
            connect_attempts: AtomicUsize::new(0),
        }
    }

    /// Prepare the next session and return its controller.
    pub fn push_session(&self) -> SessionController {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        self.sessions.lock().unwrap().push_back(Connection {
            incoming: event_rx,
            outgoing: client_tx,
        });
        SessionController {
            events: event_tx,
            sent: client_rx,
        }
    }

    pub fn attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamTransport for FakeTransport {
    async fn connect(&self) -> Result<Connection, ApiError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ApiError::Network("no session available".to_string()))
    }
}

/// Wait until `predicate` holds or the timeout elapses; returns whether it
/// held. Event dispatch crosses task boundaries, so tests poll rather than
/// assume immediate visibility.
pub async fn wait_for<F, Fut>(mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(20);
    while tokio::time::Instant::now() < deadline {
        if predicate().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}
