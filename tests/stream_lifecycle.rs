//! Connection manager tests: authenticate handshake, idempotent connect,
//! event dispatch, the disconnect grace period, and explicit teardown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use common::{payload, FakeChatApi, FakeTransport};
use shelftalk::store::{MessageStore, PresenceTracker};
use shelftalk::stream::StreamManager;
use shelftalk::types::{ClientEvent, DisplayStatus, EngineEvent, OnlineStatus, ServerEvent};
use shelftalk::Config;

struct Harness {
    manager: Arc<StreamManager>,
    transport: Arc<FakeTransport>,
    messages: Arc<MessageStore>,
    presence: Arc<PresenceTracker>,
    events: broadcast::Receiver<EngineEvent>,
    me: Uuid,
}

fn harness() -> Harness {
    common::init_tracing();
    let me = Uuid::new_v4();
    let config = Config::new();
    let (events, events_rx) = broadcast::channel(256);
    let api = Arc::new(FakeChatApi::new(me));
    let messages = Arc::new(MessageStore::new(me, api, events.clone()));
    let presence = Arc::new(PresenceTracker::new(&config, events.clone()));
    let transport = Arc::new(FakeTransport::new());
    let transport_seam: Arc<dyn shelftalk::stream::StreamTransport> = Arc::clone(&transport) as _;
    let manager = Arc::new(StreamManager::new(
        &config,
        transport_seam,
        Arc::clone(&messages),
        Arc::clone(&presence),
        events,
    ));
    Harness {
        manager,
        transport,
        messages,
        presence,
        events: events_rx,
        me,
    }
}

fn drain_events(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn connect_authenticates_over_the_new_channel() {
    let h = harness();
    let mut session = h.transport.push_session();

    h.manager.connect(h.me).await;

    let first = tokio::time::timeout(Duration::from_secs(1), session.sent.recv())
        .await
        .expect("authenticate within deadline")
        .expect("channel open");
    assert_eq!(first, ClientEvent::Authenticate { user_id: h.me });
    assert!(common::wait_for(|| {
        let manager = Arc::clone(&h.manager);
        async move { manager.is_connected().await }
    })
    .await);
}

#[tokio::test]
async fn second_connect_reuses_the_live_connection() {
    let h = harness();
    let mut session = h.transport.push_session();

    h.manager.connect(h.me).await;
    assert!(common::wait_for(|| {
        let manager = Arc::clone(&h.manager);
        async move { manager.is_connected().await }
    })
    .await);

    // Same call again: re-issue the handshake, do not open a new channel.
    h.manager.connect(h.me).await;
    settle().await;

    let sent = session.drain_sent();
    assert_eq!(
        sent,
        vec![
            ClientEvent::Authenticate { user_id: h.me },
            ClientEvent::Authenticate { user_id: h.me },
        ]
    );
    assert_eq!(h.transport.attempts(), 1);
}

#[tokio::test]
async fn inbound_events_reach_the_stores() {
    let h = harness();
    let session = h.transport.push_session();
    h.manager.connect(h.me).await;

    let peer = Uuid::new_v4();
    session
        .events
        .send(ServerEvent::NewMessage {
            message: payload(peer, h.me, "pushed"),
        })
        .unwrap();
    session
        .events
        .send(ServerEvent::ActiveUsers {
            user_ids: vec![peer],
        })
        .unwrap();
    session
        .events
        .send(ServerEvent::TypingStart { sender_id: peer })
        .unwrap();

    assert!(common::wait_for(|| {
        let messages = Arc::clone(&h.messages);
        async move { messages.messages(peer).await.len() == 1 }
    })
    .await);
    assert!(common::wait_for(|| {
        let presence = Arc::clone(&h.presence);
        async move { presence.display_status(peer).await == DisplayStatus::Online }
    })
    .await);
    assert!(common::wait_for(|| {
        let presence = Arc::clone(&h.presence);
        async move { presence.is_typing(peer).await }
    })
    .await);
}

#[tokio::test]
async fn delivery_and_read_receipts_dispatch_to_the_timeline() {
    let h = harness();
    let session = h.transport.push_session();
    h.manager.connect(h.me).await;

    let peer = Uuid::new_v4();
    let mine = payload(h.me, peer, "delivered?");
    session
        .events
        .send(ServerEvent::NewMessage {
            message: mine.clone(),
        })
        .unwrap();
    session
        .events
        .send(ServerEvent::MessageDelivered {
            id: mine.id,
            delivered_at: chrono::Utc::now(),
        })
        .unwrap();
    session
        .events
        .send(ServerEvent::MessagesRead {
            conversation_id: shelftalk::types::conversation_key(h.me, peer),
            reader_id: peer,
        })
        .unwrap();

    assert!(common::wait_for(|| {
        let messages = Arc::clone(&h.messages);
        async move {
            let timeline = messages.messages(peer).await;
            timeline.len() == 1 && timeline[0].delivered_at.is_some() && timeline[0].read
        }
    })
    .await);
}

#[tokio::test(start_paused = true)]
async fn transport_blip_within_grace_keeps_logical_state_connected() {
    let mut h = harness();
    let mut session = h.transport.push_session();
    h.manager.connect(h.me).await;
    assert!(common::wait_for(|| {
        let manager = Arc::clone(&h.manager);
        async move { manager.is_connected().await }
    })
    .await);
    drain_events(&mut h.events);

    // Drop the transport; a replacement session is ready before the grace
    // period (5 s) elapses, so the state never flips.
    h.transport.push_session();
    session.drop_connection();

    assert!(common::wait_for(|| {
        let transport = Arc::clone(&h.transport);
        async move { transport.attempts() == 2 }
    })
    .await);
    settle().await;
    tokio::time::advance(Duration::from_secs(6)).await;
    settle().await;

    assert!(h.manager.is_connected().await);
    let events = drain_events(&mut h.events);
    assert!(!events.contains(&EngineEvent::ConnectionChanged { connected: false }));
    assert!(!events.contains(&EngineEvent::Reconnected));
}

#[tokio::test(start_paused = true)]
async fn grace_expiry_flips_state_and_reconnect_is_reported() {
    let mut h = harness();
    let mut session = h.transport.push_session();
    h.manager.connect(h.me).await;
    assert!(common::wait_for(|| {
        let manager = Arc::clone(&h.manager);
        async move { manager.is_connected().await }
    })
    .await);
    drain_events(&mut h.events);

    // No replacement session: reconnect attempts fail until one appears.
    session.drop_connection();
    assert!(common::wait_for(|| {
        let manager = Arc::clone(&h.manager);
        async move { !manager.is_connected().await }
    })
    .await);
    assert!(drain_events(&mut h.events)
        .contains(&EngineEvent::ConnectionChanged { connected: false }));

    // Now let it back in.
    h.transport.push_session();
    assert!(common::wait_for(|| {
        let manager = Arc::clone(&h.manager);
        async move { manager.is_connected().await }
    })
    .await);
    let events = drain_events(&mut h.events);
    assert!(events.contains(&EngineEvent::ConnectionChanged { connected: true }));
    assert!(events.contains(&EngineEvent::Reconnected));
}

#[tokio::test]
async fn explicit_disconnect_flips_immediately_and_clears_presence() {
    let mut h = harness();
    let session = h.transport.push_session();
    h.manager.connect(h.me).await;

    let peer = Uuid::new_v4();
    session
        .events
        .send(ServerEvent::ActiveUsers {
            user_ids: vec![peer],
        })
        .unwrap();
    assert!(common::wait_for(|| {
        let presence = Arc::clone(&h.presence);
        async move { presence.display_status(peer).await == DisplayStatus::Online }
    })
    .await);
    drain_events(&mut h.events);

    h.manager.disconnect().await;

    assert!(!h.manager.is_connected().await);
    assert_eq!(h.presence.display_status(peer).await, DisplayStatus::Offline);
    assert!(drain_events(&mut h.events)
        .contains(&EngineEvent::ConnectionChanged { connected: false }));

    // The connection task is gone; no further reconnect attempts.
    let attempts = h.transport.attempts();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.transport.attempts(), attempts);
}

#[tokio::test]
async fn typing_signals_ride_the_live_connection() {
    let h = harness();
    let mut session = h.transport.push_session();
    h.manager.connect(h.me).await;
    assert!(common::wait_for(|| {
        let manager = Arc::clone(&h.manager);
        async move { manager.is_connected().await }
    })
    .await);

    let peer = Uuid::new_v4();
    h.presence.note_input(peer).await;
    settle().await;

    let sent = session.drain_sent();
    assert!(sent.contains(&ClientEvent::Authenticate { user_id: h.me }));
    assert!(sent.contains(&ClientEvent::TypingStart { receiver_id: peer }));
}
