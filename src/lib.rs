//! Shelftalk - Messaging & Presence Engine
//!
//! Client-side synchronization core for a social reading platform's direct
//! messaging: it reconciles an optimistic local message timeline against the
//! server-confirmed timeline arriving over both the request/response API and
//! a persistent event stream, while tracking presence, typing indicators,
//! read receipts, and delivery acknowledgements.
//!
//! # Module Structure
//!
//! - **`types`** - Messages, conversations, users, presence, and the typed
//!   stream-event sets
//! - **`store`** - The timeline store (optimistic mutations, dedup,
//!   conversation index, unread counts) and the presence tracker
//! - **`stream`** - The shared event-stream connection: authenticate,
//!   reconnect with backoff, grace-period disconnect debounce, dispatch
//! - **`api`** - The HTTP request/response surface behind a trait seam
//! - **`timeline_view`** - Pure date-separator/grouping projection for an
//!   inverted chat view
//! - **`engine`** - The dependency-injected facade with `init`/`dispose`
//!
//! # Usage
//!
//! ```rust,no_run
//! use shelftalk::{ChatEngine, Config};
//! use uuid::Uuid;
//!
//! # async fn example(user_id: Uuid) -> shelftalk::ChatResult<()> {
//! let config = Config::builder()
//!     .server_url("https://api.example.org")
//!     .token("bearer-token")
//!     .build()
//!     .expect("valid config");
//! let engine = ChatEngine::over_http(config, user_id);
//! engine.init().await?;
//!
//! let peer = Uuid::new_v4();
//! engine.messages.send_message(peer, Some("hi!".into()), None).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod store;
pub mod stream;
pub mod timeline_view;
pub mod types;

pub use config::{Config, ConfigBuilder, ConfigError};
pub use engine::ChatEngine;
pub use error::{ApiError, ChatError, ChatResult};
pub use store::{MessageStore, PresenceTracker};
pub use timeline_view::{annotate, annotate_on, AnnotatedMessage, GroupPosition, TimelineItem};
pub use types::{
    Attachment, AttachmentKind, ClientEvent, Conversation, EngineEvent, Message, OutgoingAttachment,
    Sender, ServerEvent, UserProfile, UserRef,
};
