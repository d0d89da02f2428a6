//! Core Data Types
//!
//! This module contains the data structures the engine operates on:
//!
//! - `Message` - A message in a two-party conversation
//! - `Conversation` - Per-peer summary entry for the inbox view
//! - `UserRef` / `UserProfile` - User identity and profile data
//! - `Presence` - Per-user online state
//! - `ServerEvent` / `ClientEvent` - Typed stream-channel events

pub mod conversation;
pub mod event;
pub mod message;
pub mod presence;
pub mod user;

// Re-export all types
pub use conversation::{conversation_key, Conversation, LastMessage};
pub use event::{ClientEvent, EngineEvent, ServerEvent};
pub use message::{
    Attachment, AttachmentKind, Message, MessagePayload, OutgoingAttachment, Sender,
};
pub use presence::{DisplayStatus, OnlineStatus, Presence};
pub use user::{UserProfile, UserRef};
