//! Date/Grouping Projector
//!
//! Pure transform from a newest-first message sequence to the display-ready
//! timeline: date separators between calendar days and per-message grouping
//! metadata for an inverted (bottom-anchored) chat view.
//!
//! Index 0 is the newest message and renders at the bottom, so a message's
//! "visually below" neighbor is the previous array element. A separator is
//! emitted after a message whenever the next (older) entry falls on a
//! different day, and after the oldest entry, which places each label above
//! its day's group.

use chrono::{Datelike, NaiveDate, Utc};

use crate::types::Message;

/// Where a message sits in a same-sender run, reading top (oldest) to
/// bottom (newest)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPosition {
    /// Not adjacent to any same-sender message
    Single,
    /// Oldest message of a run
    Start,
    Middle,
    /// Newest message of a run
    End,
}

/// A message annotated with grouping metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedMessage {
    pub message: Message,
    /// Show the sender's avatar: non-self messages whose visually-below
    /// (newer) neighbor has a different sender
    pub show_avatar: bool,
    pub position: GroupPosition,
}

/// One element of the display timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineItem {
    Message(AnnotatedMessage),
    DateSeparator { day: NaiveDate, label: String },
}

/// Project a newest-first sequence into display items, anchoring relative
/// day labels on the current date.
pub fn annotate(messages: &[Message]) -> Vec<TimelineItem> {
    annotate_on(messages, Utc::now().date_naive())
}

/// [`annotate`] with an explicit "today". Deterministic: identical input
/// always yields identical output.
pub fn annotate_on(messages: &[Message], today: NaiveDate) -> Vec<TimelineItem> {
    let mut items = Vec::with_capacity(messages.len() + 4);
    for (index, message) in messages.iter().enumerate() {
        let newer_same_sender = index
            .checked_sub(1)
            .map(|i| messages[i].sender == message.sender)
            .unwrap_or(false);
        let older_same_sender = messages
            .get(index + 1)
            .map(|older| older.sender == message.sender)
            .unwrap_or(false);

        let position = match (newer_same_sender, older_same_sender) {
            (false, false) => GroupPosition::Single,
            (true, false) => GroupPosition::Start,
            (true, true) => GroupPosition::Middle,
            (false, true) => GroupPosition::End,
        };
        let show_avatar = !message.sender.is_local() && !newer_same_sender;

        items.push(TimelineItem::Message(AnnotatedMessage {
            message: message.clone(),
            show_avatar,
            position,
        }));

        let day = message.created_at.date_naive();
        let older_day = messages.get(index + 1).map(|m| m.created_at.date_naive());
        if older_day != Some(day) {
            items.push(TimelineItem::DateSeparator {
                day,
                label: day_label(day, today),
            });
        }
    }
    items
}

/// Resolve a calendar day to its display label
pub fn day_label(day: NaiveDate, today: NaiveDate) -> String {
    if day == today {
        return "Today".to_string();
    }
    if day.succ_opt() == Some(today) {
        return "Yesterday".to_string();
    }
    if day.year() == today.year() {
        day.format("%b %-d").to_string()
    } else {
        day.format("%b %-d, %Y").to_string()
    }
}
