//! Presence Types
//!
//! Per-user online state as pushed by the server. Presence is ephemeral: it
//! is rebuilt from the `active_users` snapshot on every (re)connect and must
//! not survive a manual disconnect.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Raw online state as pushed by the server
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnlineStatus {
    Online,
    Offline,
}

/// Stored presence entry for one user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Presence {
    pub status: OnlineStatus,
    pub last_active: Option<DateTime<Utc>>,
}

/// Derived display state. Never stored: recomputed from [`Presence`] at read
/// time so "Recently active" ages out without a server push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayStatus {
    Online,
    RecentlyActive,
    Offline,
}

impl Presence {
    /// Derive the display status with the given recency window
    pub fn display_status(&self, now: DateTime<Utc>, recency_window: Duration) -> DisplayStatus {
        match self.status {
            OnlineStatus::Online => DisplayStatus::Online,
            OnlineStatus::Offline => match self.last_active {
                Some(last) if now.signed_duration_since(last) <= recency_window => {
                    DisplayStatus::RecentlyActive
                }
                _ => DisplayStatus::Offline,
            },
        }
    }
}
