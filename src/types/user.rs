//! User Identity Types
//!
//! A peer is always addressed by their `Uuid`; a full profile may or may not
//! be known at any given moment (conversation summaries can arrive before the
//! profile does).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Profile data for a user, as served by the platform API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    /// Username (unique handle)
    pub username: String,
    /// Optional display name
    pub display_name: Option<String>,
    /// Optional avatar URL
    pub avatar_url: Option<String>,
}

impl UserProfile {
    /// Get display name or fallback to username
    pub fn display_name_or_username(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Reference to a user: always an id, sometimes a resolved profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRef {
    /// The user's unique ID
    pub id: Uuid,
    /// Full profile, when known
    pub profile: Option<UserProfile>,
}

impl UserRef {
    /// Reference a user by id alone
    pub fn bare(id: Uuid) -> Self {
        Self { id, profile: None }
    }

    /// Reference a user with a resolved profile
    pub fn with_profile(id: Uuid, profile: UserProfile) -> Self {
        Self {
            id,
            profile: Some(profile),
        }
    }

    /// Best available display label for this user
    pub fn display_label(&self) -> String {
        match &self.profile {
            Some(p) => p.display_name_or_username().to_string(),
            None => self.id.to_string(),
        }
    }
}
