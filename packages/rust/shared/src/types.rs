//! Core domain types for the invitation graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A forum user as persisted in the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct User {
    /// Unique forum username.
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub karma: Option<i64>,
    /// Free-text profile bio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    /// Join date as shown by the forum (`YYYY-MM-DD`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Username of the inviter; `None` marks a root of the forest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invited_by_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// When profile-level scraping last succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<DateTime<Utc>>,
}

/// A partial set of known facts about a user.
///
/// Applied with coalesce semantics: a `None` field never clears a stored
/// value, and a `Some` field only fills a currently-null column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserUpsert {
    pub username: String,
    pub karma: Option<i64>,
    pub about: Option<String>,
    pub created_at: Option<String>,
    pub invited_by_username: Option<String>,
    pub github_username: Option<String>,
    pub twitter_username: Option<String>,
    pub website: Option<String>,
    pub scraped_at: Option<DateTime<Utc>>,
}

impl UserUpsert {
    /// An upsert carrying only the username (records first mention).
    pub fn bare(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Externally sourced profile data for one username.
///
/// Re-enriching a username replaces every field of the stored record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Enrichment {
    pub username: String,
    pub full_name: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub twitter_url: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    /// Remaining candidate URLs, in ranking order, without duplicates.
    #[serde(default)]
    pub other_urls: Vec<String>,
    /// Serialized search response kept for auditing.
    pub raw_response: Option<String>,
    pub enriched_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// InvitationEdge
// ---------------------------------------------------------------------------

/// Derived `(invitee, inviter)` pair for every user with a known inviter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvitationEdge {
    pub invitee: String,
    pub inviter: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_upsert_has_only_username() {
        let up = UserUpsert::bare("carol");
        assert_eq!(up.username, "carol");
        assert!(up.karma.is_none());
        assert!(up.scraped_at.is_none());
    }

    #[test]
    fn user_serialization_skips_missing_fields() {
        let user = User {
            username: "dave".into(),
            karma: Some(12),
            ..Default::default()
        };
        let json = serde_json::to_string(&user).expect("serialize");
        assert_eq!(json, r#"{"username":"dave","karma":12}"#);
        let parsed: User = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, user);
    }
}
