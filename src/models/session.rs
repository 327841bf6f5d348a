use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a live server-side session.
///
/// Owned exclusively by the session store; mutated in place on activity
/// refresh and destroyed on removal, inactivity timeout or TTL eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// The opaque random session identifier.
    pub id: String,
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// The user's username.
    pub username: String,
    /// The user's email address.
    pub email: String,
    /// The user's roles.
    pub roles: Vec<String>,
    /// The permissions derived from the user's roles.
    pub permissions: Vec<String>,
    /// The client network address the session was created from.
    pub ip_address: String,
    /// The client user agent the session was created from.
    pub user_agent: String,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp of the last activity on the session.
    pub last_activity: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
    /// Whether multi-factor authentication was completed for this session.
    pub mfa_verified: bool,
}

/// Request-derived metadata attached to a session at creation.
#[derive(Debug, Clone, Default)]
pub struct SessionMetadata {
    /// The client network address.
    pub ip_address: String,
    /// The client user agent.
    pub user_agent: String,
    /// Whether multi-factor authentication was completed.
    pub mfa_verified: bool,
}
