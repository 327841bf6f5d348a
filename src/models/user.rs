use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a user as surfaced by the external user store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The user's username.
    pub username: String,
    /// The user's email address.
    pub email: String,
    /// The user's password hash in PHC string form, stored opaquely.
    pub password_hash: String,
    /// The user's roles.
    pub roles: Vec<String>,
    /// Whether multi-factor authentication is enabled for the user.
    pub mfa_enabled: bool,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The user's primary role, used for the encrypted role claim.
    pub fn primary_role(&self) -> &str {
        self.roles.first().map(String::as_str).unwrap_or("developer")
    }
}

/// The fields required to create a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// The user's username.
    pub username: String,
    /// The user's email address.
    pub email: String,
    /// The user's password hash in PHC string form.
    pub password_hash: String,
    /// The user's roles.
    pub roles: Vec<String>,
}
