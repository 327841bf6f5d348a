use crate::error::Result;
use crate::models::user::{NewUser, User};
use async_trait::async_trait;
use uuid::Uuid;

/// The narrow user-lookup capability the core consumes.
///
/// Backed by whatever persistent store the host application uses; the core
/// assumes nothing beyond these two operations.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Finds a user by email address.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Finds a user by id; used when resolving a refresh token back to its
    /// owner.
    async fn find_user_by_id(&self, id: &Uuid) -> Result<Option<User>>;

    /// Creates a new user.
    async fn create_user(&self, user: NewUser) -> Result<User>;
}
