//! Identity issuance and verification for a networked service: password
//! credential hashing, signed-and-encrypted token pairs bound to the client
//! that obtained them, and a concurrent self-expiring session store with
//! per-user admission control.
//!
//! HTTP routing, persistent user storage and request binding stay with the
//! host application; the core consumes them through
//! [`repositories::user::UserDirectory`] and [`context::RequestContext`].

pub mod config;
pub mod context;
pub mod error;
pub mod keys;
pub mod roles;
pub mod session;
pub mod token;

pub mod crypto {
    pub mod aead;
    pub mod password;
}

pub mod models {
    pub mod session;
    pub mod user;
}

pub mod repositories {
    pub mod user;
}

pub mod services {
    pub mod auth;
}

pub mod validation {
    pub mod auth;
}

pub use config::Config;
pub use context::RequestContext;
pub use crypto::password::{CredentialHasher, PasswordParams};
pub use error::{AuthError, Result};
pub use keys::{load_or_create_encryption_key, load_or_create_signing_key, SigningKeyPair};
pub use models::session::{Session, SessionMetadata};
pub use models::user::{NewUser, User};
pub use repositories::user::UserDirectory;
pub use services::auth::{AuthService, LoginOutcome, LoginRequest, SignupRequest};
pub use session::{EvictionReason, MetricsSnapshot, SessionConfig, SessionStore};
pub use token::{SecureClaims, TokenConfig, TokenEngine, TokenPair, TokenType, TokenValidation};
