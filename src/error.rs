use thiserror::Error;

/// The crate's error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A key file could not be loaded or parsed.
    #[error("Key load error: {0}")]
    KeyLoad(String),

    /// An authentication error (bad credentials).
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A stored password hash does not match the PHC grammar.
    #[error("Invalid password hash format: {0}")]
    InvalidHashFormat(String),

    /// A stored password hash was produced by an unknown algorithm.
    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A stored password hash was produced by an incompatible KDF version.
    #[error("Hash version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// The key derivation function itself failed.
    #[error("Key derivation error: {0}")]
    Kdf(String),

    /// A token was signed with an unexpected algorithm.
    #[error("Token algorithm mismatch")]
    AlgorithmMismatch,

    /// A token signature did not verify.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// A token is past its expiry.
    #[error("Token expired")]
    Expired,

    /// A token is not yet within its validity window.
    #[error("Token not yet valid")]
    NotYetValid,

    /// A token of the wrong type was presented (access vs refresh).
    #[error("Wrong token type: expected {expected}, found {found}")]
    WrongTokenType { expected: String, found: String },

    /// An encrypted claim field could not be decrypted.
    #[error("Claim decryption failed")]
    ClaimDecryption,

    /// The token fingerprint does not match the caller's.
    #[error("Token fingerprint mismatch")]
    FingerprintMismatch,

    /// A token that could not be parsed at all.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The session was not found.
    #[error("Session not found")]
    SessionNotFound,

    /// The session exceeded its inactivity timeout.
    #[error("Session inactive")]
    SessionInactive,

    /// The global or per-user session cap was reached.
    #[error("Session limit reached")]
    SessionLimitReached,

    /// A resource already exists.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// An internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AuthError` as the error type.
pub type Result<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// The message safe to return to an external caller.
    ///
    /// Token and credential failures are collapsed so a caller cannot tell
    /// which check failed; infrastructure failures stay distinguishable from
    /// authentication failures. Full detail is logged here, once.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::Authentication(msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                "Invalid email or password"
            }

            AuthError::AlgorithmMismatch
            | AuthError::InvalidSignature
            | AuthError::Expired
            | AuthError::NotYetValid
            | AuthError::WrongTokenType { .. }
            | AuthError::ClaimDecryption
            | AuthError::FingerprintMismatch
            | AuthError::MalformedToken(_) => {
                tracing::warn!("Token rejected: {}", self);
                "Invalid or expired token"
            }

            AuthError::SessionNotFound | AuthError::SessionInactive => {
                tracing::debug!("Session unavailable: {}", self);
                "Session expired"
            }

            AuthError::SessionLimitReached => {
                tracing::warn!("Session limit reached");
                "Too many active sessions"
            }

            AuthError::Validation(msg) => {
                tracing::debug!("Validation error: {}", msg);
                "Invalid input provided"
            }

            AuthError::AlreadyExists(msg) => {
                tracing::debug!("Conflict: {}", msg);
                "Resource already exists"
            }

            AuthError::Io(e) => {
                tracing::error!("IO error: {}", e);
                "Internal server error"
            }

            AuthError::KeyLoad(msg) => {
                tracing::error!("Key load error: {}", msg);
                "Internal server error"
            }

            AuthError::InvalidHashFormat(_)
            | AuthError::UnsupportedAlgorithm(_)
            | AuthError::VersionMismatch { .. }
            | AuthError::Kdf(_) => {
                tracing::error!("Credential hashing error: {}", self);
                "Internal server error"
            }

            AuthError::Encryption(msg) => {
                tracing::error!("Encryption error: {}", msg);
                "Internal server error"
            }

            AuthError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error"
            }
        }
    }

    /// Whether this error represents an infrastructure failure rather than a
    /// rejected credential or token.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            AuthError::Io(_)
                | AuthError::KeyLoad(_)
                | AuthError::InvalidHashFormat(_)
                | AuthError::UnsupportedAlgorithm(_)
                | AuthError::VersionMismatch { .. }
                | AuthError::Kdf(_)
                | AuthError::Encryption(_)
                | AuthError::Internal(_)
        )
    }
}
