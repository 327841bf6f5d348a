use crate::context::{real_ip, RequestContext};
use crate::crypto::password::CredentialHasher;
use crate::error::{AuthError, Result};
use crate::models::session::{Session, SessionMetadata};
use crate::models::user::{NewUser, User};
use crate::repositories::user::UserDirectory;
use crate::session::SessionStore;
use crate::token::{TokenEngine, TokenPair};
use crate::validation::auth::{validate_email, validate_password, validate_username};
use serde::Deserialize;
use std::sync::Arc;

/// A signup request.
#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    /// The requested username.
    pub username: String,
    /// The user's email address.
    pub email: String,
    /// The user's password.
    pub password: String,
    /// Roles to grant the new user.
    #[serde(default)]
    pub roles: Vec<String>,
}

/// A login request.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// The user's email address.
    pub email: String,
    /// The user's password.
    pub password: String,
}

/// A successful login: the issued tokens and the server-side session of
/// record.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// The issued token pair.
    pub tokens: TokenPair,
    /// The created session.
    pub session: Session,
}

/// Orchestrates the credential hasher, token engine and session store over
/// the external user directory.
pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    hasher: CredentialHasher,
    tokens: TokenEngine,
    sessions: Arc<SessionStore>,
}

impl AuthService {
    /// Creates the service from its already-constructed parts.
    pub fn new(
        users: Arc<dyn UserDirectory>,
        hasher: CredentialHasher,
        tokens: TokenEngine,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
            sessions,
        }
    }

    /// The session store, for liveness checks and administrative removal.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// The token engine, for validating tokens on authenticated requests.
    pub fn tokens(&self) -> &TokenEngine {
        &self.tokens
    }

    /// Registers a new user.
    pub async fn signup(&self, req: SignupRequest) -> Result<User> {
        validate_username(&req.username)?;
        validate_email(&req.email)?;
        validate_password(&req.password)?;

        if self.users.find_user_by_email(&req.email).await?.is_some() {
            return Err(AuthError::AlreadyExists(
                "a user with this email already exists".to_string(),
            ));
        }

        let password_hash = self.hasher.hash(&req.password)?;
        let roles = if req.roles.is_empty() {
            vec!["developer".to_string()]
        } else {
            req.roles
        };

        let user = self
            .users
            .create_user(NewUser {
                username: req.username,
                email: req.email,
                password_hash,
                roles,
            })
            .await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Verifies credentials, then issues a token pair and creates the
    /// session of record.
    ///
    /// Unknown email and wrong password collapse into the same
    /// `Authentication` error; infrastructure failures propagate distinctly
    /// so operators can tell them apart.
    pub async fn login(
        &self,
        req: LoginRequest,
        ctx: &dyn RequestContext,
    ) -> Result<LoginOutcome> {
        let user = match self.users.find_user_by_email(&req.email).await? {
            Some(user) => user,
            None => {
                return Err(AuthError::Authentication(
                    "unknown email".to_string(),
                ));
            }
        };

        if !self.hasher.verify(&req.password, &user.password_hash)? {
            return Err(AuthError::Authentication(
                "password mismatch".to_string(),
            ));
        }

        let tokens = self.tokens.issue_token_pair(
            &user.id.to_string(),
            &user.username,
            user.primary_role(),
            ctx,
        )?;

        let session = self.sessions.create(
            &user,
            SessionMetadata {
                ip_address: real_ip(ctx),
                user_agent: ctx
                    .header_value("User-Agent")
                    .unwrap_or_default()
                    .to_string(),
                mfa_verified: false,
            },
        )?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(LoginOutcome { tokens, session })
    }

    /// Exchanges a valid refresh token for a fresh token pair.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        ctx: &dyn RequestContext,
    ) -> Result<TokenPair> {
        let validated = self.tokens.validate_refresh_token(refresh_token, ctx)?;

        let user_id = validated
            .claims
            .user_id
            .parse()
            .map_err(|_| AuthError::Authentication("malformed user id in token".to_string()))?;
        let user = self
            .users
            .find_user_by_id(&user_id)
            .await?
            .ok_or_else(|| AuthError::Authentication("unknown user".to_string()))?;

        self.tokens.issue_token_pair(
            &user.id.to_string(),
            &user.username,
            user.primary_role(),
            ctx,
        )
    }

    /// Destroys a session.
    pub async fn logout(&self, session_id: &str) -> Result<()> {
        self.sessions.remove(session_id)
    }
}
