use crate::session::SessionConfig;
use crate::token::TokenConfig;
use anyhow::{Context, Result};
use chrono::Duration;
use std::env;
use std::path::PathBuf;

/// The crate's configuration, assembled from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the P-256 signing key lives on disk.
    pub signing_key_path: PathBuf,
    /// Where the XChaCha20-Poly1305 key lives on disk.
    pub encryption_key_path: PathBuf,
    /// Token Engine settings.
    pub token: TokenConfig,
    /// Session Store settings.
    pub session: SessionConfig,
}

impl Config {
    /// Reads configuration from the environment, falling back to the
    /// defaults of [`TokenConfig`] and [`SessionConfig`]. A `.env` file is
    /// honored when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let token = TokenConfig {
            issuer: env::var("AUTH_ISSUER").unwrap_or_else(|_| "authkit".to_string()),
            access_ttl: Duration::minutes(
                env_parse("ACCESS_TOKEN_TTL_MINUTES", 15)?,
            ),
            refresh_ttl: Duration::days(env_parse("REFRESH_TOKEN_TTL_DAYS", 7)?),
            address_salt: env::var("ADDRESS_HASH_SALT")
                .unwrap_or_else(|_| "authkit-address-salt".to_string()),
        };

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            max_sessions: env_parse("MAX_SESSIONS", defaults.max_sessions)?,
            max_user_sessions: env_parse("MAX_USER_SESSIONS", defaults.max_user_sessions)?,
            session_ttl: Duration::hours(env_parse("SESSION_TTL_HOURS", 24)?),
            cleanup_interval: std::time::Duration::from_secs(
                env_parse("SESSION_CLEANUP_MINUTES", 5u64)? * 60,
            ),
            inactivity_timeout: Duration::minutes(env_parse(
                "SESSION_INACTIVITY_MINUTES",
                30,
            )?),
            extend_on_activity: env_parse("SESSION_EXTEND_ON_ACTIVITY", true)?,
            concurrent_sessions: env_parse("SESSION_CONCURRENT", true)?,
        };

        Ok(Self {
            signing_key_path: env::var("SIGNING_KEY_PATH")
                .unwrap_or_else(|_| "signing_key.pem".to_string())
                .into(),
            encryption_key_path: env::var("ENCRYPTION_KEY_PATH")
                .unwrap_or_else(|_| "encryption_key.bin".to_string())
                .into(),
            token,
            session,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}
