use crate::context::{real_ip, RequestContext};
use crate::crypto::aead::{self, KEY_SIZE};
use crate::error::{AuthError, Result};
use crate::keys::SigningKeyPair;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// The number of random bytes in a token id.
const JTI_SIZE: usize = 16;
/// How many bytes of the SHA-256 digest go into fingerprint and address
/// hashes.
const BINDING_HASH_SIZE: usize = 16;

/// The token-type discriminator carried in the `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// A short-lived access token.
    Access,
    /// A long-lived refresh token.
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT claims with encrypted identity fields.
///
/// `uid_enc` and `rol_enc` are AEAD ciphertexts, so a token at rest never
/// reveals who it belongs to; the signature still covers them for integrity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecureClaims {
    /// Encrypted user id.
    #[serde(rename = "uid_enc")]
    pub user_id_enc: String,
    /// Encrypted role (access tokens only).
    #[serde(rename = "rol_enc", default, skip_serializing_if = "Option::is_none")]
    pub role_enc: Option<String>,
    /// Token-type discriminator.
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Device fingerprint hash.
    #[serde(rename = "fp")]
    pub fingerprint: String,
    /// Client address hash.
    #[serde(rename = "iph")]
    pub address_hash: String,
    /// Issuer.
    pub iss: String,
    /// Subject; carries the user-id ciphertext, never the plaintext id.
    pub sub: String,
    /// Unique token id.
    pub jti: String,
    /// Issued-at (seconds since epoch).
    pub iat: i64,
    /// Not-before (seconds since epoch).
    pub nbf: i64,
    /// Expiry (seconds since epoch).
    pub exp: i64,

    /// Decrypted user id, populated after validation. Never serialized.
    #[serde(skip)]
    pub user_id: String,
    /// Decrypted role, populated after access-token validation. Never
    /// serialized.
    #[serde(skip)]
    pub role: String,
}

/// An issued access/refresh token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// The signed access token.
    pub access_token: String,
    /// The signed refresh token.
    pub refresh_token: String,
    /// The token scheme, always `Bearer`.
    pub token_type: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    /// The access token expiry timestamp.
    pub expires_at: DateTime<Utc>,
}

/// The outcome of a successful token validation.
#[derive(Debug, Clone)]
pub struct TokenValidation {
    /// The verified claims with decrypted identity fields populated.
    pub claims: SecureClaims,
    /// Whether the caller's address hash differs from the one bound at
    /// issuance. Advisory only; network addresses legitimately change.
    pub address_changed: bool,
}

/// Token Engine configuration.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// The issuer string stamped into every token.
    pub issuer: String,
    /// Access token lifetime.
    pub access_ttl: Duration,
    /// Refresh token lifetime.
    pub refresh_ttl: Duration,
    /// Salt mixed into client address hashes.
    pub address_salt: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "authkit".to_string(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            address_salt: "authkit-address-salt".to_string(),
        }
    }
}

/// Issues and validates ES256-signed token pairs with encrypted subject
/// fields and device/network binding.
pub struct TokenEngine {
    keys: SigningKeyPair,
    encryption_key: Zeroizing<[u8; KEY_SIZE]>,
    config: TokenConfig,
}

impl TokenEngine {
    /// Creates a Token Engine from loaded key material.
    pub fn new(
        keys: SigningKeyPair,
        encryption_key: Zeroizing<[u8; KEY_SIZE]>,
        config: TokenConfig,
    ) -> Self {
        Self {
            keys,
            encryption_key,
            config,
        }
    }

    /// Issues a bound access/refresh token pair for a verified user.
    ///
    /// The user id is encrypted into both tokens; the role only into the
    /// access token. Both tokens are bound to the caller's device
    /// fingerprint and hashed network address.
    pub fn issue_token_pair(
        &self,
        user_id: &str,
        username: &str,
        role: &str,
        ctx: &dyn RequestContext,
    ) -> Result<TokenPair> {
        let now = Utc::now();
        let fingerprint = self.fingerprint(ctx);
        let address_hash = self.address_hash(&real_ip(ctx));

        let user_id_enc = aead::seal_field(&self.encryption_key, user_id.as_bytes())?;
        let role_enc = aead::seal_field(&self.encryption_key, role.as_bytes())?;

        let access_expires = now + self.config.access_ttl;
        let access_claims = SecureClaims {
            user_id_enc: user_id_enc.clone(),
            role_enc: Some(role_enc),
            token_type: TokenType::Access,
            fingerprint: fingerprint.clone(),
            address_hash: address_hash.clone(),
            iss: self.config.issuer.clone(),
            sub: user_id_enc.clone(),
            jti: generate_jti(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: access_expires.timestamp(),
            user_id: String::new(),
            role: String::new(),
        };

        let refresh_claims = SecureClaims {
            user_id_enc: user_id_enc.clone(),
            role_enc: None,
            token_type: TokenType::Refresh,
            fingerprint,
            address_hash,
            iss: self.config.issuer.clone(),
            sub: user_id_enc,
            jti: generate_jti(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + self.config.refresh_ttl).timestamp(),
            user_id: String::new(),
            role: String::new(),
        };

        let header = Header::new(Algorithm::ES256);
        let access_token = encode(&header, &access_claims, self.keys.encoding())
            .map_err(|e| AuthError::Internal(format!("access token signing: {}", e)))?;
        let refresh_token = encode(&header, &refresh_claims, self.keys.encoding())
            .map_err(|e| AuthError::Internal(format!("refresh token signing: {}", e)))?;

        tracing::debug!("Issued token pair for {}", username);

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_ttl.num_seconds(),
            expires_at: access_expires,
        })
    }

    /// Validates an access token and returns its claims with the user id
    /// and role decrypted.
    pub fn validate_access_token(
        &self,
        token: &str,
        ctx: &dyn RequestContext,
    ) -> Result<TokenValidation> {
        self.validate(token, TokenType::Access, ctx)
    }

    /// Validates a refresh token and returns its claims with the user id
    /// decrypted.
    pub fn validate_refresh_token(
        &self,
        token: &str,
        ctx: &dyn RequestContext,
    ) -> Result<TokenValidation> {
        self.validate(token, TokenType::Refresh, ctx)
    }

    fn validate(
        &self,
        token: &str,
        expected: TokenType,
        ctx: &dyn RequestContext,
    ) -> Result<TokenValidation> {
        let mut validation = Validation::new(Algorithm::ES256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.validate_aud = false;

        let data = decode::<SecureClaims>(token, self.keys.decoding(), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                    AuthError::AlgorithmMismatch
                }
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::ImmatureSignature => AuthError::NotYetValid,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::MalformedToken(e.to_string()),
            })?;
        let mut claims = data.claims;

        if claims.token_type != expected {
            return Err(AuthError::WrongTokenType {
                expected: expected.to_string(),
                found: claims.token_type.to_string(),
            });
        }

        let user_id = aead::open_field(&self.encryption_key, &claims.user_id_enc)?;
        claims.user_id =
            String::from_utf8(user_id).map_err(|_| AuthError::ClaimDecryption)?;

        if expected == TokenType::Access {
            let role_enc = claims.role_enc.as_deref().ok_or(AuthError::ClaimDecryption)?;
            let role = aead::open_field(&self.encryption_key, role_enc)?;
            claims.role = String::from_utf8(role).map_err(|_| AuthError::ClaimDecryption)?;
        }

        if claims.fingerprint != self.fingerprint(ctx) {
            return Err(AuthError::FingerprintMismatch);
        }

        // Address changes are reported, not rejected: mobile and proxied
        // clients change networks mid-session.
        let address_changed = claims.address_hash != self.address_hash(&real_ip(ctx));
        if address_changed {
            tracing::warn!(
                user_id = %claims.user_id,
                "client address hash changed since token issuance"
            );
        }

        Ok(TokenValidation {
            claims,
            address_changed,
        })
    }

    /// Hashes the stable client request characteristics into a device
    /// fingerprint.
    pub fn fingerprint(&self, ctx: &dyn RequestContext) -> String {
        let mut hasher = Sha256::new();
        for header in ["User-Agent", "Accept-Language", "Accept-Encoding"] {
            hasher.update(ctx.header_value(header).unwrap_or_default().as_bytes());
        }
        let digest = hasher.finalize();
        STANDARD.encode(&digest[..BINDING_HASH_SIZE])
    }

    /// Hashes a client network address with the configured salt.
    pub fn address_hash(&self, ip: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(ip.as_bytes());
        hasher.update(self.config.address_salt.as_bytes());
        let digest = hasher.finalize();
        STANDARD.encode(&digest[..BINDING_HASH_SIZE])
    }
}

fn generate_jti() -> String {
    let mut bytes = [0u8; JTI_SIZE];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}
