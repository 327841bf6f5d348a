use crate::error::{AuthError, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// The PHC algorithm identifier this hasher emits and accepts.
const ALGORITHM_ID: &str = "argon2id";
/// The Argon2 version encoded into the PHC string.
const ARGON2_VERSION: u32 = Version::V0x13 as u32;
/// The size of the generated salt in bytes.
const SALT_SIZE: usize = 32;

/// Tunable Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordParams {
    /// The number of iterations.
    pub time_cost: u32,
    /// The memory cost in KiB.
    pub memory_kib: u32,
    /// The degree of parallelism.
    pub parallelism: u32,
    /// The length of the derived key in bytes.
    pub output_len: usize,
}

impl Default for PasswordParams {
    fn default() -> Self {
        Self {
            time_cost: 3,
            memory_kib: 64 * 1024,
            parallelism: 4,
            output_len: 32,
        }
    }
}

/// Derives and verifies password hashes encoded as PHC strings.
///
/// The encoded form is
/// `$argon2id$v=19$m=<KiB>,t=<time>,p=<parallelism>$<b64-salt>$<b64-hash>`
/// with unpadded standard base64, so the stored value is self-describing and
/// verification always uses the parameters the hash was created with.
#[derive(Debug, Clone, Default)]
pub struct CredentialHasher {
    params: PasswordParams,
}

impl CredentialHasher {
    /// Creates a hasher with explicit cost parameters.
    pub fn new(params: PasswordParams) -> Self {
        Self { params }
    }

    /// Hashes a password with a fresh random salt.
    ///
    /// # Returns
    ///
    /// A `Result` containing the PHC-encoded hash.
    pub fn hash(&self, password: &str) -> Result<String> {
        let mut password_bytes = password.as_bytes().to_vec();

        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);

        let mut derived = vec![0u8; self.params.output_len];
        let result = derive_key(&password_bytes, &salt, &self.params, &mut derived);
        password_bytes.zeroize();
        result?;

        let encoded = format!(
            "${}$v={}$m={},t={},p={}${}${}",
            ALGORITHM_ID,
            ARGON2_VERSION,
            self.params.memory_kib,
            self.params.time_cost,
            self.params.parallelism,
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(&derived),
        );

        tracing::debug!("Password hashed with Argon2id");
        Ok(encoded)
    }

    /// Verifies a password against a PHC-encoded hash.
    ///
    /// The derived and stored keys are compared in constant time. Malformed
    /// or incompatible encodings are reported as errors, never as a failed
    /// match.
    pub fn verify(&self, password: &str, encoded: &str) -> Result<bool> {
        let record = PhcRecord::parse(encoded)?;

        let mut password_bytes = password.as_bytes().to_vec();
        let mut derived = vec![0u8; record.hash.len()];
        let result = derive_key(&password_bytes, &record.salt, &record.params, &mut derived);
        password_bytes.zeroize();
        result?;

        Ok(derived.ct_eq(&record.hash).into())
    }
}

/// A parsed PHC record: parameters, salt and derived key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhcRecord {
    /// The cost parameters the hash was created with.
    pub params: PasswordParams,
    /// The salt.
    pub salt: Vec<u8>,
    /// The derived key.
    pub hash: Vec<u8>,
}

impl PhcRecord {
    /// Parses a PHC string, rejecting anything outside the exact six-field
    /// grammar.
    pub fn parse(encoded: &str) -> Result<Self> {
        let parts: Vec<&str> = encoded.split('$').collect();
        if parts.len() != 6 || !parts[0].is_empty() {
            return Err(AuthError::InvalidHashFormat(
                "expected six $-delimited fields".to_string(),
            ));
        }

        if parts[1] != ALGORITHM_ID {
            return Err(AuthError::UnsupportedAlgorithm(parts[1].to_string()));
        }

        let version: u32 = parts[2]
            .strip_prefix("v=")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| AuthError::InvalidHashFormat("bad version field".to_string()))?;
        if version != ARGON2_VERSION {
            return Err(AuthError::VersionMismatch {
                expected: ARGON2_VERSION,
                found: version,
            });
        }

        let cost_fields: Vec<&str> = parts[3].split(',').collect();
        if cost_fields.len() != 3 {
            return Err(AuthError::InvalidHashFormat(
                "expected m=,t=,p= cost fields".to_string(),
            ));
        }
        let memory_kib = parse_cost(cost_fields[0], "m=")?;
        let time_cost = parse_cost(cost_fields[1], "t=")?;
        let parallelism = parse_cost(cost_fields[2], "p=")?;

        let salt = STANDARD_NO_PAD
            .decode(parts[4])
            .map_err(|_| AuthError::InvalidHashFormat("bad salt encoding".to_string()))?;
        let hash = STANDARD_NO_PAD
            .decode(parts[5])
            .map_err(|_| AuthError::InvalidHashFormat("bad hash encoding".to_string()))?;

        Ok(Self {
            params: PasswordParams {
                time_cost,
                memory_kib,
                parallelism,
                output_len: hash.len(),
            },
            salt,
            hash,
        })
    }

    /// Encodes the record back into its PHC string form.
    pub fn encode(&self) -> String {
        format!(
            "${}$v={}$m={},t={},p={}${}${}",
            ALGORITHM_ID,
            ARGON2_VERSION,
            self.params.memory_kib,
            self.params.time_cost,
            self.params.parallelism,
            STANDARD_NO_PAD.encode(&self.salt),
            STANDARD_NO_PAD.encode(&self.hash),
        )
    }
}

fn parse_cost(field: &str, prefix: &str) -> Result<u32> {
    field
        .strip_prefix(prefix)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| AuthError::InvalidHashFormat(format!("bad cost field: {}", field)))
}

fn derive_key(
    password: &[u8],
    salt: &[u8],
    params: &PasswordParams,
    out: &mut [u8],
) -> Result<()> {
    let argon_params = Params::new(
        params.memory_kib,
        params.time_cost,
        params.parallelism,
        Some(params.output_len),
    )
    .map_err(|e| AuthError::Kdf(format!("Argon2 params: {}", e)))?;

    Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params)
        .hash_password_into(password, salt, out)
        .map_err(|e| AuthError::Kdf(format!("Argon2 derivation: {}", e)))
}
