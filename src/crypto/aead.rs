use crate::error::{AuthError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    AeadCore, XChaCha20Poly1305, XNonce,
};

/// The size of the XChaCha20-Poly1305 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the extended nonce in bytes. The wire format reads the nonce
/// from the front of the decoded bytes, so this constant lives only here.
const NONCE_SIZE: usize = 24;

/// Encrypts a claim field with XChaCha20-Poly1305.
///
/// # Returns
///
/// Standard base64 of `nonce || ciphertext || tag`.
pub fn seal_field(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<String> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| AuthError::Encryption(format!("Field encryption failed: {}", e)))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(out))
}

/// Decrypts a claim field produced by [`seal_field`].
///
/// Any failure, from base64 decoding to tag verification, is reported as
/// `ClaimDecryption` so the caller cannot distinguish tampering modes.
pub fn open_field(key: &[u8; KEY_SIZE], encoded: &str) -> Result<Vec<u8>> {
    let data = STANDARD
        .decode(encoded)
        .map_err(|_| AuthError::ClaimDecryption)?;
    if data.len() < NONCE_SIZE {
        return Err(AuthError::ClaimDecryption);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);

    XChaCha20Poly1305::new(key.into())
        .decrypt(nonce, ciphertext)
        .map_err(|_| AuthError::ClaimDecryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; KEY_SIZE] {
        [7u8; KEY_SIZE]
    }

    #[test]
    fn seal_and_open_round_trip() {
        let key = test_key();
        let sealed = seal_field(&key, b"user-1234").unwrap();
        assert_eq!(open_field(&key, &sealed).unwrap(), b"user-1234");
    }

    #[test]
    fn nonces_are_fresh_per_call() {
        let key = test_key();
        let a = seal_field(&key, b"same").unwrap();
        let b = seal_field(&key, b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn open_fails_with_wrong_key() {
        let sealed = seal_field(&test_key(), b"secret").unwrap();
        let err = open_field(&[8u8; KEY_SIZE], &sealed).unwrap_err();
        assert!(matches!(err, AuthError::ClaimDecryption));
    }

    #[test]
    fn open_rejects_truncated_and_garbage_input() {
        let key = test_key();
        assert!(matches!(
            open_field(&key, "not base64!!!").unwrap_err(),
            AuthError::ClaimDecryption
        ));
        assert!(matches!(
            open_field(&key, &STANDARD.encode([0u8; 8])).unwrap_err(),
            AuthError::ClaimDecryption
        ));
    }

    #[test]
    fn open_detects_ciphertext_tampering() {
        let key = test_key();
        let sealed = seal_field(&key, b"integrity").unwrap();
        let mut raw = STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let err = open_field(&key, &STANDARD.encode(raw)).unwrap_err();
        assert!(matches!(err, AuthError::ClaimDecryption));
    }
}
