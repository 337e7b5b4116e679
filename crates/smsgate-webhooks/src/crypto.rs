//! Cryptographic operations for webhook secrets and payload signing.
//!
//! - Secret generation with the operating system CSPRNG
//! - AES-256-GCM encryption/decryption for subscription secrets at rest
//! - HMAC-SHA256 signatures over the exact callback body bytes

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::WebhookError;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Key size for AES-256-GCM.
const KEY_BYTES: usize = 32;

/// Bytes of entropy in a generated signing secret (hex-encoded to 64 chars).
const SECRET_BYTES: usize = 32;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Secret generation
// ---------------------------------------------------------------------------

/// Generate a fresh signing secret: 32 CSPRNG bytes as lowercase hex.
#[must_use]
pub fn generate_secret() -> String {
    use rand::rngs::OsRng;
    use rand::RngCore;

    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ---------------------------------------------------------------------------
// AES-256-GCM encryption/decryption (for secrets at rest)
// ---------------------------------------------------------------------------

/// Seal a plaintext secret for DB storage.
///
/// The stored form is `base64(nonce || ciphertext || tag)`, one fresh
/// nonce per encryption.
pub fn encrypt_secret(plaintext: &str, key: &[u8]) -> Result<String, WebhookError> {
    let cipher = cipher_for(key)?;
    let nonce = random_nonce();

    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|e| WebhookError::EncryptionFailed(format!("sealing secret failed: {e}")))?;

    let mut stored = nonce.to_vec();
    stored.extend_from_slice(&sealed);
    Ok(BASE64.encode(stored))
}

/// Open a stored secret back to plaintext.
pub fn decrypt_secret(encoded: &str, key: &[u8]) -> Result<String, WebhookError> {
    let cipher = cipher_for(key)?;

    let stored = BASE64.decode(encoded).map_err(|e| {
        WebhookError::EncryptionFailed(format!("stored secret is not valid base64: {e}"))
    })?;
    if stored.len() <= NONCE_SIZE {
        return Err(WebhookError::EncryptionFailed(
            "stored secret is truncated".to_string(),
        ));
    }

    let (nonce, sealed) = stored.split_at(NONCE_SIZE);
    let opened = cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|e| WebhookError::EncryptionFailed(format!("opening secret failed: {e}")))?;

    String::from_utf8(opened).map_err(|e| {
        WebhookError::EncryptionFailed(format!("decrypted secret is not UTF-8: {e}"))
    })
}

/// AES-256-GCM wants exactly a 32-byte key; anything else is a deployment
/// error worth failing loudly on.
fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, WebhookError> {
    if key.len() != KEY_BYTES {
        return Err(WebhookError::EncryptionFailed(format!(
            "encryption key must be {KEY_BYTES} bytes, got {}",
            key.len()
        )));
    }
    Aes256Gcm::new_from_slice(key).map_err(|e| WebhookError::EncryptionFailed(e.to_string()))
}

fn random_nonce() -> [u8; NONCE_SIZE] {
    use rand::rngs::OsRng;
    use rand::RngCore;

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

// ---------------------------------------------------------------------------
// HMAC-SHA256 payload signing
// ---------------------------------------------------------------------------

/// Compute the HMAC-SHA256 signature for a callback body.
///
/// The signature commits to the exact bytes sent on the wire, nothing else.
/// Returns the lowercase-hex digest carried in `X-Webhook-Signature`.
#[must_use]
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");

    mac.update(body);

    hex::encode(mac.finalize().into_bytes())
}

/// Verify a received signature using constant-time comparison.
///
/// This is the receiver-side recipe:
/// `hex(HMAC_SHA256(secret, raw_request_body)) == header`.
#[must_use]
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let computed = compute_signature(secret, body);
    constant_time_eq(signature_hex.as_bytes(), computed.as_bytes())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        [0x42u8; 32]
    }

    // --- Secret generation ---

    #[test]
    fn test_generated_secret_is_64_hex_chars() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(secret, secret.to_lowercase());
    }

    #[test]
    fn test_generated_secrets_differ() {
        assert_ne!(generate_secret(), generate_secret());
    }

    // --- AES-GCM ---

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let plaintext = generate_secret();

        let encrypted = encrypt_secret(&plaintext, &key).expect("encryption failed");
        let decrypted = decrypt_secret(&encrypted, &key).expect("decryption failed");

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_different_encryptions_produce_different_ciphertext() {
        let key = test_key();
        let plaintext = "same-secret";

        let enc1 = encrypt_secret(plaintext, &key).expect("encryption failed");
        let enc2 = encrypt_secret(plaintext, &key).expect("encryption failed");

        // Random nonce makes ciphertexts differ
        assert_ne!(enc1, enc2);

        assert_eq!(
            decrypt_secret(&enc1, &key).unwrap(),
            decrypt_secret(&enc2, &key).unwrap()
        );
    }

    #[test]
    fn test_invalid_key_length() {
        let short_key = [0u8; 16];
        let result = encrypt_secret("test", &short_key);
        assert!(result.is_err());
    }

    #[test]
    fn test_decrypt_with_wrong_key() {
        let key1 = [0x42u8; 32];
        let key2 = [0x43u8; 32];

        let encrypted = encrypt_secret("secret", &key1).expect("encryption failed");
        assert!(decrypt_secret(&encrypted, &key2).is_err());
    }

    #[test]
    fn test_decrypt_invalid_base64() {
        let key = test_key();
        assert!(decrypt_secret("not-valid-base64!!!", &key).is_err());
    }

    #[test]
    fn test_decrypt_too_short() {
        let key = test_key();
        let short = BASE64.encode([0u8; 5]);
        assert!(decrypt_secret(&short, &key).is_err());
    }

    // --- HMAC-SHA256 ---

    #[test]
    fn test_signature_deterministic() {
        let sig1 = compute_signature("secret", b"payload");
        let sig2 = compute_signature("secret", b"payload");
        assert_eq!(sig1, sig2);
    }

    #[test]
    fn test_signature_changes_with_different_secret() {
        assert_ne!(
            compute_signature("secret1", b"payload"),
            compute_signature("secret2", b"payload")
        );
    }

    #[test]
    fn test_signature_changes_with_different_body() {
        assert_ne!(
            compute_signature("secret", b"payload1"),
            compute_signature("secret", b"payload2")
        );
    }

    #[test]
    fn test_signature_is_lowercase_hex() {
        let sig = compute_signature("secret", b"payload");
        // SHA256 = 32 bytes = 64 hex chars
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(sig, sig.to_lowercase());
    }

    #[test]
    fn test_signature_covers_body_only() {
        // Same body must sign identically regardless of when it is signed.
        let body = br#"{"id":"x1"}"#;
        let sig = compute_signature("s3cr3t", body);
        assert!(verify_signature("s3cr3t", body, &sig));
    }

    #[test]
    fn test_verify_signature_valid() {
        let secret = "my-webhook-secret";
        let body = b"test-body";

        let sig = compute_signature(secret, body);
        assert!(verify_signature(secret, body, &sig));
    }

    #[test]
    fn test_verify_signature_invalid() {
        assert!(!verify_signature("secret", b"payload", "invalid-hex"));
    }

    #[test]
    fn test_verify_signature_wrong_secret() {
        let sig = compute_signature("secret-a", b"payload");
        assert!(!verify_signature("secret-b", b"payload", &sig));
    }
}
