//! Authenticated encryption of small payloads.
//!
//! # Algorithms
//!
//! - **Encryption**: ChaCha20-Poly1305 (authenticated encryption)
//! - **Nonce**: 12 random bytes per seal, never reused with a key
//! - **Associated data**: `casegate:v1:<org_id>`, so a payload moved to another
//!   organization fails authentication even if the keys were equal
//!
//! `open` fails closed: every malformed field, unknown key version or tag
//! mismatch is a `Decryption` error and no partial plaintext is returned.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::{CaseGateError, Result};

use super::keys::KeyResolver;

// =============================================================================
// Constants
// =============================================================================

/// Nonce length for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_LEN: usize = 12;

/// ChaCha20-Poly1305 auth tag length (16 bytes)
pub const TAG_LEN: usize = 16;

/// Serialized payload format version
pub const PAYLOAD_VERSION: u8 = 1;

const AAD_PREFIX: &str = "casegate:v1:";

// =============================================================================
// Payload
// =============================================================================

/// Sealed payload as stored on a case.
///
/// Byte fields are standard base64. The key itself is never part of the
/// payload, only its version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Payload format version
    pub v: u8,
    /// Organization key version that sealed this payload
    pub kid: u32,
    /// Nonce (base64)
    pub nonce: String,
    /// Ciphertext without the tag (base64)
    pub ciphertext: String,
    /// Poly1305 authentication tag (base64)
    pub tag: String,
}

impl EncryptedPayload {
    /// Serialize to the opaque string stored on the entity
    pub fn to_blob(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| CaseGateError::Internal(format!("Failed to encode payload: {}", e)))
    }

    /// Parse an opaque stored string
    pub fn from_blob(blob: &str) -> Result<Self> {
        serde_json::from_str(blob)
            .map_err(|e| CaseGateError::Decryption(format!("Malformed payload: {}", e)))
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Seals and opens payloads under organization-scoped keys
#[derive(Clone)]
pub struct EncryptionCodec {
    keys: Arc<dyn KeyResolver>,
}

impl EncryptionCodec {
    pub fn new(keys: Arc<dyn KeyResolver>) -> Self {
        Self { keys }
    }

    /// Encrypt `plaintext` for `org_id` with the current key version.
    pub fn seal(&self, org_id: &str, plaintext: &[u8]) -> Result<EncryptedPayload> {
        let kid = self.keys.current_version();
        let key = self.keys.resolve(org_id, kid)?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let aad = associated_data(org_id);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        let mut sealed = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|e| CaseGateError::Internal(format!("Encryption failed: {}", e)))?;

        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(EncryptedPayload {
            v: PAYLOAD_VERSION,
            kid,
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(&sealed),
            tag: BASE64.encode(&tag),
        })
    }

    /// Decrypt a payload sealed for `org_id`.
    ///
    /// # Errors
    ///
    /// Returns `Decryption` if:
    /// - The payload version, nonce or tag is malformed
    /// - The key version is unknown to the resolver
    /// - The payload was sealed for another organization or was tampered with
    pub fn open(&self, org_id: &str, payload: &EncryptedPayload) -> Result<Vec<u8>> {
        if payload.v != PAYLOAD_VERSION {
            return Err(CaseGateError::Decryption(format!(
                "Unsupported payload version {}",
                payload.v
            )));
        }

        let nonce = decode_field(&payload.nonce, "nonce")?;
        if nonce.len() != NONCE_LEN {
            return Err(CaseGateError::Decryption("Invalid nonce length".into()));
        }
        let tag = decode_field(&payload.tag, "tag")?;
        if tag.len() != TAG_LEN {
            return Err(CaseGateError::Decryption("Invalid tag length".into()));
        }
        let mut sealed = decode_field(&payload.ciphertext, "ciphertext")?;
        sealed.extend_from_slice(&tag);

        let key = self.keys.resolve(org_id, payload.kid)?;
        let aad = associated_data(org_id);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

        cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &sealed,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| CaseGateError::Decryption("Authentication failed".into()))
    }

    /// Seal a value serialized as JSON
    pub fn seal_json<T: Serialize>(&self, org_id: &str, value: &T) -> Result<EncryptedPayload> {
        let plaintext = serde_json::to_vec(value)
            .map_err(|e| CaseGateError::Internal(format!("Failed to encode JSON: {}", e)))?;
        self.seal(org_id, &plaintext)
    }

    /// Open a payload and parse the plaintext as JSON
    pub fn open_json<T: DeserializeOwned>(
        &self,
        org_id: &str,
        payload: &EncryptedPayload,
    ) -> Result<T> {
        let plaintext = self.open(org_id, payload)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| CaseGateError::Decryption(format!("Invalid plaintext JSON: {}", e)))
    }
}

fn associated_data(org_id: &str) -> String {
    format!("{}{}", AAD_PREFIX, org_id)
}

fn decode_field(value: &str, name: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|_| CaseGateError::Decryption(format!("Invalid base64 in {}", name)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sealing::keys::HkdfKeyResolver;
    use std::collections::BTreeMap;

    fn codec() -> EncryptionCodec {
        EncryptionCodec::new(Arc::new(HkdfKeyResolver::new(1, [42u8; 32])))
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let codec = codec();
        for plaintext in [
            &b""[..],
            &b"{}"[..],
            &br#"{"email":"reporter@example.org","phone":"+43 1 234"}"#[..],
            &[0u8, 255, 7, 128][..],
        ] {
            let payload = codec.seal("org-1", plaintext).unwrap();
            assert_eq!(codec.open("org-1", &payload).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_open_under_other_org_fails() {
        let codec = codec();
        let payload = codec.seal("org-1", b"secret").unwrap();
        assert!(matches!(
            codec.open("org-2", &payload),
            Err(CaseGateError::Decryption(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let codec = codec();
        let mut payload = codec.seal("org-1", b"secret contact").unwrap();
        let mut bytes = BASE64.decode(&payload.ciphertext).unwrap();
        bytes[0] ^= 0x01;
        payload.ciphertext = BASE64.encode(&bytes);

        assert!(matches!(
            codec.open("org-1", &payload),
            Err(CaseGateError::Decryption(_))
        ));
    }

    #[test]
    fn test_malformed_fields_fail() {
        let codec = codec();
        let good = codec.seal("org-1", b"x").unwrap();

        let mut bad_nonce = good.clone();
        bad_nonce.nonce = BASE64.encode([0u8; 4]);
        assert!(codec.open("org-1", &bad_nonce).is_err());

        let mut bad_tag = good.clone();
        bad_tag.tag = "!!!".into();
        assert!(codec.open("org-1", &bad_tag).is_err());

        let mut bad_version = good.clone();
        bad_version.v = 9;
        assert!(codec.open("org-1", &bad_version).is_err());

        let mut bad_kid = good;
        bad_kid.kid = 77;
        assert!(codec.open("org-1", &bad_kid).is_err());
    }

    #[test]
    fn test_nonce_unique_per_seal() {
        let codec = codec();
        let a = codec.seal("org-1", b"same").unwrap();
        let b = codec.seal("org-1", b"same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_blob_roundtrip_and_garbage() {
        let codec = codec();
        let payload = codec.seal("org-1", b"hello").unwrap();
        let blob = payload.to_blob().unwrap();
        assert_eq!(EncryptedPayload::from_blob(&blob).unwrap(), payload);
        assert!(EncryptedPayload::from_blob("not json").is_err());
    }

    #[test]
    fn test_rotation_keeps_old_payloads_readable() {
        let old_codec = EncryptionCodec::new(Arc::new(HkdfKeyResolver::new(1, [1u8; 32])));
        let payload = old_codec.seal("org-1", b"before rotation").unwrap();

        let mut retired = BTreeMap::new();
        retired.insert(1, [1u8; 32]);
        let rotated = EncryptionCodec::new(Arc::new(HkdfKeyResolver::with_retired(
            2, [2u8; 32], retired,
        )));

        assert_eq!(rotated.open("org-1", &payload).unwrap(), b"before rotation");
        assert_eq!(rotated.seal("org-1", b"after").unwrap().kid, 2);
    }
}
