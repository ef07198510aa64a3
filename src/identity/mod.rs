//! Case identity: case ids, case keys and key digests.
//!
//! # Formats
//!
//! - **Case id**: 128 random bits rendered as upper-case hex in five groups
//!   (`8-4-4-4-12`), e.g. `9F3A61C2-04D7-4B1E-A9C0-5E2F7D18B634`
//! - **Case key**: 256 random bits, base64url without padding (43 chars)
//! - **Digest**: SHA-256 over a domain-separated key, lower-case hex (64 chars)
//!
//! Ids and keys come from independent draws of the OS CSPRNG, so knowing one
//! says nothing about the other.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

// =============================================================================
// Constants
// =============================================================================

/// Random bytes behind a case id (128 bits)
pub const CASE_ID_BYTES: usize = 16;

/// Random bytes behind a case key (256 bits)
pub const CASE_KEY_BYTES: usize = 32;

/// Hex characters per case id group
pub const CASE_ID_GROUPS: [usize; 5] = [8, 4, 4, 4, 12];

/// Length of a hex-encoded digest
pub const DIGEST_HEX_LEN: usize = 64;

const DIGEST_DOMAIN: &[u8] = b"casegate.case-key.v1:";

/// Digest compared against when no case exists, so the miss path does the
/// same hashing and comparison work as a wrong key.
const ABSENT_DIGEST: [u8; 32] = [0u8; 32];

// =============================================================================
// Types
// =============================================================================

/// Public, display-safe case identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    /// Parse user input into a case id.
    ///
    /// Accepts surrounding whitespace and lower-case hex; returns `None` for
    /// anything that is not the five-group format.
    pub fn parse(input: &str) -> Option<Self> {
        let normalized = input.trim().to_ascii_uppercase();
        let groups: Vec<&str> = normalized.split('-').collect();
        if groups.len() != CASE_ID_GROUPS.len() {
            return None;
        }

        let well_formed = groups.iter().zip(CASE_ID_GROUPS).all(|(group, len)| {
            group.len() == len && group.bytes().all(|b| b.is_ascii_hexdigit())
        });

        well_formed.then_some(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reporter secret, shown once at creation and never stored
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct CaseKey(String);

impl CaseKey {
    /// Wrap a key presented by a reporter
    pub fn from_presented(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_string())
    }

    /// Expose the key text (for the one-time creation response)
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CaseKey(<redacted>)")
    }
}

// =============================================================================
// Generation
// =============================================================================

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate a new case id from 128 bits of OS randomness.
///
/// Uniqueness is enforced by the store's unique index, not here.
pub fn generate_case_id() -> CaseId {
    let encoded = hex::encode_upper(random_bytes::<CASE_ID_BYTES>());

    let mut out = String::with_capacity(encoded.len() + CASE_ID_GROUPS.len() - 1);
    let mut offset = 0;
    for (i, len) in CASE_ID_GROUPS.iter().enumerate() {
        if i > 0 {
            out.push('-');
        }
        out.push_str(&encoded[offset..offset + len]);
        offset += len;
    }

    CaseId(out)
}

/// Generate a new case key from 256 bits of OS randomness.
pub fn generate_case_key() -> CaseKey {
    let mut bytes = random_bytes::<CASE_KEY_BYTES>();
    let key = CaseKey(URL_SAFE_NO_PAD.encode(bytes));
    bytes.zeroize();
    key
}

// =============================================================================
// Digest / Verification
// =============================================================================

fn digest_bytes(key: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(DIGEST_DOMAIN);
    hasher.update(key.as_bytes());
    hasher.finalize().into()
}

/// Deterministic one-way digest of a case key, lower-case hex.
pub fn hash_case_key(key: &CaseKey) -> String {
    hex::encode(digest_bytes(key.expose()))
}

/// Check a presented key against a stored digest in constant time.
pub fn verify(presented: &CaseKey, stored_digest: &str) -> bool {
    verify_against(presented, Some(stored_digest))
}

/// Verify against an optional digest.
///
/// `None` (no such case) runs the same hash and comparison as a wrong key and
/// returns `false`, keeping the two outcomes indistinguishable in timing.
pub fn verify_against(presented: &CaseKey, stored_digest: Option<&str>) -> bool {
    let computed = digest_bytes(presented.expose());

    let (expected, known) = match stored_digest.and_then(decode_digest) {
        Some(bytes) => (bytes, true),
        None => (ABSENT_DIGEST, false),
    };

    constant_time_eq(&computed, &expected) & known
}

fn decode_digest(digest: &str) -> Option<[u8; 32]> {
    if digest.len() != DIGEST_HEX_LEN {
        return None;
    }
    hex::decode(digest).ok()?.try_into().ok()
}

/// Constant-time byte comparison to prevent timing attacks
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_case_id_format() {
        for _ in 0..100 {
            let id = generate_case_id();
            let groups: Vec<&str> = id.as_str().split('-').collect();
            let lens: Vec<usize> = groups.iter().map(|g| g.len()).collect();
            assert_eq!(lens, CASE_ID_GROUPS.to_vec());
            assert!(id
                .as_str()
                .chars()
                .all(|c| c == '-' || c.is_ascii_digit() || c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_case_id_no_collisions() {
        let ids: HashSet<CaseId> = (0..10_000).map(|_| generate_case_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_case_id_parse_normalizes() {
        let id = generate_case_id();
        let lowered = format!("  {}  ", id.as_str().to_ascii_lowercase());
        assert_eq!(CaseId::parse(&lowered), Some(id));

        assert!(CaseId::parse("not-a-case-id").is_none());
        assert!(CaseId::parse("9F3A61C2-04D7-4B1E-A9C0").is_none());
        assert!(CaseId::parse("9F3A61C2-04D7-4B1E-A9C0-5E2F7D18B63Z").is_none());
    }

    #[test]
    fn test_case_key_shape() {
        for _ in 0..100 {
            let key = generate_case_key();
            assert!(key.expose().len() >= 30);
            assert!(!key.expose().contains('='));
            assert!(!key.expose().contains('+'));
            assert!(!key.expose().contains('/'));
        }
    }

    #[test]
    fn test_case_key_debug_redacted() {
        let key = generate_case_key();
        assert!(!format!("{:?}", key).contains(key.expose()));
    }

    #[test]
    fn test_hash_deterministic() {
        let key = generate_case_key();
        let h1 = hash_case_key(&key);
        let h2 = hash_case_key(&key);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), DIGEST_HEX_LEN);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));

        let other = generate_case_key();
        assert_ne!(h1, hash_case_key(&other));
    }

    #[test]
    fn test_verify() {
        for _ in 0..20 {
            let key = generate_case_key();
            let other = generate_case_key();
            assert!(verify(&key, &hash_case_key(&key)));
            assert!(!verify(&key, &hash_case_key(&other)));
        }
    }

    #[test]
    fn test_verify_absent_or_malformed_digest() {
        let key = generate_case_key();
        assert!(!verify_against(&key, None));
        assert!(!verify(&key, "abc"));
        assert!(!verify(&key, &"0".repeat(DIGEST_HEX_LEN)));
    }

    #[test]
    fn test_presented_key_trimmed() {
        let key = generate_case_key();
        let presented = CaseKey::from_presented(format!(" {}\n", key.expose()));
        assert!(verify(&presented, &hash_case_key(&key)));
    }
}
