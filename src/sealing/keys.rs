//! Per-organization key resolution.
//!
//! The codec never sees root secrets; it asks a [`KeyResolver`] for the key of
//! an organization at a given version. [`HkdfKeyResolver`] is the built-in
//! resolver; a KMS-backed resolver can implement the same trait.

use std::collections::BTreeMap;

use dashmap::DashMap;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::types::{CaseGateError, Result};

const KDF_INFO_PREFIX: &[u8] = b"casegate.org-contact-key.v1:";
const KDF_SALT: &[u8] = b"casegate.kdf.salt.v1";

/// 256-bit organization key, wiped on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OrgKey([u8; 32]);

impl OrgKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Source of organization-scoped encryption keys
pub trait KeyResolver: Send + Sync {
    /// Version used for new seals
    fn current_version(&self) -> u32;

    /// Key for `org_id` at `version`; unknown versions are an error
    fn resolve(&self, org_id: &str, version: u32) -> Result<OrgKey>;
}

/// HKDF-SHA256 derivation from versioned root secrets.
///
/// Derived keys are cached per (version, org) because the sweep opens many
/// payloads of the same organization in a row.
pub struct HkdfKeyResolver {
    current_version: u32,
    roots: BTreeMap<u32, RootSecret>,
    cache: DashMap<(u32, String), OrgKey>,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct RootSecret([u8; 32]);

impl HkdfKeyResolver {
    /// Create a resolver with only the current root secret
    pub fn new(current_version: u32, root: [u8; 32]) -> Self {
        Self::with_retired(current_version, root, BTreeMap::new())
    }

    /// Create a resolver that can still open payloads sealed under retired roots
    pub fn with_retired(
        current_version: u32,
        root: [u8; 32],
        retired: BTreeMap<u32, [u8; 32]>,
    ) -> Self {
        let mut roots: BTreeMap<u32, RootSecret> = retired
            .into_iter()
            .map(|(version, bytes)| (version, RootSecret(bytes)))
            .collect();
        roots.insert(current_version, RootSecret(root));

        Self {
            current_version,
            roots,
            cache: DashMap::new(),
        }
    }

    fn derive(&self, org_id: &str, version: u32) -> Result<OrgKey> {
        let root = self.roots.get(&version).ok_or_else(|| {
            CaseGateError::Decryption(format!("Unknown key version {}", version))
        })?;

        let mut info = Vec::with_capacity(KDF_INFO_PREFIX.len() + org_id.len());
        info.extend_from_slice(KDF_INFO_PREFIX);
        info.extend_from_slice(org_id.as_bytes());

        let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), &root.0);
        let mut okm = [0u8; 32];
        hk.expand(&info, &mut okm)
            .map_err(|e| CaseGateError::Internal(format!("HKDF expand failed: {:?}", e)))?;

        let key = OrgKey(okm);
        okm.zeroize();
        Ok(key)
    }
}

impl KeyResolver for HkdfKeyResolver {
    fn current_version(&self) -> u32 {
        self.current_version
    }

    fn resolve(&self, org_id: &str, version: u32) -> Result<OrgKey> {
        if org_id.is_empty() {
            return Err(CaseGateError::Validation("Organization id is required".into()));
        }

        let cache_key = (version, org_id.to_string());
        if let Some(key) = self.cache.get(&cache_key) {
            return Ok(key.clone());
        }

        let key = self.derive(org_id, version)?;
        self.cache.insert(cache_key, key.clone());
        Ok(key)
    }
}
