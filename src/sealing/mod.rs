//! Field-level sealing of reporter contact details
//!
//! # Architecture
//!
//! Contact details are the only identifying reporter data casegate may hold,
//! and only when the reporter opts in. They are sealed per field rather than
//! per row, so case metadata stays queryable:
//! - Each organization gets its own 256-bit key, derived from a versioned
//!   root secret with HKDF-SHA256 (`keys`)
//! - Payloads are sealed with ChaCha20-Poly1305 and bound to the organization
//!   through associated data (`codec`)
//! - The payload records the key version, so root secrets can rotate while
//!   older payloads remain readable

pub mod codec;
pub mod contact;
pub mod keys;

pub use codec::{EncryptedPayload, EncryptionCodec, NONCE_LEN, PAYLOAD_VERSION, TAG_LEN};
pub use contact::ReporterContact;
pub use keys::{HkdfKeyResolver, KeyResolver, OrgKey};
