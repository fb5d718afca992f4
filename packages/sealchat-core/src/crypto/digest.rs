//! SHA-256 message digests.
//!
//! The digest is the integrity token of an envelope: computed over the
//! plaintext before encryption and carried as 64 lowercase hex characters.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest
pub const DIGEST_HEX_LEN: usize = 64;

/// Hex-encoded SHA-256 digest of a text message
pub fn digest(message: &str) -> String {
    digest_bytes(message.as_bytes())
}

/// Hex-encoded SHA-256 digest of raw bytes
pub fn digest_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compare a claimed digest against the digest of `message`
///
/// The comparison is on the exact hex text, so a claimed digest in a
/// different case does not match.
pub fn matches(message: &str, claimed: &str) -> bool {
    digest(message) == claimed
}
