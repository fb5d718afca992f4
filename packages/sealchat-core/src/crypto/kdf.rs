//! # Key Derivation
//!
//! Derives the AES-256-GCM key that protects an identity container from the
//! container passphrase.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 PASSPHRASE → CONTAINER KEY                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  passphrase ("password" by default)     salt (16 random bytes,          │
//! │        │                                  stored in the container)      │
//! │        └──────────────┬───────────────────────┘                         │
//! │                       ▼                                                 │
//! │  HKDF-SHA256(ikm = passphrase, salt = salt,                             │
//! │              info = "sealchat-identity-container-v1")                   │
//! │                       │                                                 │
//! │                       ▼                                                 │
//! │              32-byte AES-256-GCM key                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! HKDF is not a password hash. With the fixed demo passphrase the container
//! only keeps casual readers out; it is not a secret-management scheme.

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Size of the per-container salt in bytes
pub const SALT_SIZE: usize = 16;

/// Domain separation strings for HKDF
pub mod domain {
    /// Domain for identity container key derivation
    pub const IDENTITY_CONTAINER: &[u8] = b"sealchat-identity-container-v1";
}

/// Derive the container key for a passphrase and per-file salt
pub fn derive_container_key(passphrase: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    if salt.len() != SALT_SIZE {
        return Err(Error::KeyDerivationFailed(format!(
            "Salt must be {} bytes, got {}",
            SALT_SIZE,
            salt.len()
        )));
    }

    let hkdf = Hkdf::<Sha256>::new(Some(salt), passphrase.as_bytes());

    let mut key = Zeroizing::new([0u8; 32]);
    hkdf.expand(domain::IDENTITY_CONTAINER, &mut key[..])
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive container key".into()))?;

    Ok(key)
}

/// Short fingerprint of key material, safe to log
///
/// First 8 bytes of SHA-256, hex encoded.
pub fn key_fingerprint(key: &[u8]) -> String {
    let hash = Sha256::digest(key);
    hex::encode(&hash[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_key_deterministic() {
        let salt = [7u8; SALT_SIZE];
        let k1 = derive_container_key("password", &salt).unwrap();
        let k2 = derive_container_key("password", &salt).unwrap();
        assert_eq!(*k1, *k2);
    }

    #[test]
    fn test_container_key_depends_on_salt_and_passphrase() {
        let a = derive_container_key("password", &[1u8; SALT_SIZE]).unwrap();
        let b = derive_container_key("password", &[2u8; SALT_SIZE]).unwrap();
        let c = derive_container_key("hunter2", &[1u8; SALT_SIZE]).unwrap();
        assert_ne!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn test_container_key_rejects_short_salt() {
        let result = derive_container_key("password", &[0u8; 4]);
        assert!(matches!(result, Err(Error::KeyDerivationFailed(_))));
    }

    #[test]
    fn test_key_fingerprint() {
        let fp = key_fingerprint(&[0u8; 32]);
        assert_eq!(fp.len(), 16);
        assert_eq!(fp, key_fingerprint(&[0u8; 32]));
        assert_ne!(fp, key_fingerprint(&[1u8; 32]));
    }
}
