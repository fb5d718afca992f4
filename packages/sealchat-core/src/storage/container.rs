//! # Identity Container
//!
//! Password-protected file format holding one identity.
//!
//! ```text
//! <identity_dir>/<handle>.identity
//!
//! {
//!   "version": 1,
//!   "handle": "carlos",                 // also the AES-GCM associated data
//!   "salt": "<hex, 16 bytes>",          // HKDF salt
//!   "nonce": "<hex, 12 bytes>",         // AES-GCM nonce
//!   "ciphertext": "<base64>"            // AES-256-GCM(payload)
//! }
//!
//! payload = { "certificate": "<PEM>", "private_key": "<PKCS#8 PEM>" }
//! ```
//!
//! A wrong passphrase, a renamed file or any flipped byte fails the GCM tag
//! check and surfaces as `StorageCorrupted`.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{derive_container_key, SALT_SIZE};
use crate::error::{Error, Result};
use crate::identity::{Identity, IdentityCertificate};

/// Current container format version
pub const CONTAINER_VERSION: u32 = 1;

/// File extension of identity containers
pub const CONTAINER_EXTENSION: &str = "identity";

/// Size of the AES-GCM nonce in bytes (96 bits)
const NONCE_SIZE: usize = 12;

#[derive(Debug, Serialize, Deserialize)]
struct ContainerFile {
    version: u32,
    handle: String,
    salt: String,
    nonce: String,
    ciphertext: String,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct ContainerPayload {
    certificate: String,
    private_key: String,
}

/// Serialize and encrypt an identity into container bytes
pub fn seal_identity(identity: &Identity, passphrase: &str) -> Result<Vec<u8>> {
    let private_key = identity
        .private_key()
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::InvalidKey(format!("Failed to encode private key: {}", e)))?;

    let payload = ContainerPayload {
        certificate: identity.certificate().to_pem().to_string(),
        private_key: private_key.to_string(),
    };
    let plaintext = Zeroizing::new(serde_json::to_vec(&payload)?);

    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let key = derive_container_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext.as_slice(),
                aad: identity.handle().as_bytes(),
            },
        )
        .map_err(|e| Error::EncryptionFailed(format!("Container encryption failed: {}", e)))?;

    let file = ContainerFile {
        version: CONTAINER_VERSION,
        handle: identity.handle().to_string(),
        salt: hex::encode(salt),
        nonce: hex::encode(nonce),
        ciphertext: BASE64.encode(ciphertext),
    };

    Ok(serde_json::to_vec_pretty(&file)?)
}

/// Decrypt container bytes back into an identity
///
/// `expected_handle` is the handle the file was looked up by; a container
/// written for another handle is rejected.
pub fn open_identity(bytes: &[u8], passphrase: &str, expected_handle: &str) -> Result<Identity> {
    let file: ContainerFile = serde_json::from_slice(bytes)
        .map_err(|e| Error::StorageCorrupted(format!("Unreadable container: {}", e)))?;

    if file.version != CONTAINER_VERSION {
        return Err(Error::StorageCorrupted(format!(
            "Unsupported container version {}",
            file.version
        )));
    }
    if file.handle != expected_handle {
        return Err(Error::StorageCorrupted(format!(
            "Container belongs to '{}', not '{}'",
            file.handle, expected_handle
        )));
    }

    let salt = decode_hex_field("salt", &file.salt, SALT_SIZE)?;
    let nonce = decode_hex_field("nonce", &file.nonce, NONCE_SIZE)?;
    let ciphertext = BASE64
        .decode(&file.ciphertext)
        .map_err(|e| Error::StorageCorrupted(format!("Invalid ciphertext encoding: {}", e)))?;

    let key = derive_container_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| Error::DecryptionFailed(format!("Invalid key: {}", e)))?;

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &ciphertext,
                aad: file.handle.as_bytes(),
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| {
            Error::StorageCorrupted("Wrong passphrase or tampered container".into())
        })?;

    let payload: ContainerPayload = serde_json::from_slice(&plaintext)
        .map_err(|e| Error::StorageCorrupted(format!("Invalid container payload: {}", e)))?;

    let certificate = IdentityCertificate::from_pem(&payload.certificate)
        .map_err(|e| Error::StorageCorrupted(e.to_string()))?;
    let private_key = RsaPrivateKey::from_pkcs8_pem(&payload.private_key)
        .map_err(|e| Error::StorageCorrupted(format!("Invalid private key: {}", e)))?;

    Identity::from_parts(&file.handle, certificate, private_key)
        .map_err(|e| Error::StorageCorrupted(e.to_string()))
}

fn decode_hex_field(name: &str, value: &str, len: usize) -> Result<Vec<u8>> {
    let bytes = hex::decode(value)
        .map_err(|e| Error::StorageCorrupted(format!("Invalid {} encoding: {}", name, e)))?;
    if bytes.len() != len {
        return Err(Error::StorageCorrupted(format!(
            "{} must be {} bytes, got {}",
            name,
            len,
            bytes.len()
        )));
    }
    Ok(bytes)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SealConfig;
    use once_cell::sync::Lazy;

    static IDENTITY: Lazy<Identity> = Lazy::new(|| {
        Identity::generate("carlos", "Carlos", Some("carlos@uea.edu.br"), &SealConfig::default())
            .unwrap()
    });

    #[test]
    fn test_seal_open_round_trip() {
        let bytes = seal_identity(&IDENTITY, "password").unwrap();
        let opened = open_identity(&bytes, "password", "carlos").unwrap();

        assert_eq!(opened.handle(), "carlos");
        assert_eq!(opened.certificate(), IDENTITY.certificate());
        assert_eq!(opened.public_key(), IDENTITY.public_key());
    }

    #[test]
    fn test_container_does_not_leak_key_material() {
        let bytes = seal_identity(&IDENTITY, "password").unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("PRIVATE KEY"));
        assert!(!text.contains("CERTIFICATE"));
        assert!(text.contains("\"handle\": \"carlos\""));
    }

    #[test]
    fn test_wrong_passphrase_is_corrupted() {
        let bytes = seal_identity(&IDENTITY, "password").unwrap();
        let result = open_identity(&bytes, "hunter2", "carlos");
        assert!(matches!(result, Err(Error::StorageCorrupted(_))));
    }

    #[test]
    fn test_wrong_handle_is_corrupted() {
        let bytes = seal_identity(&IDENTITY, "password").unwrap();
        let result = open_identity(&bytes, "password", "ana");
        assert!(matches!(result, Err(Error::StorageCorrupted(_))));
    }

    #[test]
    fn test_swapped_handle_fails_tag_check() {
        let bytes = seal_identity(&IDENTITY, "password").unwrap();
        let mut file: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        file["handle"] = serde_json::Value::String("ana".into());
        let bytes = serde_json::to_vec(&file).unwrap();

        let result = open_identity(&bytes, "password", "ana");
        assert!(matches!(result, Err(Error::StorageCorrupted(_))));
    }

    #[test]
    fn test_tampered_ciphertext_is_corrupted() {
        let bytes = seal_identity(&IDENTITY, "password").unwrap();
        let mut file: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let mut ct = BASE64.decode(file["ciphertext"].as_str().unwrap()).unwrap();
        ct[10] ^= 0x01;
        file["ciphertext"] = serde_json::Value::String(BASE64.encode(ct));
        let bytes = serde_json::to_vec(&file).unwrap();

        let result = open_identity(&bytes, "password", "carlos");
        assert!(matches!(result, Err(Error::StorageCorrupted(_))));
    }

    #[test]
    fn test_garbage_is_corrupted() {
        let result = open_identity(b"not json", "password", "carlos");
        assert!(matches!(result, Err(Error::StorageCorrupted(_))));
    }

    #[test]
    fn test_unknown_version_is_corrupted() {
        let bytes = seal_identity(&IDENTITY, "password").unwrap();
        let mut file: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        file["version"] = serde_json::Value::from(99);
        let bytes = serde_json::to_vec(&file).unwrap();

        let result = open_identity(&bytes, "password", "carlos");
        assert!(matches!(result, Err(Error::StorageCorrupted(_))));
    }
}
