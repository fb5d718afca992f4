//! # Encryption Module
//!
//! AES-256-CBC with PKCS#7 padding for message confidentiality.
//!
//! ## Blob Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       CIPHERTEXT BLOB (base64)                          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────┬──────────────────────────────────────────────┐   │
//! │  │  IV (16 bytes)   │  AES-256-CBC(PKCS#7(plaintext))              │   │
//! │  │  fresh per call  │  n × 16 bytes, n >= 1                        │   │
//! │  └──────────────────┴──────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  PKCS#7 always adds 1..=16 bytes, each holding the pad length, so an   │
//! │  already aligned plaintext gains a whole block.                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Notes
//!
//! CBC is unauthenticated. Tampering is caught one layer up by the digest
//! and the signature, not here. The [`SharedKey`] is a single process-wide
//! secret used for every participant: it keeps outside observers out, it does
//! not give participants confidentiality from each other.
//!
//! ## Padding Policy
//!
//! [`PaddingPolicy::Strict`] rejects any pad length outside `1..=16` or pad
//! bytes that disagree with it. [`PaddingPolicy::Lenient`] trusts the last
//! byte the way older chat clients did: a declared length of zero or one
//! that covers the whole buffer strips everything, and the pad bytes
//! themselves are never checked.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cbc::cipher::{
    block_padding::{NoPadding, Pkcs7},
    BlockDecryptMut, BlockEncryptMut, KeyIvInit,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use super::kdf::key_fingerprint;
use crate::error::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Size of the CBC initialization vector in bytes (128 bits)
pub const IV_SIZE: usize = 16;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Size of the shared key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// How decryption treats the trailing pad bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddingPolicy {
    /// Reject malformed PKCS#7 padding
    #[default]
    Strict,
    /// Trust the last byte as the pad length without validation
    Lenient,
}

impl std::str::FromStr for PaddingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(PaddingPolicy::Strict),
            "lenient" => Ok(PaddingPolicy::Lenient),
            other => Err(Error::Internal(format!("Unknown padding policy: {}", other))),
        }
    }
}

/// A CBC initialization vector
///
/// A fresh random IV is drawn for every encryption; reusing one under the
/// same key leaks whether two messages share a prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Iv([u8; IV_SIZE]);

impl Iv {
    /// Generate a cryptographically random IV
    pub fn random() -> Self {
        let mut bytes = [0u8; IV_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; IV_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.0
    }
}

/// The process-wide AES-256 key
///
/// Generated once at startup, held only in memory and zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SharedKey([u8; KEY_SIZE]);

impl SharedKey {
    /// Generate a fresh random key from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            Error::InvalidKey(format!(
                "Shared key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Short fingerprint for logs; never log the key itself
    pub fn fingerprint(&self) -> String {
        key_fingerprint(&self.0)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedKey").field(&self.fingerprint()).finish()
    }
}

/// Encrypt plaintext bytes into a base64 `IV ‖ ciphertext` blob
pub fn encrypt(key: &SharedKey, plaintext: &[u8]) -> Result<String> {
    let iv = Iv::random();
    encrypt_with_iv(key, &iv, plaintext)
}

/// Encrypt with a caller-chosen IV
///
/// Only useful for deterministic fixtures. Never reuse an IV for real traffic.
pub fn encrypt_with_iv(key: &SharedKey, iv: &Iv, plaintext: &[u8]) -> Result<String> {
    let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), iv.as_bytes())
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key or IV: {}", e)))?;

    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut blob = Vec::with_capacity(IV_SIZE + ciphertext.len());
    blob.extend_from_slice(iv.as_bytes());
    blob.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(blob))
}

/// Decrypt a base64 blob back into raw plaintext bytes
///
/// ## Errors
///
/// Returns `DecryptionFailed` if:
/// - The blob is not valid base64
/// - The decoded blob is shorter than IV + one block, or not block aligned
/// - The padding is malformed (strict policy only)
pub fn decrypt_bytes(key: &SharedKey, blob: &str, policy: PaddingPolicy) -> Result<Vec<u8>> {
    let data = BASE64
        .decode(blob.trim())
        .map_err(|e| Error::DecryptionFailed(format!("Invalid base64: {}", e)))?;

    if data.len() < IV_SIZE + BLOCK_SIZE {
        return Err(Error::DecryptionFailed(format!(
            "Blob too short: {} bytes",
            data.len()
        )));
    }
    if (data.len() - IV_SIZE) % BLOCK_SIZE != 0 {
        return Err(Error::DecryptionFailed(format!(
            "Ciphertext is not block aligned: {} bytes",
            data.len() - IV_SIZE
        )));
    }

    let (iv, ciphertext) = data.split_at(IV_SIZE);
    let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| Error::DecryptionFailed(format!("Invalid key or IV: {}", e)))?;

    match policy {
        PaddingPolicy::Strict => cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| Error::DecryptionFailed("Invalid padding".into())),
        PaddingPolicy::Lenient => {
            let mut padded = cipher
                .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
                .map_err(|_| Error::DecryptionFailed("Block decryption failed".into()))?;
            let keep = lenient_unpad_len(&padded);
            padded.truncate(keep);
            Ok(padded)
        }
    }
}

/// Decrypt a base64 blob back into UTF-8 text
pub fn decrypt(key: &SharedKey, blob: &str, policy: PaddingPolicy) -> Result<String> {
    let bytes = decrypt_bytes(key, blob, policy)?;
    String::from_utf8(bytes)
        .map_err(|_| Error::DecryptionFailed("Plaintext is not valid UTF-8".into()))
}

// Length left after trusting the last byte as the pad length.
fn lenient_unpad_len(padded: &[u8]) -> usize {
    match padded.last() {
        None => 0,
        Some(&pad) => {
            let pad = pad as usize;
            if pad == 0 || pad >= padded.len() {
                0
            } else {
                padded.len() - pad
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SharedKey {
        SharedKey::from_bytes([42u8; KEY_SIZE])
    }

    fn decoded_len(blob: &str) -> usize {
        BASE64.decode(blob).unwrap().len()
    }

    #[test]
    fn test_encrypt_decrypt_basic() {
        let blob = encrypt(&key(), b"Hello, World!").unwrap();
        let text = decrypt(&key(), &blob, PaddingPolicy::Strict).unwrap();
        assert_eq!(text, "Hello, World!");
    }

    #[test]
    fn test_padding_boundaries() {
        for len in [0usize, 1, 15, 16, 17, 10_000] {
            let plaintext = vec![b'a'; len];
            let blob = encrypt(&key(), &plaintext).unwrap();

            // PKCS#7 always adds at least one byte
            let expected = IV_SIZE + (len / BLOCK_SIZE + 1) * BLOCK_SIZE;
            assert_eq!(decoded_len(&blob), expected, "len {}", len);

            let strict = decrypt_bytes(&key(), &blob, PaddingPolicy::Strict).unwrap();
            let lenient = decrypt_bytes(&key(), &blob, PaddingPolicy::Lenient).unwrap();
            assert_eq!(strict, plaintext, "strict len {}", len);
            assert_eq!(lenient, plaintext, "lenient len {}", len);
        }
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let a = encrypt(&key(), b"same message").unwrap();
        let b = encrypt(&key(), b"same message").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fixed_iv_is_deterministic() {
        let iv = Iv::from_bytes([9u8; IV_SIZE]);
        let a = encrypt_with_iv(&key(), &iv, b"fixture").unwrap();
        let b = encrypt_with_iv(&key(), &iv, b"fixture").unwrap();
        assert_eq!(a, b);
        assert_eq!(&BASE64.decode(&a).unwrap()[..IV_SIZE], iv.as_bytes());
    }

    #[test]
    fn test_multibyte_text() {
        let message = "Olá, Manaus! 🔐 Ünïcödé";
        let blob = encrypt(&key(), message.as_bytes()).unwrap();
        assert_eq!(decrypt(&key(), &blob, PaddingPolicy::Strict).unwrap(), message);
    }

    #[test]
    fn test_wrong_key_fails_strict() {
        let blob = encrypt(&key(), b"Hello, World!").unwrap();
        let other = SharedKey::from_bytes([7u8; KEY_SIZE]);
        let recovered = decrypt(&other, &blob, PaddingPolicy::Strict).ok();
        assert_ne!(recovered.as_deref(), Some("Hello, World!"));
    }

    #[test]
    fn test_invalid_base64_fails() {
        let result = decrypt(&key(), "not base64 at all!!", PaddingPolicy::Strict);
        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
    }

    #[test]
    fn test_truncated_blob_fails() {
        let blob = encrypt(&key(), b"Hello, World!").unwrap();
        let mut data = BASE64.decode(&blob).unwrap();

        data.truncate(IV_SIZE + 8);
        let misaligned = BASE64.encode(&data);
        assert!(decrypt_bytes(&key(), &misaligned, PaddingPolicy::Lenient).is_err());

        data.truncate(IV_SIZE);
        let iv_only = BASE64.encode(&data);
        assert!(decrypt_bytes(&key(), &iv_only, PaddingPolicy::Lenient).is_err());
    }

    #[test]
    fn test_strict_rejects_bad_padding_lenient_strips() {
        // Encrypt an aligned block with no padding so the last byte is 0x00
        let iv = Iv::from_bytes([1u8; IV_SIZE]);
        let cipher = Aes256CbcEnc::new_from_slices(key().as_bytes(), iv.as_bytes()).unwrap();
        let ciphertext = cipher.encrypt_padded_vec_mut::<NoPadding>(&[0u8; BLOCK_SIZE]);
        let mut blob = iv.as_bytes().to_vec();
        blob.extend_from_slice(&ciphertext);
        let blob = BASE64.encode(blob);

        assert!(decrypt_bytes(&key(), &blob, PaddingPolicy::Strict).is_err());
        assert_eq!(
            decrypt_bytes(&key(), &blob, PaddingPolicy::Lenient).unwrap(),
            Vec::<u8>::new()
        );
    }

    #[test]
    fn test_lenient_unpad_len() {
        assert_eq!(lenient_unpad_len(&[]), 0);
        assert_eq!(lenient_unpad_len(&[b'a', b'b', 2, 2]), 2);
        // Pad bytes are not checked
        assert_eq!(lenient_unpad_len(&[b'a', b'b', 9, 2]), 2);
        // Zero or oversized declared length strips everything
        assert_eq!(lenient_unpad_len(&[b'a', b'b', 0]), 0);
        assert_eq!(lenient_unpad_len(&[b'a', 200]), 0);
    }

    #[test]
    fn test_shared_key_from_slice() {
        assert!(SharedKey::from_slice(&[0u8; 32]).is_ok());
        assert!(matches!(
            SharedKey::from_slice(&[0u8; 16]),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_shared_key_debug_hides_bytes() {
        let k = SharedKey::from_bytes([0xAB; KEY_SIZE]);
        let debug = format!("{:?}", k);
        assert!(debug.contains(&k.fingerprint()));
        assert!(!debug.contains("abababab"));
    }

    #[test]
    fn test_padding_policy_parse() {
        assert_eq!("strict".parse::<PaddingPolicy>().unwrap(), PaddingPolicy::Strict);
        assert_eq!("Lenient".parse::<PaddingPolicy>().unwrap(), PaddingPolicy::Lenient);
        assert!("loose".parse::<PaddingPolicy>().is_err());
    }
}
