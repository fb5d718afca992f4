//! # Digital Signatures Module
//!
//! RSA-PSS signatures over message digests.
//!
//! ## What Gets Signed
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SIGNING INPUT                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  plaintext ──► SHA-256 ──► "2cf24dba...9824" (64 hex chars)            │
//! │                                   │                                     │
//! │                                   ▼  UTF-8 bytes of the hex text        │
//! │                      RSA-PSS(SHA-256, MGF1-SHA-256, max salt)           │
//! │                                   │                                     │
//! │                                   ▼                                     │
//! │                          signature (hex)                                │
//! │                                                                         │
//! │  Never the plaintext, never the ciphertext.                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The salt is as long as the key allows (`em_len - 32 - 2`), so PSS
//! signatures are randomized: signing the same digest twice yields two
//! different signatures, both valid.
//!
//! Verification returns a [`SignatureCheck`] instead of an error for the
//! expected negative outcomes (wrong key, corrupted or forged signature).
//! Only a key that cannot carry a PSS signature at all is an `Err`.

use rand::rngs::OsRng;
use rsa::pss::{BlindedSigningKey, Signature as PssSignature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, Result};

/// Output size of SHA-256 in bytes
const HASH_LEN: usize = 32;

/// Smallest modulus accepted for new keys
pub const MIN_KEY_BITS: usize = 1024;

/// Generate a fresh RSA private key (public exponent 65537)
pub fn generate_private_key(bits: usize) -> Result<RsaPrivateKey> {
    if bits < MIN_KEY_BITS {
        return Err(Error::KeyGenerationFailed(format!(
            "Key size {} is below the {} bit minimum",
            bits, MIN_KEY_BITS
        )));
    }
    RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| Error::KeyGenerationFailed(e.to_string()))
}

/// Maximum PSS salt length for a key, matching `PSS.MAX_LENGTH` semantics
pub fn max_salt_len(key: &impl PublicKeyParts) -> Result<usize> {
    let mod_bits = key.n().bits();
    let em_len = mod_bits.saturating_sub(1).div_ceil(8);
    em_len
        .checked_sub(HASH_LEN + 2)
        .filter(|len| *len > 0)
        .ok_or_else(|| Error::InvalidKey(format!("{} bit key is too small for PSS", mod_bits)))
}

/// An RSA-PSS signature
///
/// Length equals the signer's modulus size (256 bytes for RSA-2048).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "signature_hex")] Vec<u8>);

impl Signature {
    /// Create from raw bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Signature length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the signature is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode as lowercase hex
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Decode from hex
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| Error::InvalidKey(format!("Invalid signature hex: {}", e)))?;
        Ok(Self(bytes))
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Outcome of a signature verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    /// The signature verifies under the given key
    Valid,
    /// The signature does not verify; the string says why
    Invalid(String),
}

impl SignatureCheck {
    /// Whether the signature verified
    pub fn is_valid(&self) -> bool {
        matches!(self, SignatureCheck::Valid)
    }
}

/// Sign a hex digest with RSA-PSS
///
/// The signed message is the UTF-8 bytes of `digest_hex`.
pub fn sign_digest(private_key: &RsaPrivateKey, digest_hex: &str) -> Result<Signature> {
    let salt_len = max_salt_len(private_key)?;
    let signing_key = BlindedSigningKey::<Sha256>::new_with_salt_len(private_key.clone(), salt_len);

    let sig = signing_key
        .try_sign_with_rng(&mut OsRng, digest_hex.as_bytes())
        .map_err(|e| Error::SigningFailed(e.to_string()))?;

    Ok(Signature(sig.to_vec()))
}

/// Verify an RSA-PSS signature over a hex digest
///
/// `signature_hex` comes straight off the wire; bad hex is an invalid
/// signature, not an error.
pub fn verify_digest(
    public_key: &RsaPublicKey,
    digest_hex: &str,
    signature_hex: &str,
) -> Result<SignatureCheck> {
    let salt_len = max_salt_len(public_key)?;

    let signature = match Signature::from_hex(signature_hex) {
        Ok(sig) => sig,
        Err(_) => return Ok(SignatureCheck::Invalid("signature is not valid hex".into())),
    };

    Ok(verify_signature(public_key, salt_len, digest_hex, &signature))
}

fn verify_signature(
    public_key: &RsaPublicKey,
    salt_len: usize,
    digest_hex: &str,
    signature: &Signature,
) -> SignatureCheck {
    if signature.len() != public_key.size() {
        return SignatureCheck::Invalid(format!(
            "signature is {} bytes, key expects {}",
            signature.len(),
            public_key.size()
        ));
    }

    let pss = match PssSignature::try_from(signature.as_bytes()) {
        Ok(sig) => sig,
        Err(e) => return SignatureCheck::Invalid(format!("malformed signature: {}", e)),
    };

    let verifying_key = VerifyingKey::<Sha256>::new_with_salt_len(public_key.clone(), salt_len);
    match verifying_key.verify(digest_hex.as_bytes(), &pss) {
        Ok(()) => SignatureCheck::Valid,
        Err(_) => SignatureCheck::Invalid("signature does not match digest".into()),
    }
}

/// Serde helper for signature bytes
mod signature_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::digest;
    use once_cell::sync::Lazy;

    static ALICE: Lazy<RsaPrivateKey> = Lazy::new(|| generate_private_key(2048).unwrap());
    static BOB: Lazy<RsaPrivateKey> = Lazy::new(|| generate_private_key(2048).unwrap());

    #[test]
    fn test_sign_verify_round_trip() {
        let d = digest("hello");
        let sig = sign_digest(&ALICE, &d).unwrap();
        assert_eq!(sig.len(), 256);

        let check = verify_digest(&ALICE.to_public_key(), &d, &sig.to_hex()).unwrap();
        assert_eq!(check, SignatureCheck::Valid);
    }

    #[test]
    fn test_salt_len_for_2048() {
        assert_eq!(max_salt_len(&*ALICE).unwrap(), 222);
    }

    #[test]
    fn test_signatures_are_randomized() {
        let d = digest("hello");
        let a = sign_digest(&ALICE, &d).unwrap();
        let b = sign_digest(&ALICE, &d).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_is_invalid() {
        let d = digest("hello");
        let sig = sign_digest(&ALICE, &d).unwrap();
        let check = verify_digest(&BOB.to_public_key(), &d, &sig.to_hex()).unwrap();
        assert!(!check.is_valid());
    }

    #[test]
    fn test_other_digest_is_invalid() {
        let sig = sign_digest(&ALICE, &digest("hello")).unwrap();
        let check = verify_digest(&ALICE.to_public_key(), &digest("hello!"), &sig.to_hex()).unwrap();
        assert!(!check.is_valid());
    }

    #[test]
    fn test_flipped_byte_is_invalid() {
        let d = digest("hello");
        let sig = sign_digest(&ALICE, &d).unwrap();
        let public = ALICE.to_public_key();

        for idx in [0usize, 100, 255] {
            let mut bytes = sig.as_bytes().to_vec();
            bytes[idx] ^= 0x01;
            let check = verify_digest(&public, &d, &hex::encode(&bytes)).unwrap();
            assert!(!check.is_valid(), "flip at {}", idx);
        }
    }

    #[test]
    fn test_bad_hex_and_length_are_invalid() {
        let public = ALICE.to_public_key();
        let d = digest("hello");

        let check = verify_digest(&public, &d, "zz-not-hex").unwrap();
        assert!(matches!(check, SignatureCheck::Invalid(_)));

        let check = verify_digest(&public, &d, "abcd").unwrap();
        assert!(matches!(check, SignatureCheck::Invalid(_)));
    }

    #[test]
    fn test_small_key_rejected() {
        assert!(matches!(
            generate_private_key(512),
            Err(Error::KeyGenerationFailed(_))
        ));
    }

    #[test]
    fn test_signature_hex_round_trip() {
        let sig = Signature::from_bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(sig.to_hex(), "deadbeef");
        assert_eq!(Signature::from_hex("deadbeef").unwrap(), sig);

        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json, "\"deadbeef\"");
    }
}
