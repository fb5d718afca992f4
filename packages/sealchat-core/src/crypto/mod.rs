//! # Cryptography Module
//!
//! The three primitives the sealing pipeline composes, plus the key
//! derivation used by identity containers.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC BUILDING BLOCKS                        │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐          │
//! │  │   INTEGRITY     │  │ CONFIDENTIALITY │  │  AUTHENTICITY   │          │
//! │  │                 │  │                 │  │                 │          │
//! │  │  SHA-256        │  │  AES-256-CBC    │  │  RSA-2048 PSS   │          │
//! │  │  hex digest     │  │  PKCS#7, IV     │  │  over the hex   │          │
//! │  │  of plaintext   │  │  prefix, base64 │  │  digest         │          │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘          │
//! │       digest.rs          encryption.rs         signing.rs              │
//! │                                                                         │
//! │  kdf.rs: HKDF-SHA256 passphrase → identity container key               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose | Notes |
//! |-----------|---------|-------|
//! | SHA-256 | Digest | Lowercase hex, 64 chars |
//! | AES-256-CBC | Encryption | One shared key per process |
//! | RSA-PSS | Signing | MGF1-SHA-256, maximum salt |
//! | AES-256-GCM + HKDF | Identity containers | Demo passphrase |
//!
//! Randomness comes from `rand::rngs::OsRng` everywhere. Nothing here is
//! constant-time beyond what the underlying RustCrypto crates provide.

mod digest;
mod encryption;
mod kdf;
mod signing;

pub use digest::{digest, digest_bytes, matches as digest_matches, DIGEST_HEX_LEN};
pub use encryption::{
    decrypt, decrypt_bytes, encrypt, encrypt_with_iv, Iv, PaddingPolicy, SharedKey, BLOCK_SIZE,
    IV_SIZE, KEY_SIZE,
};
pub use kdf::{derive_container_key, key_fingerprint, SALT_SIZE};
pub use signing::{
    generate_private_key, max_salt_len, sign_digest, verify_digest, Signature, SignatureCheck,
    MIN_KEY_BITS,
};

/// Default RSA modulus size in bits
pub const DEFAULT_KEY_BITS: usize = 2048;
