//! # Sealchat Core
//!
//! Message sealing for a small multi-user chat: every message carries a
//! digest, a ciphertext, a signature and the sender's certificate, so a
//! recipient can check confidentiality, integrity and authenticity before
//! trusting what it reads.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SEALCHAT CORE MODULES                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │  Identity   │  │   Storage   │  │  Pipeline   │  │   Metrics    │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - RSA keys  │  │ - Encrypted │  │ - Seal      │  │ - Sign/verify│   │
//! │  │ - X.509     │  │   container │  │ - Unseal    │  │   timings    │   │
//! │  │ - Handles   │  │ - Cache     │  │ - Async svc │  │ - CSV batches│   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘   │
//! │         │                │                │                │           │
//! │         └────────────────┴───────┬────────┴────────────────┘           │
//! │                                  │                                      │
//! │  ┌───────────────────────────────▼────────────────────────────────────┐ │
//! │  │                             Crypto                                 │ │
//! │  │                                                                    │ │
//! │  │  SHA-256 digest │ AES-256-CBC + PKCS#7 │ RSA-PSS │ HKDF container  │ │
//! │  └────────────────────────────────────────────────────────────────────┘ │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Pipeline configuration and defaults
//! - [`crypto`] - Digest, symmetric encryption, signatures, key derivation
//! - [`identity`] - Handles, RSA key pairs, self-signed certificates
//! - [`storage`] - Passphrase-protected identity containers on disk
//! - [`pipeline`] - Sealing and unsealing of messages
//! - [`metrics`] - Timing records for sign and verify operations
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY PROPERTIES                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Confidentiality: AES-256-CBC under a key shared by every participant   │
//! │  of one context. Outsiders cannot read; participants can read           │
//! │  each other.                                                            │
//! │                                                                         │
//! │  Integrity: SHA-256 of the plaintext travels with the message and is    │
//! │  recomputed after decryption.                                           │
//! │                                                                         │
//! │  Authenticity: RSA-PSS over the digest, checked against the public      │
//! │  key in the sender's self-signed certificate. There is no CA, so this   │
//! │  proves consistency with the attached certificate, not who the sender   │
//! │  really is.                                                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use sealchat_core::{CryptoContext, SealConfig};
//!
//! let ctx = CryptoContext::from_config(SealConfig::default())?;
//! let envelope = ctx.seal_provisioning("carlos", "Carlos", None, "hello")?;
//! let verdict = ctx.unseal(&envelope);
//! assert!(verdict.valid);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod pipeline;
pub mod storage;
/// Clock helpers and timestamp formats.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::{CertificateSubject, MetricsConfig, SealConfig};
pub use crypto::{PaddingPolicy, SharedKey};
pub use error::{Error, Result};
pub use identity::{Identity, IdentityCertificate, IdentitySummary};
pub use metrics::{MetricOperation, MetricRecord, MetricsRecorder};
pub use pipeline::{CryptoContext, Envelope, SealingService, UnsealFailure, UnsealState, Verdict};
pub use storage::IdentityStore;

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Sealchat Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
