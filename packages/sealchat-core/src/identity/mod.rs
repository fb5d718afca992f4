//! # Identity Module
//!
//! One identity per participant handle: an RSA key pair plus a self-signed
//! certificate binding the public half to a human-readable name.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         IDENTITY                                        │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  handle "carlos" ──────────────► <identity_dir>/carlos.identity         │
//! │                                                                         │
//! │  ┌────────────────────────────┐   ┌────────────────────────────────┐   │
//! │  │  RSA-2048 private key      │   │  X.509 certificate (PEM)       │   │
//! │  │                            │   │                                │   │
//! │  │  • signs message digests   │   │  • CN / email of participant   │   │
//! │  │  • never leaves the        │   │  • public key                  │   │
//! │  │    container               │   │  • valid for 365 days          │   │
//! │  └────────────────────────────┘   │  • travels in every envelope   │   │
//! │                                   └────────────────────────────────┘   │
//! │                                                                         │
//! │  Invariant: certificate public key == public half of private key      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Identities are created lazily on first use, never rotated or revoked, and
//! disappear only when their container file is deleted.

pub mod certificate;

use std::fmt;

use chrono::{DateTime, Utc};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::config::SealConfig;
use crate::crypto::{self, Signature};
use crate::error::{Error, Result};

pub use certificate::IdentityCertificate;

/// Maximum handle length
pub const MAX_HANDLE_LEN: usize = 64;

/// Check that a handle is safe to use as a container file name
///
/// Handles are 1..=64 characters of `[A-Za-z0-9_.-]` and must not start
/// with a dot.
pub fn validate_handle(handle: &str) -> Result<()> {
    if handle.is_empty() {
        return Err(Error::InvalidHandle("handle must not be empty".into()));
    }
    if handle.len() > MAX_HANDLE_LEN {
        return Err(Error::InvalidHandle(format!(
            "handle is longer than {} characters",
            MAX_HANDLE_LEN
        )));
    }
    if handle.starts_with('.') {
        return Err(Error::InvalidHandle(format!("'{}' starts with a dot", handle)));
    }
    if let Some(bad) = handle
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(Error::InvalidHandle(format!(
            "'{}' contains disallowed character {:?}",
            handle, bad
        )));
    }
    Ok(())
}

/// A participant identity: handle, private key and certificate
pub struct Identity {
    handle: String,
    certificate: IdentityCertificate,
    private_key: RsaPrivateKey,
}

impl Identity {
    /// Generate a fresh key pair and self-signed certificate
    ///
    /// This does not persist anything; see
    /// [`IdentityStore::generate`](crate::storage::IdentityStore::generate).
    pub fn generate(
        handle: &str,
        common_name: &str,
        email: Option<&str>,
        config: &SealConfig,
    ) -> Result<Self> {
        validate_handle(handle)?;

        let private_key = crypto::generate_private_key(config.key_bits)?;
        let certificate = IdentityCertificate::self_signed(
            &private_key,
            common_name,
            email,
            &config.subject,
            config.validity_days,
        )?;

        tracing::debug!(
            handle,
            bits = config.key_bits,
            serial = %certificate.serial_hex(),
            "Generated identity"
        );

        Ok(Self {
            handle: handle.to_string(),
            certificate,
            private_key,
        })
    }

    /// Reassemble an identity from stored parts
    ///
    /// Fails with `InvalidKey` if the certificate does not belong to the
    /// private key.
    pub fn from_parts(
        handle: &str,
        certificate: IdentityCertificate,
        private_key: RsaPrivateKey,
    ) -> Result<Self> {
        validate_handle(handle)?;
        if !certificate.matches_private_key(&private_key) {
            return Err(Error::InvalidKey(format!(
                "certificate for '{}' does not match its private key",
                handle
            )));
        }
        Ok(Self {
            handle: handle.to_string(),
            certificate,
            private_key,
        })
    }

    /// Participant handle
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Certificate common name
    pub fn common_name(&self) -> &str {
        self.certificate.common_name()
    }

    /// The identity's certificate
    pub fn certificate(&self) -> &IdentityCertificate {
        &self.certificate
    }

    /// Public key (same as the certificate's)
    pub fn public_key(&self) -> &RsaPublicKey {
        self.certificate.public_key()
    }

    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// Sign a hex digest with this identity's private key
    pub fn sign_digest(&self, digest_hex: &str) -> Result<Signature> {
        crypto::sign_digest(&self.private_key, digest_hex)
    }

    /// Shareable description of this identity
    pub fn summary(&self) -> Result<IdentitySummary> {
        IdentitySummary::from_certificate(&self.handle, &self.certificate)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("handle", &self.handle)
            .field("certificate", &self.certificate)
            .finish_non_exhaustive()
    }
}

/// Public description of an identity, safe to print or serialize
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentitySummary {
    /// Participant handle
    pub handle: String,
    /// Certificate common name
    pub common_name: String,
    /// Certificate email
    pub email: Option<String>,
    /// Full certificate subject
    pub subject: String,
    /// Serial number (hex)
    pub serial: String,
    /// Start of validity
    pub not_before: DateTime<Utc>,
    /// End of validity
    pub not_after: DateTime<Utc>,
    /// SHA-256 fingerprint of the certificate DER
    pub fingerprint: String,
}

impl IdentitySummary {
    /// Describe a certificate under the given handle
    pub fn from_certificate(handle: &str, certificate: &IdentityCertificate) -> Result<Self> {
        Ok(Self {
            handle: handle.to_string(),
            common_name: certificate.common_name().to_string(),
            email: certificate.email().map(str::to_string),
            subject: certificate.subject(),
            serial: certificate.serial_hex(),
            not_before: certificate.not_before(),
            not_after: certificate.not_after(),
            fingerprint: certificate.fingerprint()?,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
