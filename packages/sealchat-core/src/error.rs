//! # Error Handling
//!
//! Error types for the sealchat core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Identity Errors                                                   │
//! │  │   ├── IdentityNotFound      - No container for this handle          │
//! │  │   ├── InvalidHandle         - Handle unusable as a file name        │
//! │  │   ├── KeyGenerationFailed   - RSA key generation failed             │
//! │  │   ├── KeyDerivationFailed   - Container key derivation failed       │
//! │  │   └── CertificateError      - Certificate build/parse failure       │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── EncryptionFailed      - Encryption operation failed           │
//! │  │   ├── DecryptionFailed      - Confidentiality could not hold        │
//! │  │   ├── IntegrityMismatch     - Digest does not match plaintext       │
//! │  │   ├── SigningFailed         - Signing operation failed              │
//! │  │   ├── VerificationFailed    - Signature did not verify              │
//! │  │   └── InvalidKey            - Invalid key format/length             │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │   ├── StorageReadError      - Failed to read a container            │
//! │  │   ├── StorageWriteError     - Failed to write a container           │
//! │  │   └── StorageCorrupted      - Wrong passphrase or tampered file     │
//! │  │                                                                      │
//! │  ├── Pipeline Errors                                                   │
//! │  │   ├── Timeout               - Asymmetric operation took too long    │
//! │  │   └── InvalidEnvelope       - Envelope could not be read            │
//! │  │                                                                      │
//! │  └── Internal Errors                                                   │
//! │      ├── SerializationError    - JSON / CSV encoding failure           │
//! │      └── Internal              - Unexpected failure                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Unsealing never surfaces these errors: a rejected envelope is a
//! [`Verdict`](crate::pipeline::Verdict), not an `Err`. The variants here are
//! for the sealing side, identity provisioning and storage.

use thiserror::Error;

/// Result type alias for sealchat core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sealchat core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Identity Errors (200-299)
    // ========================================================================

    /// No identity container exists for the handle
    #[error("No identity found for handle '{0}'. Provision an identity and retry.")]
    IdentityNotFound(String),

    /// Handle is empty, too long or contains characters unsafe for a file name
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// RSA key generation failed
    #[error("Failed to generate key pair: {0}")]
    KeyGenerationFailed(String),

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    /// Certificate could not be built or parsed
    #[error("Certificate error: {0}")]
    CertificateError(String),

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (bad key, corrupted or truncated blob, bad padding)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Recomputed digest does not match the claimed one
    ///
    /// Unsealing reports this through the verdict's integrity detail.
    #[error("Integrity check failed: expected {expected}, computed {computed}")]
    IntegrityMismatch {
        /// Digest carried by the envelope
        expected: String,
        /// Digest of the recovered plaintext
        computed: String,
    },

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Signature verification failed
    ///
    /// Unsealing reports this through the verdict's authenticity detail.
    #[error("Signature verification failed: {0}")]
    VerificationFailed(String),

    /// Invalid key format or length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Failed to read from storage
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Failed to write to storage
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    /// Stored data could not be opened or is inconsistent
    #[error("Storage data corrupted: {0}")]
    StorageCorrupted(String),

    // ========================================================================
    // Pipeline Errors (700-799)
    // ========================================================================

    /// An asymmetric operation exceeded its time budget
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Envelope could not be decoded
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Codes are grouped by category:
    /// - 200-299: Identity
    /// - 300-399: Crypto
    /// - 400-499: Storage
    /// - 700-799: Pipeline
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Identity (200-299)
            Error::IdentityNotFound(_) => 200,
            Error::InvalidHandle(_) => 201,
            Error::KeyGenerationFailed(_) => 202,
            Error::KeyDerivationFailed(_) => 203,
            Error::CertificateError(_) => 204,

            // Crypto (300-399)
            Error::EncryptionFailed(_) => 300,
            Error::DecryptionFailed(_) => 301,
            Error::SigningFailed(_) => 302,
            Error::VerificationFailed(_) => 303,
            Error::InvalidKey(_) => 304,
            Error::IntegrityMismatch { .. } => 305,

            // Storage (400-499)
            Error::StorageReadError(_) => 401,
            Error::StorageWriteError(_) => 402,
            Error::StorageCorrupted(_) => 404,

            // Pipeline (700-799)
            Error::Timeout(_) => 700,
            Error::InvalidEnvelope(_) => 701,

            // Internal (900-999)
            Error::SerializationError(_) => 900,
            Error::Internal(_) => 901,
        }
    }

    /// Check if this error is recoverable
    ///
    /// A missing identity is resolved by provisioning one and retrying; a
    /// timeout may succeed on a less loaded host.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::IdentityNotFound(_) | Error::Timeout(_))
    }

    /// Check if this error requires action outside the pipeline
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Error::IdentityNotFound(_)
                | Error::InvalidHandle(_)
                | Error::StorageReadError(_)
                | Error::StorageWriteError(_)
                | Error::StorageCorrupted(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageReadError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::IdentityNotFound("carlos".into()).code(), 200);
        assert_eq!(Error::EncryptionFailed("test".into()).code(), 300);
        assert_eq!(Error::StorageCorrupted("test".into()).code(), 404);
        assert_eq!(Error::Timeout("sign".into()).code(), 700);
        assert_eq!(Error::Internal("test".into()).code(), 901);
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::IdentityNotFound("carlos".into()).is_recoverable());
        assert!(Error::Timeout("sign".into()).is_recoverable());
        assert!(!Error::StorageWriteError("disk full".into()).is_recoverable());
        assert!(!Error::SigningFailed("bad key".into()).is_recoverable());
    }

    #[test]
    fn test_storage_errors_require_user_action() {
        assert!(Error::StorageWriteError("permission denied".into()).requires_user_action());
        assert!(Error::IdentityNotFound("carlos".into()).requires_user_action());
        assert!(!Error::Timeout("verify".into()).requires_user_action());
    }

    #[test]
    fn test_integrity_mismatch_message() {
        let err = Error::IntegrityMismatch {
            expected: "aa".into(),
            computed: "bb".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aa"));
        assert!(msg.contains("bb"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert_eq!(err.code(), 401);
        assert!(err.to_string().contains("denied"));
    }
}
