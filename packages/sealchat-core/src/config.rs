//! Runtime configuration for the sealing pipeline.
//!
//! Everything here has a working default; the CLI overrides fields from
//! flags and `SEALCHAT_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::crypto::{PaddingPolicy, DEFAULT_KEY_BITS};

/// Default passphrase protecting identity containers (demo-grade)
pub const DEFAULT_PASSPHRASE: &str = "password";

/// Default certificate lifetime in days
pub const DEFAULT_VALIDITY_DAYS: u32 = 365;

/// Default bound on a single sign or verify call
pub const DEFAULT_CRYPTO_TIMEOUT: Duration = Duration::from_millis(300);

/// Default number of metric records written per batch
pub const DEFAULT_METRICS_BATCH_SIZE: usize = 10;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct SealConfig {
    /// Directory holding `<handle>.identity` containers
    pub identity_dir: PathBuf,
    /// Passphrase for identity containers
    pub passphrase: String,
    /// RSA modulus size for new identities
    pub key_bits: usize,
    /// Lifetime of newly issued certificates
    pub validity_days: u32,
    /// Fixed subject attributes for new certificates
    pub subject: CertificateSubject,
    /// How decryption treats malformed padding
    pub padding: PaddingPolicy,
    /// Bound on sign/verify calls made through the async service
    pub crypto_timeout: Duration,
    /// Metrics recording
    pub metrics: MetricsConfig,
}

impl Default for SealConfig {
    fn default() -> Self {
        Self {
            identity_dir: PathBuf::from("certificates"),
            passphrase: DEFAULT_PASSPHRASE.to_string(),
            key_bits: DEFAULT_KEY_BITS,
            validity_days: DEFAULT_VALIDITY_DAYS,
            subject: CertificateSubject::default(),
            padding: PaddingPolicy::default(),
            crypto_timeout: DEFAULT_CRYPTO_TIMEOUT,
            metrics: MetricsConfig::default(),
        }
    }
}

impl SealConfig {
    /// Default configuration rooted at a specific identity directory
    pub fn with_identity_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            identity_dir: dir.into(),
            ..Self::default()
        }
    }
}

/// Subject attributes shared by every certificate this node issues
///
/// The common name and email vary per participant and are supplied at
/// generation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSubject {
    /// Two-letter country code
    pub country: String,
    /// State or province
    pub state: String,
    /// Locality
    pub locality: String,
    /// Organization
    pub organization: String,
    /// DNS name placed in the subject alternative names
    pub dns_name: String,
}

impl Default for CertificateSubject {
    fn default() -> Self {
        Self {
            country: "BR".to_string(),
            state: "Amazonas".to_string(),
            locality: "Manaus".to_string(),
            organization: "UEA".to_string(),
            dns_name: "localhost".to_string(),
        }
    }
}

/// Metrics recording configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// CSV file to append to; `None` disables the CSV sink
    pub path: Option<PathBuf>,
    /// Records buffered before a batch is handed to the writer
    pub batch_size: usize,
    /// Value of the `test_type` column
    pub test_type: String,
    /// Value of the `scenario` column
    pub scenario: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: None,
            batch_size: DEFAULT_METRICS_BATCH_SIZE,
            test_type: "real_chat_usage".to_string(),
            scenario: "real_user".to_string(),
        }
    }
}
