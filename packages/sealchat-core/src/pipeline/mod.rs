//! # Pipeline
//!
//! Sealing and unsealing of chat messages.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          CryptoContext                              │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  shared key ────────┐      identity store ─────┐    metrics        │
//! │  (AES-256, process) │      (<handle>.identity) │    (optional)     │
//! │                     ▼                          ▼                    │
//! │   seal(sender, text) ──► digest ─► encrypt ─► sign ─► Envelope      │
//! │                                                                     │
//! │   unseal(Envelope) ──► cert ─► decrypt ─► digest == ? ─► verify    │
//! │                                                     └──► Verdict    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The shared key lives for as long as the context. Every participant
//! served by one context uses the same key, so the pipeline provides
//! integrity and authenticity between them, not confidentiality from
//! each other.
//!
//! [`SealingService`] wraps a context for async callers and bounds the
//! signing and verification stages with `SealConfig::crypto_timeout`.

mod envelope;
mod seal;
mod service;
mod unseal;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use envelope::Envelope;
pub use seal::seal_with_identity;
pub use service::SealingService;
pub use unseal::{UnsealFailure, UnsealState, Verdict};

use crate::config::SealConfig;
use crate::crypto::SharedKey;
use crate::error::Result;
use crate::metrics::{MetricOperation, MetricsRecorder};
use crate::storage::IdentityStore;

/// Everything sealing and unsealing need
pub struct CryptoContext {
    shared_key: SharedKey,
    identities: Arc<IdentityStore>,
    metrics: Option<Arc<MetricsRecorder>>,
    config: SealConfig,
}

impl CryptoContext {
    /// Create a context from its parts, without metrics
    pub fn new(shared_key: SharedKey, identities: Arc<IdentityStore>, config: SealConfig) -> Self {
        Self {
            shared_key,
            identities,
            metrics: None,
            config,
        }
    }

    /// Attach a metrics recorder
    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Generate a fresh shared key, open the identity store and, when
    /// `config.metrics.path` is set, start a CSV recorder
    pub fn from_config(config: SealConfig) -> Result<Self> {
        let shared_key = SharedKey::generate();
        tracing::info!(fingerprint = %shared_key.fingerprint(), "Generated shared message key");
        Self::from_config_with_key(config, shared_key)
    }

    /// Like [`CryptoContext::from_config`], but with a shared key agreed
    /// out of band
    pub fn from_config_with_key(config: SealConfig, shared_key: SharedKey) -> Result<Self> {
        let identities = Arc::new(IdentityStore::open(config.clone())?);
        let metrics = MetricsRecorder::from_config(&config.metrics)?;

        let ctx = Self::new(shared_key, identities, config);
        Ok(match metrics {
            Some(recorder) => ctx.with_metrics(Arc::new(recorder)),
            None => ctx,
        })
    }

    /// Shared message key
    pub fn shared_key(&self) -> &SharedKey {
        &self.shared_key
    }

    /// Identity store
    pub fn identities(&self) -> &Arc<IdentityStore> {
        &self.identities
    }

    /// Metrics recorder, if any
    pub fn metrics(&self) -> Option<&Arc<MetricsRecorder>> {
        self.metrics.as_ref()
    }

    /// Configuration
    pub fn config(&self) -> &SealConfig {
        &self.config
    }

    /// Seal `plaintext` as `sender`
    ///
    /// Fails with `IdentityNotFound` if the sender has no identity.
    pub fn seal(&self, sender: &str, plaintext: &str) -> Result<Envelope> {
        seal::seal(self, sender, plaintext)
    }

    /// Seal `plaintext` as `sender`, creating the sender's identity first
    /// if it does not exist
    pub fn seal_provisioning(
        &self,
        sender: &str,
        common_name: &str,
        email: Option<&str>,
        plaintext: &str,
    ) -> Result<Envelope> {
        seal::seal_provisioning(self, sender, common_name, email, plaintext)
    }

    /// Check an envelope and recover its plaintext
    ///
    /// Never fails; every problem is reported in the [`Verdict`].
    pub fn unseal(&self, envelope: &Envelope) -> Verdict {
        unseal::unseal(self, envelope)
    }

    pub(crate) fn record(
        &self,
        operation: MetricOperation,
        username: &str,
        message: &str,
        elapsed: Duration,
        success: bool,
    ) {
        if let Some(metrics) = &self.metrics {
            metrics.record(operation, username, message, elapsed, success);
        }
    }
}

impl fmt::Debug for CryptoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoContext")
            .field("shared_key", &self.shared_key)
            .field("identity_dir", &self.identities.dir())
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}
