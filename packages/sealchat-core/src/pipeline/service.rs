//! Async front end over [`CryptoContext`].
//!
//! CPU-bound stages run on the blocking pool. The digest and encryption
//! stages of a seal run side by side since neither depends on the other;
//! signing and signature verification are bounded by
//! `SealConfig::crypto_timeout`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::unseal::{self, UnsealFailure, Verdict};
use super::{seal, CryptoContext, Envelope};
use crate::crypto;
use crate::error::{Error, Result};
use crate::identity::Identity;

/// Async sealing service, cheap to clone
#[derive(Debug, Clone)]
pub struct SealingService {
    ctx: Arc<CryptoContext>,
}

impl SealingService {
    /// Wrap a context
    pub fn new(ctx: Arc<CryptoContext>) -> Self {
        Self { ctx }
    }

    /// Underlying context
    pub fn context(&self) -> &Arc<CryptoContext> {
        &self.ctx
    }

    /// Seal `plaintext` as `sender`
    pub async fn seal(&self, sender: &str, plaintext: &str) -> Result<Envelope> {
        let started = Instant::now();
        let result = match self.load(sender, None).await {
            Ok(identity) => self.seal_with(identity, plaintext).await,
            Err(e) => Err(e),
        };
        seal::finish(&self.ctx, sender, plaintext, started, &result);
        result
    }

    /// Seal `plaintext` as `sender`, provisioning the identity if missing
    pub async fn seal_provisioning(
        &self,
        sender: &str,
        common_name: &str,
        email: Option<&str>,
        plaintext: &str,
    ) -> Result<Envelope> {
        let started = Instant::now();
        let provisioning = Some((common_name.to_string(), email.map(str::to_string)));
        let result = match self.load(sender, provisioning).await {
            Ok(identity) => self.seal_with(identity, plaintext).await,
            Err(e) => Err(e),
        };
        seal::finish(&self.ctx, sender, plaintext, started, &result);
        result
    }

    /// Check an envelope and recover its plaintext
    pub async fn unseal(&self, envelope: Envelope) -> Verdict {
        let started = Instant::now();
        let envelope = Arc::new(envelope);
        let verdict = self.verify(Arc::clone(&envelope)).await;
        unseal::finish(&self.ctx, &envelope, &verdict, started.elapsed());
        verdict
    }

    async fn load(
        &self,
        sender: &str,
        provisioning: Option<(String, Option<String>)>,
    ) -> Result<Arc<Identity>> {
        let ctx = Arc::clone(&self.ctx);
        let sender = sender.to_string();
        blocking(move || match provisioning {
            Some((common_name, email)) => {
                seal::provision(&ctx, &sender, &common_name, email.as_deref())
            }
            None => ctx.identities().load(&sender),
        })
        .await
    }

    async fn seal_with(&self, identity: Arc<Identity>, plaintext: &str) -> Result<Envelope> {
        let text = plaintext.to_string();
        let digest_task = blocking(move || Ok(crypto::digest(&text)));

        let ctx = Arc::clone(&self.ctx);
        let text = plaintext.to_string();
        let encrypt_task = blocking(move || crypto::encrypt(ctx.shared_key(), text.as_bytes()));

        let (digest, encrypted) = tokio::join!(digest_task, encrypt_task);
        let (digest, encrypted) = (digest?, encrypted?);

        let signer = Arc::clone(&identity);
        let to_sign = digest.clone();
        let signature = bounded(
            self.ctx.config().crypto_timeout,
            "signing",
            blocking(move || signer.sign_digest(&to_sign)),
        )
        .await?;

        Ok(seal::assemble(&identity, plaintext, encrypted, digest, &signature))
    }

    async fn verify(&self, envelope: Arc<Envelope>) -> Verdict {
        let ctx = Arc::clone(&self.ctx);
        let env = Arc::clone(&envelope);
        let checked = blocking(move || Ok(unseal::pre_verify(&ctx, &env))).await;

        let (certificate, plaintext) = match checked {
            Ok(Ok(parts)) => parts,
            Ok(Err(failure)) => return Verdict::rejected(failure),
            Err(e) => return Verdict::rejected(UnsealFailure::Confidentiality(e.to_string())),
        };

        let env = Arc::clone(&envelope);
        let checked = bounded(
            self.ctx.config().crypto_timeout,
            "verification",
            blocking(move || Ok(unseal::check_authenticity(&certificate, &env))),
        )
        .await;

        authenticity_verdict(plaintext, checked)
    }
}

/// Turn the outcome of the bounded verification stage into a verdict
fn authenticity_verdict(
    plaintext: String,
    checked: Result<std::result::Result<(), UnsealFailure>>,
) -> Verdict {
    match checked {
        Ok(Ok(())) => Verdict::accepted(plaintext),
        Ok(Err(failure)) => Verdict::rejected(failure),
        Err(Error::Timeout(detail)) => Verdict::rejected(UnsealFailure::Timeout(detail)),
        Err(e) => Verdict::rejected(UnsealFailure::Authenticity(e.to_string())),
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Run `f` on the blocking pool
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("Blocking task failed: {}", e)))?
}

/// Fail with `Error::Timeout` if `fut` does not finish within `limit`
async fn bounded<T, F>(limit: Duration, stage: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(stage, limit_ms = limit.as_millis() as u64, "Crypto stage timed out");
            Err(Error::Timeout(format!("{} exceeded {:?}", stage, limit)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MetricsConfig, SealConfig};
    use crate::crypto::SharedKey;
    use crate::metrics::{MemoryMetricsSink, MetricOperation, MetricsRecorder};
    use crate::pipeline::UnsealState;
    use crate::storage::IdentityStore;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> SealingService {
        let mut config = SealConfig::with_identity_dir(dir.path());
        config.crypto_timeout = Duration::from_secs(10);
        let identities = Arc::new(IdentityStore::open(config.clone()).unwrap());
        SealingService::new(Arc::new(CryptoContext::new(
            SharedKey::generate(),
            identities,
            config,
        )))
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<u32> = bounded(Duration::from_millis(10), "signing", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1)
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let ok: Result<u32> = bounded(Duration::from_secs(5), "signing", async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<u32> = bounded(Duration::from_secs(5), "signing", async {
            Err(Error::SigningFailed("boom".into()))
        })
        .await;
        assert!(matches!(err, Err(Error::SigningFailed(_))));
    }

    #[test]
    fn test_authenticity_verdict_mapping() {
        let verdict = authenticity_verdict("hi".into(), Ok(Ok(())));
        assert_eq!(verdict.plaintext.as_deref(), Some("hi"));

        let verdict = authenticity_verdict(
            "hi".into(),
            Err(Error::Timeout("verification exceeded 300ms".into())),
        );
        assert!(!verdict.valid);
        assert!(verdict.plaintext.is_none());
        assert_eq!(verdict.state(), UnsealState::Invalid);
        assert_eq!(verdict.reason(), Some("verification timeout"));
        assert_eq!(verdict.display_line(), "message rejected: verification timeout");

        let verdict = authenticity_verdict(
            "hi".into(),
            Err(Error::Internal("Blocking task failed".into())),
        );
        assert!(matches!(verdict.failure, Some(UnsealFailure::Authenticity(_))));

        let verdict = authenticity_verdict(
            "hi".into(),
            Ok(Err(UnsealFailure::Authenticity("signature does not match digest".into()))),
        );
        assert_eq!(verdict.reason(), Some("authenticity failure"));
    }

    #[tokio::test]
    async fn test_seal_times_out_with_zero_budget() {
        let dir = TempDir::new().unwrap();
        let mut config = SealConfig::with_identity_dir(dir.path());
        config.crypto_timeout = Duration::ZERO;
        let identities = Arc::new(IdentityStore::open(config.clone()).unwrap());
        identities.generate("carlos", "Carlos", None).unwrap();

        let sink = MemoryMetricsSink::new();
        let recorder = MetricsRecorder::new(
            sink.clone(),
            MetricsConfig {
                batch_size: 1,
                ..MetricsConfig::default()
            },
        )
        .unwrap();
        let ctx = CryptoContext::new(SharedKey::generate(), identities, config)
            .with_metrics(Arc::new(recorder));
        let service = SealingService::new(Arc::new(ctx));

        let result = service.seal("carlos", "hello").await;
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Timeout(ref d) if d.starts_with("signing")));
        assert!(err.is_recoverable());

        service.context().metrics().unwrap().flush();
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, MetricOperation::Sign);
        assert!(!records[0].success);
    }

    #[tokio::test]
    async fn test_service_round_trip() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let envelope = service
            .seal_provisioning("carlos", "Carlos", None, "hello")
            .await
            .unwrap();
        assert_eq!(envelope.message_hash, crypto::digest("hello"));

        let verdict = service.unseal(envelope).await;
        assert!(verdict.valid, "{:?}", verdict.failure);
        assert_eq!(verdict.plaintext.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_service_unknown_sender() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        let result = service.seal("ghost", "hello").await;
        assert!(matches!(result, Err(Error::IdentityNotFound(_))));
    }

    #[tokio::test]
    async fn test_service_rejects_tampered_digest() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let mut envelope = service
            .seal_provisioning("carlos", "Carlos", None, "hello")
            .await
            .unwrap();
        envelope.message_hash = crypto::digest("goodbye");

        let verdict = service.unseal(envelope).await;
        assert_eq!(verdict.reason(), Some("integrity failure"));
    }
}
