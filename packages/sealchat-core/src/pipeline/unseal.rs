//! Unsealing: decrypt, re-digest, compare, verify.
//!
//! ```text
//! Created
//!   │ parse certificate ──────────────────── fail ──► Invalid (authenticity)
//!   ▼
//! Decrypting ─────────────────────────────── fail ──► DecryptFailed
//!   ▼
//! CheckingIntegrity  digest(plaintext) == message_hash ?
//!   │                                     no ──► IntegrityFailed
//!   ▼
//! VerifyingSignature  PSS(message_hash, signature, cert key) ?
//!   │                                     no ──► Invalid
//!   ▼
//! Valid
//! ```
//!
//! The first failing stage ends the run. Nothing is consumed, so unsealing
//! the same envelope again gives the same verdict; this also means an old
//! envelope replayed later still verifies.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::{CryptoContext, Envelope};
use crate::crypto::{self, SignatureCheck};
use crate::error::Error;
use crate::identity::IdentityCertificate;
use crate::metrics::MetricOperation;

/// Why an envelope was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UnsealFailure {
    /// The ciphertext could not be turned back into text
    Confidentiality(String),
    /// The recovered text does not match the claimed digest
    Integrity(String),
    /// The signature or certificate does not check out
    Authenticity(String),
    /// Verification did not finish in time
    Timeout(String),
}

impl UnsealFailure {
    /// Stable, user-facing reason
    pub fn reason(&self) -> &'static str {
        match self {
            UnsealFailure::Confidentiality(_) => "confidentiality failure",
            UnsealFailure::Integrity(_) => "integrity failure",
            UnsealFailure::Authenticity(_) => "authenticity failure",
            UnsealFailure::Timeout(_) => "verification timeout",
        }
    }

    /// Diagnostic detail
    pub fn detail(&self) -> &str {
        match self {
            UnsealFailure::Confidentiality(d)
            | UnsealFailure::Integrity(d)
            | UnsealFailure::Authenticity(d)
            | UnsealFailure::Timeout(d) => d,
        }
    }
}

impl fmt::Display for UnsealFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason(), self.detail())
    }
}

/// Terminal state of an unseal run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnsealState {
    /// Decryption failed
    DecryptFailed,
    /// Digest mismatch
    IntegrityFailed,
    /// Signature, certificate or timeout failure
    Invalid,
    /// All checks passed
    Valid,
}

/// Result of unsealing an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// Whether confidentiality, integrity and authenticity all held
    pub valid: bool,
    /// Recovered plaintext, only when valid
    pub plaintext: Option<String>,
    /// Why the envelope was rejected, only when invalid
    pub failure: Option<UnsealFailure>,
}

impl Verdict {
    /// A verdict accepting `plaintext`
    pub fn accepted(plaintext: String) -> Self {
        Self {
            valid: true,
            plaintext: Some(plaintext),
            failure: None,
        }
    }

    /// A verdict rejecting the envelope
    pub fn rejected(failure: UnsealFailure) -> Self {
        Self {
            valid: false,
            plaintext: None,
            failure: Some(failure),
        }
    }

    /// Terminal state reached
    pub fn state(&self) -> UnsealState {
        match &self.failure {
            None => UnsealState::Valid,
            Some(UnsealFailure::Confidentiality(_)) => UnsealState::DecryptFailed,
            Some(UnsealFailure::Integrity(_)) => UnsealState::IntegrityFailed,
            Some(UnsealFailure::Authenticity(_)) | Some(UnsealFailure::Timeout(_)) => {
                UnsealState::Invalid
            }
        }
    }

    /// Stable reason string, if rejected
    pub fn reason(&self) -> Option<&'static str> {
        self.failure.as_ref().map(UnsealFailure::reason)
    }

    /// Line shown to the recipient
    pub fn display_line(&self) -> String {
        match &self.failure {
            None => "message verified".to_string(),
            Some(failure) => format!("message rejected: {}", failure.reason()),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_line())
    }
}

// ============================================================================
// STAGES
// ============================================================================

pub(crate) fn parse_certificate(envelope: &Envelope) -> Result<IdentityCertificate, UnsealFailure> {
    let certificate = IdentityCertificate::from_pem(&envelope.certificate)
        .map_err(|e| UnsealFailure::Authenticity(e.to_string()))?;
    if !certificate.verify_self_signature() {
        return Err(UnsealFailure::Authenticity(
            "certificate self-signature does not verify".into(),
        ));
    }
    Ok(certificate)
}

pub(crate) fn recover_plaintext(
    ctx: &CryptoContext,
    envelope: &Envelope,
) -> Result<String, UnsealFailure> {
    let started = Instant::now();
    let plaintext = crypto::decrypt(
        ctx.shared_key(),
        &envelope.encrypted_message,
        ctx.config().padding,
    )
    .map_err(|e| UnsealFailure::Confidentiality(e.to_string()))?;
    tracing::debug!(
        bytes = plaintext.len(),
        elapsed_ms = ms(started.elapsed()),
        "Decrypted message"
    );
    Ok(plaintext)
}

pub(crate) fn check_integrity(plaintext: &str, envelope: &Envelope) -> Result<(), UnsealFailure> {
    let started = Instant::now();
    let computed = crypto::digest(plaintext);
    tracing::debug!(elapsed_ms = ms(started.elapsed()), "Recomputed digest");

    if computed != envelope.message_hash {
        let mismatch = Error::IntegrityMismatch {
            expected: envelope.message_hash.clone(),
            computed,
        };
        return Err(UnsealFailure::Integrity(mismatch.to_string()));
    }
    Ok(())
}

pub(crate) fn check_authenticity(
    certificate: &IdentityCertificate,
    envelope: &Envelope,
) -> Result<(), UnsealFailure> {
    let started = Instant::now();
    let check = crypto::verify_digest(
        certificate.public_key(),
        &envelope.message_hash,
        &envelope.signature,
    );
    tracing::debug!(elapsed_ms = ms(started.elapsed()), "Verified signature");

    match check {
        Ok(SignatureCheck::Valid) => Ok(()),
        Ok(SignatureCheck::Invalid(reason)) => Err(UnsealFailure::Authenticity(
            Error::VerificationFailed(reason).to_string(),
        )),
        Err(e) => Err(UnsealFailure::Authenticity(e.to_string())),
    }
}

/// Certificate, decryption and integrity stages, in order
pub(crate) fn pre_verify(
    ctx: &CryptoContext,
    envelope: &Envelope,
) -> Result<(IdentityCertificate, String), UnsealFailure> {
    let certificate = parse_certificate(envelope)?;
    let plaintext = recover_plaintext(ctx, envelope)?;
    check_integrity(&plaintext, envelope)?;
    Ok((certificate, plaintext))
}

pub(crate) fn unseal(ctx: &CryptoContext, envelope: &Envelope) -> Verdict {
    let started = Instant::now();

    let verdict = match pre_verify(ctx, envelope).and_then(|(certificate, plaintext)| {
        check_authenticity(&certificate, envelope).map(|()| plaintext)
    }) {
        Ok(plaintext) => Verdict::accepted(plaintext),
        Err(failure) => Verdict::rejected(failure),
    };

    finish(ctx, envelope, &verdict, started.elapsed());
    verdict
}

/// Log the outcome and record the verify metric
pub(crate) fn finish(ctx: &CryptoContext, envelope: &Envelope, verdict: &Verdict, elapsed: Duration) {
    match &verdict.failure {
        None => tracing::info!(
            sender = %envelope.sender,
            elapsed_ms = ms(elapsed),
            "Message verified"
        ),
        Some(failure) => tracing::warn!(
            sender = %envelope.sender,
            reason = failure.reason(),
            detail = failure.detail(),
            "Message rejected"
        ),
    }

    let shown = verdict.plaintext.as_deref().unwrap_or(&envelope.message);
    ctx.record(MetricOperation::Verify, &envelope.sender, shown, elapsed, verdict.valid);
}

pub(crate) fn ms(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_and_reasons() {
        let cases = [
            (UnsealFailure::Confidentiality("x".into()), UnsealState::DecryptFailed, "confidentiality failure"),
            (UnsealFailure::Integrity("x".into()), UnsealState::IntegrityFailed, "integrity failure"),
            (UnsealFailure::Authenticity("x".into()), UnsealState::Invalid, "authenticity failure"),
            (UnsealFailure::Timeout("x".into()), UnsealState::Invalid, "verification timeout"),
        ];
        for (failure, state, reason) in cases {
            let verdict = Verdict::rejected(failure);
            assert!(!verdict.valid);
            assert_eq!(verdict.state(), state);
            assert_eq!(verdict.reason(), Some(reason));
            assert_eq!(verdict.display_line(), format!("message rejected: {}", reason));
        }
    }

    #[test]
    fn test_accepted() {
        let verdict = Verdict::accepted("hello".into());
        assert!(verdict.valid);
        assert_eq!(verdict.state(), UnsealState::Valid);
        assert_eq!(verdict.plaintext.as_deref(), Some("hello"));
        assert_eq!(verdict.to_string(), "message verified");
    }

    fn envelope_claiming(message_hash: &str) -> Envelope {
        Envelope {
            message: "hello".into(),
            encrypted_message: String::new(),
            message_hash: message_hash.into(),
            signature: String::new(),
            certificate: String::new(),
            timestamp: String::new(),
            sender: "alice".into(),
        }
    }

    #[test]
    fn test_check_integrity() {
        let digest = crypto::digest("hello");
        assert!(check_integrity("hello", &envelope_claiming(&digest)).is_ok());

        let failure = check_integrity("hellO", &envelope_claiming(&digest)).unwrap_err();
        assert_eq!(failure.reason(), "integrity failure");
        assert_eq!(
            failure.detail(),
            format!(
                "Integrity check failed: expected {}, computed {}",
                digest,
                crypto::digest("hellO")
            )
        );
    }

    #[test]
    fn test_failure_serializes_with_kind() {
        let json = serde_json::to_value(UnsealFailure::Integrity("mismatch".into())).unwrap();
        assert_eq!(json["kind"], "integrity");
        assert_eq!(json["detail"], "mismatch");
    }
}
