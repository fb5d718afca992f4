//! Sealing: digest, encrypt, sign, assemble.
//!
//! Stages run strictly in order; a failure at any stage means no envelope.
//!
//! ```text
//! plaintext ──► identity(sender) ──► SHA-256 ──► AES-256-CBC ──► RSA-PSS ──► Envelope
//!                  │                   │              │              │
//!                  └ IdentityNotFound  └ hex digest   └ base64 blob  └ hex signature
//! ```

use std::sync::Arc;
use std::time::Instant;

use super::unseal::ms;
use super::{CryptoContext, Envelope};
use crate::crypto::{self, Signature};
use crate::error::Result;
use crate::identity::Identity;
use crate::metrics::MetricOperation;
use crate::time;

pub(crate) fn seal(ctx: &CryptoContext, sender: &str, plaintext: &str) -> Result<Envelope> {
    let started = Instant::now();
    let result = ctx
        .identities()
        .load(sender)
        .and_then(|identity| seal_with_identity(ctx, &identity, plaintext));
    finish(ctx, sender, plaintext, started, &result);
    result
}

pub(crate) fn seal_provisioning(
    ctx: &CryptoContext,
    sender: &str,
    common_name: &str,
    email: Option<&str>,
    plaintext: &str,
) -> Result<Envelope> {
    let started = Instant::now();
    let result = provision(ctx, sender, common_name, email)
        .and_then(|identity| seal_with_identity(ctx, &identity, plaintext));
    finish(ctx, sender, plaintext, started, &result);
    result
}

/// Load the sender's identity, creating it when missing
pub(crate) fn provision(
    ctx: &CryptoContext,
    sender: &str,
    common_name: &str,
    email: Option<&str>,
) -> Result<Arc<Identity>> {
    ctx.identities().load_or_generate(sender, common_name, email)
}

/// Run the digest, encrypt and sign stages for an already loaded identity
pub fn seal_with_identity(
    ctx: &CryptoContext,
    identity: &Identity,
    plaintext: &str,
) -> Result<Envelope> {
    let stage = Instant::now();
    let digest = crypto::digest(plaintext);
    tracing::debug!(elapsed_ms = ms(stage.elapsed()), "Computed digest");

    let stage = Instant::now();
    let encrypted = crypto::encrypt(ctx.shared_key(), plaintext.as_bytes())?;
    tracing::debug!(
        bytes = plaintext.len(),
        elapsed_ms = ms(stage.elapsed()),
        "Encrypted message"
    );

    let stage = Instant::now();
    let signature = identity.sign_digest(&digest)?;
    tracing::debug!(elapsed_ms = ms(stage.elapsed()), "Signed digest");

    Ok(assemble(identity, plaintext, encrypted, digest, &signature))
}

pub(crate) fn assemble(
    identity: &Identity,
    plaintext: &str,
    encrypted_message: String,
    message_hash: String,
    signature: &Signature,
) -> Envelope {
    Envelope {
        message: plaintext.to_string(),
        encrypted_message,
        message_hash,
        signature: signature.to_hex(),
        certificate: identity.certificate().to_pem().to_string(),
        timestamp: time::now_rfc3339(),
        sender: identity.handle().to_string(),
    }
}

/// Log the outcome and record the sign metric
pub(crate) fn finish(
    ctx: &CryptoContext,
    sender: &str,
    plaintext: &str,
    started: Instant,
    result: &Result<Envelope>,
) {
    let elapsed = started.elapsed();
    match result {
        Ok(_) => tracing::info!(
            sender,
            bytes = plaintext.len(),
            elapsed_ms = ms(elapsed),
            "Message sealed"
        ),
        Err(e) => tracing::warn!(sender, error = %e, "Sealing failed"),
    }
    ctx.record(MetricOperation::Sign, sender, plaintext, elapsed, result.is_ok());
}
