//! # Sealing Demo
//!
//! Walks one message through sealing, then shows how each kind of
//! tampering is caught on the way back.
//!
//! ## Run
//!
//! ```bash
//! cargo run --example sealing_demo
//! ```

use std::sync::Arc;

use sealchat_core::crypto;
use sealchat_core::{CryptoContext, Envelope, IdentityStore, SealConfig, SharedKey};

fn main() {
    println!("=== Sealchat Core: Sealing Demo ===\n");

    let dir = std::env::temp_dir().join("sealchat-demo");
    let config = SealConfig::with_identity_dir(&dir);
    let identities = Arc::new(IdentityStore::open(config.clone()).expect("Failed to open store"));
    let ctx = CryptoContext::new(SharedKey::generate(), identities, config);

    // Step 1: Seal
    println!("Step 1: Sealing \"hello\" as carlos (identity created on first use)...");
    let envelope = ctx
        .seal_provisioning("carlos", "Carlos", Some("carlos@example.com"), "hello")
        .expect("Failed to seal");

    println!("  Digest:     {}", envelope.message_hash);
    println!("  Ciphertext: {}", envelope.encrypted_message);
    println!("  Signature:  {}...", &envelope.signature[..32]);
    println!("  Identity:   {}", dir.join("carlos.identity").display());
    println!();

    println!("  ┌─────────────────────────────────────────────────────────────┐");
    println!("  │                     UNSEAL CHECKS                           │");
    println!("  ├─────────────────────────────────────────────────────────────┤");
    println!("  │                                                             │");
    println!("  │  decrypt(encrypted_message)      ──► confidentiality        │");
    println!("  │  digest(plaintext) == hash ?     ──► integrity              │");
    println!("  │  verify(hash, signature, cert)   ──► authenticity           │");
    println!("  │                                                             │");
    println!("  └─────────────────────────────────────────────────────────────┘");
    println!();

    // Step 2: Unseal untouched
    println!("Step 2: Unsealing the untouched envelope...");
    report(&ctx, &envelope);

    // Step 3: Tampering
    println!("Step 3: Replacing the digest...");
    let mut tampered = envelope.clone();
    tampered.message_hash = crypto::digest("goodbye");
    report(&ctx, &tampered);

    println!("Step 4: Corrupting the signature...");
    let mut tampered = envelope.clone();
    tampered.signature = tampered.signature.chars().rev().collect();
    report(&ctx, &tampered);

    println!("Step 5: Truncating the ciphertext...");
    let mut tampered = envelope;
    tampered.encrypted_message.truncate(tampered.encrypted_message.len() - 4);
    report(&ctx, &tampered);

    println!("=== Demo Complete ===");
}

fn report(ctx: &CryptoContext, envelope: &Envelope) {
    let verdict = ctx.unseal(envelope);
    match &verdict.plaintext {
        Some(text) => println!("  [OK] {} -> \"{}\"", verdict, text),
        None => println!("  [REJECTED] {}", verdict),
    }
    println!();
}
