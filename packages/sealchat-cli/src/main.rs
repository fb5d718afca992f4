//! Sealchat CLI
//!
//! Drives the sealing pipeline from a terminal:
//!
//! 1. **Identities**: create a handle's key pair and certificate, or show
//!    what is already stored.
//!
//! 2. **Send**: seal a message (provisioning the sender if needed),
//!    optionally tamper with it, then unseal it the way a recipient would.
//!
//! 3. **Inspect**: describe an envelope saved by an earlier `send`, and
//!    unseal it when the key it was sealed under is supplied.
//!
//! The shared message key lives only as long as the process unless one is
//! passed with `--shared-key`, so `inspect` needs the key the envelope was
//! sealed under.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result, WrapErr};
use sealchat_core::{
    crypto, CryptoContext, Envelope, IdentityCertificate, IdentitySummary, MetricsConfig,
    PaddingPolicy, SealConfig, SealingService, SharedKey, Verdict,
};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "sealchat", version, about = "Sealed chat messages from the terminal")]
struct Args {
    /// Directory holding identity containers
    #[arg(long, default_value = "certificates", env = "SEALCHAT_IDENTITY_DIR", global = true)]
    identity_dir: PathBuf,

    /// Passphrase protecting identity containers
    #[arg(long, default_value = "password", env = "SEALCHAT_PASSPHRASE", hide_env_values = true, global = true)]
    passphrase: String,

    /// Shared message key (64 hex chars); a fresh one is generated if unset
    #[arg(long, env = "SEALCHAT_SHARED_KEY", hide_env_values = true, global = true)]
    shared_key: Option<String>,

    /// Append sign/verify timings to this CSV file
    #[arg(long, env = "SEALCHAT_METRICS_PATH", global = true)]
    metrics: Option<PathBuf>,

    /// How decryption treats malformed padding
    #[arg(long, value_enum, default_value_t = Padding::Strict, env = "SEALCHAT_PADDING", global = true)]
    padding: Padding,

    /// Bound on signing and verification, in milliseconds
    #[arg(long, default_value_t = 300, env = "SEALCHAT_CRYPTO_TIMEOUT_MS", global = true)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage identities
    #[command(subcommand)]
    Identity(IdentityCommand),

    /// Seal a message, then unseal it as a recipient would
    Send {
        /// Sender handle
        #[arg(long)]
        from: String,
        /// Message text
        #[arg(long)]
        message: String,
        /// Common name used if the sender has no identity yet
        #[arg(long)]
        name: Option<String>,
        /// Email used if the sender has no identity yet
        #[arg(long)]
        email: Option<String>,
        /// Damage one part of the envelope before unsealing
        #[arg(long, value_enum)]
        tamper: Option<Tamper>,
        /// Save the envelope as JSON into this directory
        #[arg(long)]
        save_dir: Option<PathBuf>,
    },

    /// Unseal a saved envelope
    Inspect {
        /// Envelope JSON file
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum IdentityCommand {
    /// Create (or replace) an identity
    Create {
        /// Participant handle
        #[arg(long)]
        handle: String,
        /// Certificate common name (defaults to the handle)
        #[arg(long)]
        name: Option<String>,
        /// Certificate email
        #[arg(long)]
        email: Option<String>,
    },
    /// Print a stored identity's certificate details
    Show {
        /// Participant handle
        #[arg(long)]
        handle: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Padding {
    Strict,
    Lenient,
}

impl From<Padding> for PaddingPolicy {
    fn from(padding: Padding) -> Self {
        match padding {
            Padding::Strict => PaddingPolicy::Strict,
            Padding::Lenient => PaddingPolicy::Lenient,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Tamper {
    /// Flip a bit in the last ciphertext byte
    Ciphertext,
    /// Replace the digest with one of different text
    Digest,
    /// Flip the first signature byte
    Signature,
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sealchat=info,sealchat_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let ctx = Arc::new(build_context(&args)?);
    let service = SealingService::new(Arc::clone(&ctx));

    let outcome = tokio::select! {
        result = run(&service, args.command, args.shared_key.is_some()) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            Ok(())
        }
    };

    if let Some(metrics) = ctx.metrics() {
        metrics.shutdown();
    }
    outcome
}

fn build_context(args: &Args) -> Result<CryptoContext> {
    let config = SealConfig {
        identity_dir: args.identity_dir.clone(),
        passphrase: args.passphrase.clone(),
        padding: args.padding.into(),
        crypto_timeout: Duration::from_millis(args.timeout_ms),
        metrics: MetricsConfig {
            path: args.metrics.clone(),
            ..MetricsConfig::default()
        },
        ..SealConfig::default()
    };

    let ctx = match &args.shared_key {
        Some(key_hex) => {
            let bytes = hex::decode(key_hex.trim()).wrap_err("Shared key is not hex")?;
            let key = SharedKey::from_slice(&bytes)?;
            tracing::info!(fingerprint = %key.fingerprint(), "Using supplied shared key");
            CryptoContext::from_config_with_key(config, key)
        }
        None => CryptoContext::from_config(config),
    };
    ctx.wrap_err("Failed to set up the pipeline")
}

async fn run(service: &SealingService, command: Command, has_shared_key: bool) -> Result<()> {
    let ctx = service.context();

    match command {
        Command::Identity(IdentityCommand::Create { handle, name, email }) => {
            let name = name.unwrap_or_else(|| handle.clone());
            let identity = ctx.identities().generate(&handle, &name, email.as_deref())?;
            print_json(&identity.summary()?)?;
        }

        Command::Identity(IdentityCommand::Show { handle }) => {
            let identity = ctx.identities().load(&handle)?;
            let summary: IdentitySummary = identity.summary()?;
            print_json(&summary)?;
            println!("{}", identity.certificate().to_pem());
        }

        Command::Send {
            from,
            message,
            name,
            email,
            tamper,
            save_dir,
        } => {
            let name = name.unwrap_or_else(|| from.clone());
            let mut envelope = service
                .seal_provisioning(&from, &name, email.as_deref(), &message)
                .await?;

            if let Some(tamper) = tamper {
                apply_tamper(&mut envelope, tamper)?;
                tracing::info!(?tamper, "Tampered with envelope");
            }

            println!("{}", envelope.to_json()?);
            if let Some(dir) = save_dir {
                let path = envelope.save_to_dir(&dir)?;
                println!("saved to {}", path.display());
            }

            let verdict = service.unseal(envelope).await;
            print_verdict(&verdict);
        }

        Command::Inspect { file } => {
            let envelope = Envelope::load_from_file(&file)
                .wrap_err_with(|| format!("Failed to read {}", file.display()))?;
            println!("sender:    {}", envelope.sender);
            println!("timestamp: {}", envelope.timestamp);
            println!("digest:    {}", envelope.message_hash);

            match IdentityCertificate::from_pem(&envelope.certificate)
                .and_then(|cert| IdentitySummary::from_certificate(&envelope.sender, &cert))
            {
                Ok(summary) => print_json(&summary)?,
                Err(e) => println!("certificate: unreadable ({})", e),
            }

            if !has_shared_key {
                println!("not unsealed: pass --shared-key with the key it was sealed under");
                return Ok(());
            }
            let verdict = service.unseal(envelope).await;
            print_verdict(&verdict);
        }
    }

    Ok(())
}

fn apply_tamper(envelope: &mut Envelope, tamper: Tamper) -> Result<()> {
    match tamper {
        Tamper::Ciphertext => {
            use base64::Engine as _;
            let engine = base64::engine::general_purpose::STANDARD;
            let mut blob = engine.decode(&envelope.encrypted_message)?;
            let last = blob.last_mut().ok_or_else(|| eyre!("Empty ciphertext"))?;
            *last ^= 0x01;
            envelope.encrypted_message = engine.encode(&blob);
        }
        Tamper::Digest => {
            envelope.message_hash = crypto::digest(&format!("{} (edited)", envelope.message));
        }
        Tamper::Signature => {
            let mut signature = hex::decode(&envelope.signature)?;
            let first = signature.first_mut().ok_or_else(|| eyre!("Empty signature"))?;
            *first ^= 0xFF;
            envelope.signature = hex::encode(signature);
        }
    }
    Ok(())
}

fn print_verdict(verdict: &Verdict) {
    println!("{}", verdict);
    match (&verdict.plaintext, &verdict.failure) {
        (Some(text), _) => println!("plaintext: {}", text),
        (None, Some(failure)) => println!("detail:    {}", failure.detail()),
        (None, None) => {}
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
