//! permit-gen - S-100 permit generation from the command line.
//!
//! Runs the permit pipeline against configured upstream services and writes
//! each user's permit and signature document to an output directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use base64::Engine;
use clap::{Parser, Subcommand};
use permit_core::engine::client_credentials_source;
use permit_core::signature::read_signature_value;
use permit_core::upn::Upn;
use permit_core::{
    compute_checksum, DirectoryPackager, PermitConfig, PermitEngine, PermitOutcome, PermitPackager,
    PermitRequest, PermitSchema, RequestContext, SignatureProvider, StaticTokenSource, TokenSource,
};
use permit_keyring::{FileSecretStore, SecretStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// permit-gen - S-100 permit generation.
#[derive(Parser)]
#[command(name = "permit-gen")]
#[command(version = VERSION)]
#[command(about = "Generate signed S-100 permits for a licence")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate permits for a licence or an explicit request
    Generate {
        /// Licence id to generate permits for
        #[arg(long, required_unless_present = "request", conflicts_with = "request")]
        licence_id: Option<i64>,

        /// JSON request of products and user permits
        #[arg(long)]
        request: Option<PathBuf>,

        /// Configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Secret file (JSON)
        #[arg(short, long)]
        secrets: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "permits")]
        out: PathBuf,

        /// Static bearer token instead of client-credentials
        #[arg(long)]
        token: Option<String>,

        /// Correlation id for upstream calls and logs
        #[arg(long)]
        correlation_id: Option<String>,
    },

    /// Compute a UPN checksum for an encrypted hardware id
    Checksum {
        /// Encrypted hardware id (32 hex characters)
        #[arg(long)]
        hardware_id: String,

        /// Manufacturer id; prints the full UPN when given
        #[arg(long)]
        manufacturer_id: Option<String>,
    },

    /// Print the Base64 public key of the signing key
    PublicKey {
        /// Secret file (JSON)
        #[arg(short, long)]
        secrets: PathBuf,

        /// Secret name of the signing key
        #[arg(long, default_value = "permit-signing-key")]
        key_name: String,
    },

    /// Verify a permit against its signature document
    Verify {
        /// Permit XML file
        #[arg(long)]
        xml: PathBuf,

        /// Signature document file
        #[arg(long)]
        signature: PathBuf,

        /// Base64 uncompressed SEC1 public key
        #[arg(long)]
        public_key: String,
    },

    /// Show the namespace and version of a permit schema
    SchemaInfo {
        /// XSD file; the bundled schema when omitted
        #[arg(long)]
        schema: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Generate {
            licence_id,
            request,
            config,
            secrets,
            out,
            token,
            correlation_id,
        } => {
            let config = PermitConfig::from_json_file(&config)?;
            let store: Arc<dyn SecretStore> = Arc::new(FileSecretStore::open(&secrets).await?);

            let token_source: Arc<dyn TokenSource> = match token {
                Some(token) => Arc::new(StaticTokenSource::new(token, Duration::from_secs(3600))),
                None => client_credentials_source(&config, store.as_ref()).await?,
            };

            let packager = DirectoryPackager::new(
                &out,
                config.permit_filename.clone(),
                config.signature_filename.clone(),
            );
            let engine = PermitEngine::from_config(config, store, token_source)?;
            let primed = engine.prime_manufacturer_keys().await;
            eprintln!("Loaded {primed} manufacturer key(s)");

            let correlation_id = correlation_id
                .unwrap_or_else(|| format!("permit-gen-{}", chrono::Utc::now().timestamp_millis()));
            let ctx = RequestContext::new(correlation_id.clone());

            let result = match (licence_id, request) {
                (Some(licence_id), _) => {
                    eprintln!("Generating permits for licence {licence_id}...");
                    engine.generate(licence_id, &ctx).await
                },
                (None, Some(path)) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    let request: PermitRequest = serde_json::from_str(&raw)
                        .with_context(|| format!("failed to parse {}", path.display()))?;
                    eprintln!(
                        "Generating permits for {} product(s), {} user(s)...",
                        request.products.len(),
                        request.user_permits.len()
                    );
                    engine.generate_from_request(&request, &ctx).await
                },
                (None, None) => anyhow::bail!("either --licence-id or --request is required"),
            };

            match result {
                Ok(PermitOutcome::NoContent) => {
                    println!("No content (204): no user permits or holdings for this licence");
                },
                Ok(PermitOutcome::Generated(permits)) => {
                    let written = packager.package(&permits).await?;
                    for dir in &written {
                        println!("{}", dir.display());
                    }
                    eprintln!("Wrote {} permit(s) to {}", written.len(), out.display());
                },
                Err(e) => {
                    let response = e.to_response(&correlation_id);
                    println!("{}", serde_json::to_string_pretty(&response)?);
                    anyhow::bail!("permit generation failed ({}): {}", e.status_code(), e);
                },
            }
        },

        Commands::Checksum {
            hardware_id,
            manufacturer_id,
        } => match manufacturer_id {
            Some(manufacturer_id) => {
                let upn = Upn::compose(&hardware_id, &manufacturer_id)?;
                println!("{upn}");
            },
            None => println!("{}", compute_checksum(&hardware_id)),
        },

        Commands::PublicKey { secrets, key_name } => {
            let store: Arc<dyn SecretStore> = Arc::new(FileSecretStore::open(&secrets).await?);
            let provider = SignatureProvider::new(store, key_name, String::new(), String::new());
            let public_key = provider.public_key().await?;
            println!("{}", base64::engine::general_purpose::STANDARD.encode(public_key));
        },

        Commands::Verify {
            xml,
            signature,
            public_key,
        } => {
            let permit = std::fs::read_to_string(&xml)
                .with_context(|| format!("failed to read {}", xml.display()))?;
            let document = std::fs::read_to_string(&signature)
                .with_context(|| format!("failed to read {}", signature.display()))?;
            let public_key = base64::engine::general_purpose::STANDARD
                .decode(public_key.trim())
                .context("public key is not valid Base64")?;

            let value = read_signature_value(&document)?;
            if SignatureProvider::verify(&permit, &value, &public_key)? {
                println!("VALID");
            } else {
                println!("INVALID");
                anyhow::bail!("signature does not match {}", xml.display());
            }
        },

        Commands::SchemaInfo { schema } => {
            let schema = match schema {
                Some(path) => PermitSchema::from_file(path)?,
                None => PermitSchema::bundled()?,
            };
            println!("Namespace: {}", schema.target_namespace());
            println!("Version:   {}", schema.version());
        },
    }

    Ok(())
}
