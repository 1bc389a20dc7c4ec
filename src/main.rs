#![allow(clippy::print_stdout)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use call_activity_bridge::config::AppConfig;
use call_activity_bridge::crm::CrmDirectory;
use call_activity_bridge::directory::{ContactDirectory, InMemoryDirectory};
use call_activity_bridge::ingress;
use call_activity_bridge::ledger::InMemoryLedger;
use call_activity_bridge::logging::{init_logging, OperationTimer};
use call_activity_bridge::metrics::MetricsCollector;
use call_activity_bridge::models::{CallEvent, Contact};
use call_activity_bridge::phone;
use call_activity_bridge::processor::EventProcessor;
use call_activity_bridge::server::{self, AppState};
use call_activity_bridge::signature::{self, SignatureAlgorithm};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/default, config/local, call-bridge)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server
    Serve {
        /// Override server.bind_address
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Run a webhook payload file through the pipeline against an in-memory directory
    Process {
        /// Webhook body (JSON, compact token, or a JSON array of call events)
        payload: PathBuf,

        /// JSON array of contacts to seed the directory with
        #[arg(long)]
        contacts: Option<PathBuf>,
    },
    /// Normalize a phone number
    Normalize {
        phone: String,
    },
    /// Compute a signature for a body file
    Sign {
        body: PathBuf,

        /// Secret (defaults to webhook.provider_secret)
        #[arg(short, long)]
        secret: Option<String>,

        /// Generic header algorithm (sha256 or sha1); legacy hex when omitted
        #[arg(short, long)]
        algorithm: Option<String>,
    },
    /// Check a signature for a body file
    Verify {
        body: PathBuf,

        signature: String,

        /// Secret (defaults to webhook.provider_secret, or generic_secret with --generic)
        #[arg(short, long)]
        secret: Option<String>,

        /// Treat the signature as a generic `sha256=`/`sha1=` header
        #[arg(long)]
        generic: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    // Initialize logging
    let _log_guard = init_logging(
        Some(&config.get_log_level()),
        config.logging.file_path.as_deref().map(Path::new),
        &config.logging.format,
    )?;

    if let Err(e) = MetricsCollector::init() {
        warn!("Metrics recorder not installed: {}", e);
    }

    match cli.command {
        Commands::Serve { bind } => serve(config, bind).await?,
        Commands::Process { payload, contacts } => process_file(&config, &payload, contacts.as_deref()).await?,
        Commands::Normalize { phone } => normalize(&phone)?,
        Commands::Sign {
            body,
            secret,
            algorithm,
        } => sign(&config, &body, secret, algorithm.as_deref())?,
        Commands::Verify {
            body,
            signature,
            secret,
            generic,
        } => verify(&config, &body, &signature, secret, generic)?,
    }

    Ok(())
}

/// Run the HTTP surface with the live or in-memory directory
async fn serve(config: AppConfig, bind: Option<String>) -> Result<()> {
    let addr: SocketAddr = bind
        .as_deref()
        .unwrap_or(&config.server.bind_address)
        .parse()
        .context("Invalid bind address")?;

    let ledger = Arc::new(InMemoryLedger::new());
    let mut test_directory = None;
    let directory: Arc<dyn ContactDirectory> = if config.crm.test_mode() {
        warn!("CRM api key not configured - using in-memory directory");
        let directory = Arc::new(InMemoryDirectory::new());
        test_directory = Some(Arc::clone(&directory));
        directory
    } else {
        info!(base_url = %config.crm.base_url, "Using live CRM directory");
        Arc::new(CrmDirectory::new(&config.crm)?)
    };

    let processor = Arc::new(EventProcessor::new(directory, ledger, config.crm.secret_key.clone()));
    let state = AppState::new(processor, config.webhook.clone(), test_directory)
        .with_admin_token(config.server.admin_token());

    server::serve(state, addr).await?;
    Ok(())
}

/// Process a payload file offline and print the response
async fn process_file(config: &AppConfig, payload: &Path, contacts: Option<&Path>) -> Result<()> {
    let timer = OperationTimer::new("process_file");

    let seed: Vec<Contact> = match contacts {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read contacts file {}", path.display()))?;
            serde_json::from_str(&raw).context("Contacts file must be a JSON array of contacts")?
        },
        None => Vec::new(),
    };
    info!("Seeding in-memory directory with {} contacts", seed.len());

    let directory = Arc::new(InMemoryDirectory::with_contacts(seed));
    let processor = EventProcessor::new(
        directory.clone(),
        Arc::new(InMemoryLedger::new()),
        config.crm.secret_key.clone(),
    );

    let body = std::fs::read(payload).with_context(|| format!("Failed to read payload {}", payload.display()))?;
    let value = ingress::decode_body(&body, None)?;

    let output = if value.is_array() {
        let events: Vec<CallEvent> = serde_json::from_value(value).context("Invalid call event array")?;
        serde_json::to_value(processor.process_batch(&events).await)?
    } else {
        let payload = ingress::detect_payload(value)?;
        ingress::dispatch(&processor, payload).await.body
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    info!(
        activities = directory.activities().len(),
        duration_ms = timer.finish().as_millis() as u64,
        "Payload processed"
    );
    Ok(())
}

fn normalize(raw: &str) -> Result<()> {
    let normalized = phone::normalize(raw).with_context(|| format!("Invalid phone number: {raw}"))?;
    let output: Value = serde_json::to_value(&normalized)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn parse_algorithm(name: &str) -> Result<SignatureAlgorithm> {
    match name.to_lowercase().as_str() {
        "sha256" => Ok(SignatureAlgorithm::Sha256),
        "sha1" => Ok(SignatureAlgorithm::Sha1),
        other => Err(anyhow::anyhow!("Unsupported algorithm: {other}. Must be sha256 or sha1")),
    }
}

fn sign(config: &AppConfig, body: &Path, secret: Option<String>, algorithm: Option<&str>) -> Result<()> {
    let body = std::fs::read(body).with_context(|| format!("Failed to read {}", body.display()))?;
    let secret = secret
        .or_else(|| config.webhook.provider_secret().map(str::to_string))
        .context("No secret given and webhook.provider_secret is not set")?;

    let signature = match algorithm {
        Some(name) => signature::sign_generic(&body, &secret, parse_algorithm(name)?),
        None => signature::sign_legacy(&body, &secret),
    };
    println!("{signature}");
    Ok(())
}

fn verify(config: &AppConfig, body: &Path, signature: &str, secret: Option<String>, generic: bool) -> Result<()> {
    let body = std::fs::read(body).with_context(|| format!("Failed to read {}", body.display()))?;
    let configured = if generic {
        config.webhook.generic_secret()
    } else {
        config.webhook.provider_secret()
    };
    let secret = secret
        .or_else(|| configured.map(str::to_string))
        .context("No secret given and none configured")?;

    let valid = if generic {
        signature::verify_generic_signature(&body, signature, &secret)
    } else {
        signature::verify_provider_signature(&body, signature, &secret)
    };

    if valid {
        println!("valid");
        Ok(())
    } else {
        Err(anyhow::anyhow!("Signature does not match"))
    }
}
