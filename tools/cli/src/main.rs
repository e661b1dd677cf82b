//! TwinSync CLI - keeps a key-value store in line with a desired configuration.
//!
//! `twinsync run` hosts the reconciliation engine behind a JSON-lines
//! stream; the other commands are one-shot operations against a store.

mod host;
mod settings;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use twinsync_common::{ConfigField, ConfigurationSnapshot};
use twinsync_storage::create_default_registry;
use twinsync_sync::{
    methods::{GET_ITEM, SET_ITEM},
    DirectMethods, ReconcileScheduler, ReconciliationEngine, StoreConnectionManager,
};

use host::{Host, JsonLinesChannel, JsonLinesWriter, Outbound};
use settings::{Overrides, Settings};

#[derive(Parser)]
#[command(name = "twinsync")]
#[command(about = "TwinSync - configuration-driven key-value store synchronizer")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON settings file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store backend (overrides the settings file).
    #[arg(long, global = true)]
    store: Option<String>,

    /// Store connect timeout in milliseconds.
    #[arg(long, global = true)]
    connect_timeout_ms: Option<u64>,

    /// Path-style blob service base URL, e.g. a local emulator.
    #[arg(long, global = true)]
    blob_service_url: Option<String>,

    /// Skip bulk source lines without a ':' instead of failing the load.
    #[arg(long, global = true)]
    skip_malformed: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile desired configuration read as JSON lines.
    Run {
        /// Read messages from a file instead of stdin.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Desired configuration document applied before any input.
        #[arg(short, long)]
        desired: Option<PathBuf>,
    },

    /// Read one key from a store.
    Get {
        /// Store endpoint, e.g. "cache:6379".
        #[arg(short, long)]
        endpoint: String,

        /// Key to read.
        key: String,
    },

    /// Write one "key:value" item to a store.
    Set {
        /// Store endpoint, e.g. "cache:6379".
        #[arg(short, long)]
        endpoint: String,

        /// Item as "key:value".
        item: String,
    },

    /// Run a single bulk load into a store.
    Load(LoadArgs),

    /// List available store backends.
    Backends,
}

#[derive(Args)]
struct LoadArgs {
    /// Store endpoint, e.g. "cache:6379".
    #[arg(short, long)]
    endpoint: String,

    /// Storage account name.
    #[arg(long)]
    account: String,

    /// Blob container name.
    #[arg(long)]
    container: String,

    /// Blob (object) name within the container.
    #[arg(long)]
    blob: String,

    /// Shared access signature for the blob.
    #[arg(long)]
    sas_token: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let overrides = Overrides {
        store_backend: cli.store.clone(),
        connect_timeout_ms: cli.connect_timeout_ms,
        blob_service_url: cli.blob_service_url.clone(),
        skip_malformed: cli.skip_malformed,
    };

    match cli.command {
        Commands::Backends => cmd_backends(),
        command => {
            let settings = Settings::resolve(cli.config.as_deref(), &overrides)?;
            match command {
                Commands::Run { input, desired } => cmd_run(&settings, input, desired).await,
                Commands::Get { endpoint, key } => {
                    cmd_item(&settings, &endpoint, GET_ITEM, &key).await
                }
                Commands::Set { endpoint, item } => {
                    cmd_item(&settings, &endpoint, SET_ITEM, &item).await
                }
                Commands::Load(args) => cmd_load(&settings, args).await,
                Commands::Backends => cmd_backends(),
            }
        }
    }
}

/// Log to stderr; stdout carries the JSON-lines output.
fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn read_document(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Host the engine until the input ends or an interrupt arrives.
async fn cmd_run(settings: &Settings, input: Option<PathBuf>, desired: Option<PathBuf>) -> Result<()> {
    let shutdown = CancellationToken::new();
    let writer = Arc::new(JsonLinesWriter::new(tokio::io::stdout()));

    let engine = ReconciliationEngine::new(
        settings.connector()?,
        settings.fetcher()?,
        Arc::new(JsonLinesChannel::new(writer.clone())),
        &settings.sync,
    )
    .with_shutdown(shutdown.clone());
    let methods = DirectMethods::new(engine.store_slot());

    let (scheduler, worker) = ReconcileScheduler::new(settings.sync.queue_capacity, shutdown.clone());
    let worker = tokio::spawn(worker.run(engine));

    // A panicking worker takes the host down with it.
    let watchdog = shutdown.clone();
    let worker = tokio::spawn(async move {
        let result = worker.await;
        if result.is_err() {
            error!("Reconciliation worker failed; shutting down");
            watchdog.cancel();
        }
        result
    });

    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; shutting down");
            interrupt.cancel();
        }
    });

    info!(backend = %settings.store_backend, "TwinSync started");

    let host = Host::new(scheduler, methods, writer, shutdown);
    if let Some(path) = desired {
        host.submit_document(read_document(&path)?).await?;
    }

    let summary = match input {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            host.serve(BufReader::new(file)).await?
        }
        None => host.serve(BufReader::new(tokio::io::stdin())).await?,
    };

    let engine = worker
        .await
        .context("Worker watchdog failed")?
        .context("Reconciliation worker failed")?;
    info!(
        snapshots = summary.snapshots,
        methods = summary.methods,
        ignored = summary.ignored,
        cycles = engine.cycles(),
        "TwinSync stopped"
    );

    Ok(())
}

/// Run one direct method against `endpoint` and print the response.
async fn cmd_item(settings: &Settings, endpoint: &str, method: &str, request: &str) -> Result<()> {
    let manager = StoreConnectionManager::new(settings.connector()?);
    manager
        .ensure_connected(endpoint)
        .await
        .with_context(|| format!("Failed to connect to {}", endpoint))?;

    let methods = DirectMethods::new(manager.slot());
    let response = methods.invoke(method, request.as_bytes()).await;
    manager.close().await;

    println!("{}", serde_json::to_string(&response)?);
    if !response.is_success() {
        anyhow::bail!("{} failed: {}", method, response.message);
    }

    Ok(())
}

/// Apply a full configuration once and report the bulk load.
async fn cmd_load(settings: &Settings, args: LoadArgs) -> Result<()> {
    let writer = Arc::new(JsonLinesWriter::new(tokio::io::stdout()));
    let mut engine = ReconciliationEngine::new(
        settings.connector()?,
        settings.fetcher()?,
        Arc::new(JsonLinesChannel::new(writer.clone())),
        &settings.sync,
    );

    let snapshot = ConfigurationSnapshot::new()
        .with_field(ConfigField::Endpoint, &args.endpoint)
        .with_field(ConfigField::StorageAccountName, &args.account)
        .with_field(ConfigField::BlobContainerName, &args.container)
        .with_field(ConfigField::BlobFileName, &args.blob)
        .with_field(ConfigField::BlobSasToken, &args.sas_token);

    let report = engine.on_snapshot(&snapshot).await;
    engine.close().await;

    if let Some(Err(e)) = &report.connection {
        anyhow::bail!("Failed to connect to {}: {}", args.endpoint, e);
    }
    match report.bulk_load {
        Some(Ok(load)) => {
            writer.send(&Outbound::Load { report: &load }).await?;
            Ok(())
        }
        Some(Err(failure)) => Err(failure).context("Bulk load failed"),
        None => anyhow::bail!("Bulk source coordinates are incomplete"),
    }
}

fn cmd_backends() -> Result<()> {
    for name in create_default_registry().backends() {
        println!("{}", name);
    }
    Ok(())
}
