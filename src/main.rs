//! keyseries server
//!
//! Run with: cargo run --bin keyseries [-- --config path/to/config.toml]
//!
//! Configuration comes from the first config file found (see
//! [`keyseries::config::Config::load_default`]) with `KEYSERIES_*`
//! environment overrides. `RUST_LOG` takes precedence over the configured
//! log level.

use anyhow::Context;
use clap::Parser;
use keyseries::api::{serve, AppState};
use keyseries::config::{BackendKind, Config, LoggingConfig};
use keyseries::events::ErrorKeyRecorder;
use keyseries::hub::Hub;
use keyseries::storage::KeyPath;
use keyseries::store::Store;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "keyseries")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Hierarchical key-addressed time-series server")]
struct Args {
    /// Config file (default: search the standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("keyseries={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    init_tracing(&config.logging);
    tracing::info!("Starting keyseries v{}", env!("CARGO_PKG_VERSION"));

    let hub = Arc::new(Hub::new(config.hub.clone()));
    let mut builder = Store::builder()
        .hub(Arc::clone(&hub))
        .config(config.storage.store_config());

    if config.storage.backend != BackendKind::Memory {
        tracing::info!("Data directory: {}", config.storage.data_dir);
        builder = builder.data_dir(config.storage.data_path());
    }

    let mut drain = None;
    if !config.storage.error_namespace.is_empty() {
        let namespace = KeyPath::parse(&config.storage.error_namespace)
            .context("Invalid storage.error_namespace")?;
        let (recorder, receiver) = ErrorKeyRecorder::new(namespace);
        builder = builder.observer(Arc::new(recorder));
        drain = Some(receiver);
    }

    let backend = config
        .storage
        .open_backend()
        .context("Failed to open backing medium")?;
    tracing::info!("Backing medium: {}", backend.name());

    let store = Arc::new(builder.backend(backend).open().await?);
    let drain_handle = drain.map(|drain| drain.spawn(Arc::clone(&store)));

    let state = AppState::new(Arc::clone(&store), config.api.clone());
    serve(state, &config.api).await?;

    if let Some(handle) = drain_handle {
        handle.abort();
    }
    tracing::info!("keyseries shutdown complete");
    Ok(())
}
