//! APY server binary entrypoint.
//!
//! Serves validator and subnet yields computed from a Subtensor endpoint.
//! Settings come from `APY_*` environment variables; flags override them.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use bittensor_apy::api;
use bittensor_apy::chain::{ChainSnapshotProvider, SubtensorSnapshotProvider};
use bittensor_apy::config::Config;
use bittensor_apy::logging::{init_logging, LogFormat, LoggingConfig};
use bittensor_apy::metadata::{InMemoryMetadataStore, JsonFileMetadataStore, MetadataStore};
use bittensor_apy::service::YieldService;

/// Bittensor validator and subnet APY server
#[derive(Parser, Debug)]
#[command(name = "apy-server")]
#[command(author = "Cortex Foundation")]
#[command(version)]
#[command(about = "Bittensor validator and subnet APY server", long_about = None)]
struct Args {
    /// Network to read from (finney, test, local, archive)
    #[arg(short, long)]
    network: Option<String>,

    /// Custom RPC endpoint (overrides --network)
    #[arg(long)]
    endpoint: Option<String>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// JSON file holding subnet labels and validator identities
    #[arg(long)]
    metadata_path: Option<PathBuf>,

    /// Seconds a computed result stays fresh
    #[arg(long)]
    cache_ttl: Option<u64>,

    /// Emission periods per year used to annualize rates
    #[arg(long)]
    periods_per_year: Option<f64>,

    /// Log format (text, json, compact)
    #[arg(long, env = "APY_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn apply(&self, mut config: Config) -> Config {
        if let Some(network) = &self.network {
            config = config.with_network(network);
        }
        if let Some(endpoint) = &self.endpoint {
            config = config.with_endpoint(endpoint);
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(path) = &self.metadata_path {
            config = config.with_metadata_path(path.clone());
        }
        if let Some(ttl) = self.cache_ttl {
            config = config.with_cache_ttl(Duration::from_secs(ttl));
        }
        if let Some(periods) = self.periods_per_year {
            config = config.with_periods_per_year(periods);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::from_env();
    if args.debug {
        logging = logging.with_debug(true);
    }
    if let Some(format) = args.log_format {
        logging = logging.with_format(format);
    }
    init_logging(&logging);

    let config = args.apply(Config::from_env());

    let metadata: Arc<dyn MetadataStore> = match &config.metadata.path {
        Some(path) => Arc::new(
            JsonFileMetadataStore::open(path.clone())
                .await
                .with_context(|| format!("opening metadata store {}", path.display()))?,
        ),
        None => Arc::new(InMemoryMetadataStore::new()),
    };
    let provider: Arc<dyn ChainSnapshotProvider> =
        Arc::new(SubtensorSnapshotProvider::from_config(&config));

    info!(
        network = %config.chain.network,
        endpoint = %config.chain.chain_endpoint,
        ttl_secs = config.cache.ttl_secs,
        periods_per_year = config.apy.periods_per_year,
        "Starting APY server"
    );

    let service = Arc::new(
        YieldService::new(config, provider, metadata).context("invalid service configuration")?,
    );

    let warm = service.clone();
    tokio::spawn(async move { warm.warm().await });

    api::serve(service).await?;
    Ok(())
}
