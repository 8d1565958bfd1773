//! Configuration for the yield service
//! Defaults, environment overrides and builder methods for every tunable
//! the service exposes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::constants;

/// Default network configuration
pub const DEFAULT_NETWORK: &str = "finney";
pub const DEFAULT_CHAIN_ENDPOINT: &str = constants::FINNEY_ENDPOINT;

/// Network endpoints mapping
pub fn get_network_endpoint(network: &str) -> &'static str {
    match network {
        "finney" => constants::FINNEY_ENDPOINT,
        "test" | "testnet" => constants::FINNEY_TEST_ENDPOINT,
        "archive" => constants::ARCHIVE_ENDPOINT,
        "local" => constants::LOCAL_ENDPOINT,
        _ => DEFAULT_CHAIN_ENDPOINT,
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub default_batch_size: usize,
    pub max_batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: constants::DEFAULT_HTTP_PORT,
            request_timeout_secs: 30,
            default_batch_size: constants::DEFAULT_BATCH_SIZE,
            max_batch_size: constants::MAX_BATCH_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Socket address string suitable for `TcpListener::bind`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Chain connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainConfig {
    pub network: String,
    pub chain_endpoint: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            chain_endpoint: DEFAULT_CHAIN_ENDPOINT.to_string(),
        }
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Age after which a cached collection is refreshed
    pub ttl_secs: u64,
    /// Bound on a single upstream snapshot fetch
    pub fetch_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: constants::DEFAULT_CACHE_TTL_SECS,
            fetch_timeout_secs: constants::DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Yield calculation parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApyConfig {
    /// Emission periods in a year; emission rates are per period
    pub periods_per_year: f64,
    /// Raw chain units per token
    pub rao_per_tao: u128,
}

impl Default for ApyConfig {
    fn default() -> Self {
        Self {
            periods_per_year: constants::BLOCKS_PER_YEAR as f64,
            rao_per_tao: constants::RAOPERTAO,
        }
    }
}

/// Metadata store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MetadataConfig {
    /// JSON document backing the store; in-memory when unset
    pub path: Option<PathBuf>,
}

/// Administrative surface configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AdminConfig {
    /// Shared secret for admin calls; admin calls are refused when unset
    pub admin_key: Option<String>,
}

impl AdminConfig {
    /// Check a presented key against the configured one
    pub fn authorize(&self, presented: Option<&str>) -> bool {
        match (&self.admin_key, presented) {
            (Some(expected), Some(given)) => !expected.is_empty() && expected == given,
            _ => false,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub chain: ChainConfig,
    pub cache: CacheConfig,
    pub apy: ApyConfig,
    pub metadata: MetadataConfig,
    pub admin: AdminConfig,
    /// Additional custom configuration
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config for a specific network
    pub fn for_network(network: &str) -> Self {
        Self::default().with_network(network)
    }

    /// Set network
    pub fn with_network(mut self, network: &str) -> Self {
        self.chain.network = network.to_string();
        self.chain.chain_endpoint = get_network_endpoint(network).to_string();
        self
    }

    /// Set chain endpoint directly
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.chain.chain_endpoint = endpoint.to_string();
        self
    }

    /// Set HTTP port
    pub fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    /// Set cache time-to-live
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl_secs = ttl.as_secs();
        self
    }

    /// Set the annualisation factor
    pub fn with_periods_per_year(mut self, periods: f64) -> Self {
        self.apy.periods_per_year = periods;
        self
    }

    /// Set the metadata document path
    pub fn with_metadata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata.path = Some(path.into());
        self
    }

    /// Set the admin key
    pub fn with_admin_key(mut self, key: impl Into<String>) -> Self {
        self.admin.admin_key = Some(key.into());
        self
    }

    /// Load config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(network) = std::env::var("APY_NETWORK") {
            config = config.with_network(&network);
        }

        if let Ok(endpoint) = std::env::var("APY_CHAIN_ENDPOINT") {
            config.chain.chain_endpoint = endpoint;
        }

        if let Some(ttl) = env_parse::<u64>("APY_CACHE_TTL_SECS") {
            config.cache.ttl_secs = ttl;
        }

        if let Some(timeout) = env_parse::<u64>("APY_FETCH_TIMEOUT_SECS") {
            config.cache.fetch_timeout_secs = timeout;
        }

        if let Some(periods) = env_parse::<f64>("APY_PERIODS_PER_YEAR") {
            config.apy.periods_per_year = periods;
        }

        if let Ok(host) = std::env::var("APY_HOST") {
            config.server.host = host;
        }

        if let Some(port) = env_parse::<u16>("APY_PORT") {
            config.server.port = port;
        }

        if let Ok(path) = std::env::var("APY_METADATA_PATH") {
            if !path.is_empty() {
                config.metadata.path = Some(PathBuf::from(path));
            }
        }

        if let Ok(key) = std::env::var("APY_ADMIN_KEY") {
            if !key.is_empty() {
                config.admin.admin_key = Some(key);
            }
        }

        config
    }

    /// Merge with another config (other takes precedence where it differs from defaults)
    pub fn merge(mut self, other: Config) -> Self {
        let defaults = Config::default();
        if other.chain != defaults.chain {
            self.chain = other.chain;
        }
        if other.server != defaults.server {
            self.server = other.server;
        }
        if other.cache != defaults.cache {
            self.cache = other.cache;
        }
        if other.apy != defaults.apy {
            self.apy = other.apy;
        }
        if other.metadata.path.is_some() {
            self.metadata = other.metadata;
        }
        if other.admin.admin_key.is_some() {
            self.admin = other.admin;
        }
        self.extra.extend(other.extra);
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparsable environment value");
            None
        }
    }
}
