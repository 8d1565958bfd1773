//! Chain access
//!
//! [`BittensorClient`] wraps a `subxt` online client for dynamic storage
//! reads. Snapshot providers in [`snapshot`], [`subtensor`] and [`mock`]
//! build on it, or stand in for it in tests.

pub mod decode;
pub mod mock;
pub mod snapshot;
pub mod subtensor;

use backoff::{future::retry, Error as BackoffError, ExponentialBackoffBuilder};
use std::time::Duration;
use subxt::{dynamic::Value, PolkadotConfig};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::errors::{ApyError, UpstreamFetchError};

pub use mock::MockSnapshotProvider;
pub use snapshot::ChainSnapshotProvider;
pub use subtensor::SubtensorSnapshotProvider;

/// Initial delay between connection attempts
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Longest delay between connection attempts
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Bound on a single connection attempt
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Error types for chain operations
#[derive(Debug, Error)]
pub enum Error {
    #[error("Subxt error: {0}")]
    Subxt(#[from] subxt::Error),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("Decoding error: {0}")]
    Decoding(String),
}

impl From<Error> for UpstreamFetchError {
    fn from(err: Error) -> Self {
        UpstreamFetchError::new(err.to_string())
    }
}

impl From<Error> for ApyError {
    fn from(err: Error) -> Self {
        ApyError::Upstream(err.into())
    }
}

/// Client for reading chain storage
pub struct BittensorClient {
    api: subxt::OnlineClient<PolkadotConfig>,
    rpc_url: String,
}

impl BittensorClient {
    /// Connect to the given RPC endpoint
    pub async fn new(rpc_url: impl Into<String>) -> Result<Self, Error> {
        let url = rpc_url.into();
        let api = subxt::OnlineClient::<PolkadotConfig>::from_url(&url).await?;
        Ok(Self { api, rpc_url: url })
    }

    /// Connect with exponential backoff, giving up after `max_elapsed`
    pub async fn connect_with_retry(
        rpc_url: impl Into<String>,
        max_elapsed: Duration,
    ) -> Result<Self, Error> {
        let url = rpc_url.into();
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(INITIAL_RETRY_DELAY)
            .with_max_interval(MAX_RETRY_DELAY)
            .with_max_elapsed_time(Some(max_elapsed))
            .build();

        retry(backoff, || async {
            debug!(endpoint = %url, "Connecting to chain");
            match tokio::time::timeout(CONNECTION_TIMEOUT, Self::new(url.as_str())).await {
                Ok(Ok(client)) => {
                    info!(endpoint = %url, "Connected to chain");
                    Ok(client)
                }
                Ok(Err(e)) => {
                    warn!(endpoint = %url, error = %e, "Connection attempt failed");
                    Err(BackoffError::transient(e))
                }
                Err(_) => {
                    warn!(endpoint = %url, "Connection attempt timed out");
                    Err(BackoffError::transient(Error::Rpc(
                        "connection timeout".to_string(),
                    )))
                }
            }
        })
        .await
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Read one storage entry at the latest block. Plain values take an
    /// empty key list.
    pub async fn storage(
        &self,
        module: &str,
        entry: &str,
        keys: Vec<Value>,
    ) -> Result<Option<Value>, Error> {
        let query = subxt::dynamic::storage(module, entry, keys);
        let storage = self.api.storage().at_latest().await?;
        match storage.fetch(&query).await? {
            Some(thunk) => thunk
                .to_value()
                .map(|v| Some(v.remove_context()))
                .map_err(|e| {
                    Error::Decoding(format!("Failed to decode {}::{}: {}", module, entry, e))
                }),
            None => Ok(None),
        }
    }

    /// Latest finalized block number
    pub async fn block_number(&self) -> Result<u64, Error> {
        let finalized = self.api.backend().latest_finalized_block_ref().await?;
        let header = self
            .api
            .backend()
            .block_header(finalized.hash())
            .await
            .map_err(|e| Error::Rpc(format!("Failed to get block header: {}", e)))?;

        match header {
            Some(header) => Ok(header.number as u64),
            None => Err(Error::Rpc("Block header not found".to_string())),
        }
    }
}
