use async_trait::async_trait;

use crate::errors::ApyResult;
use crate::types::ChainSnapshot;

/// Source of raw validator and subnet records.
///
/// Any failure, transport or protocol, is reported as an upstream error;
/// the caller treats them all as a failed refresh.
#[async_trait]
pub trait ChainSnapshotProvider: Send + Sync {
    async fn fetch_snapshot(&self, endpoint: &str) -> ApyResult<ChainSnapshot>;
}
