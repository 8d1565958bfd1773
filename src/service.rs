//! Yield service
//!
//! Owns the two collection caches and the collaborators that fill them.
//! Handlers share one `Arc<YieldService>`; nothing here is global.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::apy::{ApyCalculator, ApyComputation};
use crate::cache::{CacheEntry, CacheKey, CacheState, Dataset, ResultCache};
use crate::chain::ChainSnapshotProvider;
use crate::config::Config;
use crate::errors::{ApyResult, NotFoundError, UnauthorizedError};
use crate::metadata::MetadataStore;
use crate::types::{EnrichedSubnet, EnrichedValidator, NetUid, ValidatorIdentity};

pub type ValidatorEntry = Arc<CacheEntry<Vec<EnrichedValidator>>>;
pub type SubnetEntry = Arc<CacheEntry<Vec<EnrichedSubnet>>>;

/// State of one cached collection, as reported by the status endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub dataset: Dataset,
    pub endpoint: String,
    pub state: CacheState,
    pub generation: Option<u64>,
    pub computed_at: Option<DateTime<Utc>>,
    pub items: Option<usize>,
    pub last_error: Option<String>,
}

pub struct YieldService {
    config: Config,
    provider: Arc<dyn ChainSnapshotProvider>,
    metadata: Arc<dyn MetadataStore>,
    calculator: ApyCalculator,
    validators: ResultCache<CacheKey, Vec<EnrichedValidator>>,
    subnets: ResultCache<CacheKey, Vec<EnrichedSubnet>>,
    started_at: DateTime<Utc>,
}

impl YieldService {
    pub fn new(
        config: Config,
        provider: Arc<dyn ChainSnapshotProvider>,
        metadata: Arc<dyn MetadataStore>,
    ) -> ApyResult<Self> {
        let calculator = ApyCalculator::from_config(&config.apy)?;
        let ttl = config.cache.ttl();
        let fetch_timeout = config.cache.fetch_timeout();
        Ok(Self {
            validators: ResultCache::new("validators", ttl, fetch_timeout),
            subnets: ResultCache::new("subnets", ttl, fetch_timeout),
            config,
            provider,
            metadata,
            calculator,
            started_at: Utc::now(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn endpoint(&self) -> &str {
        &self.config.chain.chain_endpoint
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn key(&self, dataset: Dataset) -> CacheKey {
        CacheKey::new(dataset, self.endpoint())
    }

    /// One full cycle: metadata snapshot, chain snapshot, computation
    fn cycle(&self) -> impl std::future::Future<Output = ApyResult<ApyComputation>> + Send + 'static {
        let provider = self.provider.clone();
        let metadata = self.metadata.clone();
        let calculator = self.calculator;
        let endpoint = self.endpoint().to_string();
        async move {
            let labels = metadata.snapshot().await?;
            let snapshot = provider.fetch_snapshot(&endpoint).await?;
            let computation = calculator.compute(&snapshot, &labels, Utc::now())?;
            if !computation.rejected.is_empty() {
                warn!(
                    endpoint = %endpoint,
                    rejected = computation.rejected.len(),
                    "Dropped malformed records during refresh"
                );
            }
            Ok(computation)
        }
    }

    /// Every validator with computed yields
    pub async fn validators(&self) -> ApyResult<ValidatorEntry> {
        let cycle = self.cycle();
        self.validators
            .get(&self.key(Dataset::Validators), move || async move {
                let computation = cycle.await?;
                debug!(count = computation.validators.len(), "Computed validator collection");
                Ok(computation.validators)
            })
            .await
    }

    /// Every subnet with labels and rates, ordered by netuid
    pub async fn subnets(&self) -> ApyResult<SubnetEntry> {
        let cycle = self.cycle();
        self.subnets
            .get(&self.key(Dataset::Subnets), move || async move {
                let computation = cycle.await?;
                debug!(count = computation.subnets.len(), "Computed subnet collection");
                Ok(computation.subnets)
            })
            .await
    }

    /// Look up one validator by hotkey
    pub async fn validator(&self, hotkey: &str) -> ApyResult<EnrichedValidator> {
        let entry = self.validators().await?;
        entry
            .value
            .iter()
            .find(|v| v.hotkey == hotkey)
            .cloned()
            .ok_or_else(|| NotFoundError::entity("validator", hotkey).into())
    }

    /// Look up one subnet by netuid
    pub async fn subnet(&self, netuid: NetUid) -> ApyResult<EnrichedSubnet> {
        let entry = self.subnets().await?;
        entry
            .value
            .iter()
            .find(|s| s.netuid == netuid)
            .cloned()
            .ok_or_else(|| NotFoundError::entity("subnet", netuid.to_string()).into())
    }

    /// Check an admin key presented by a caller
    pub fn authorize_admin(&self, presented: Option<&str>) -> ApyResult<()> {
        if self.config.admin.authorize(presented) {
            Ok(())
        } else {
            Err(UnauthorizedError::new("invalid or missing admin key").into())
        }
    }

    /// Store a subnet label override and expire the subnet collection
    pub async fn update_subnet_metadata(
        &self,
        netuid: NetUid,
        name: &str,
        symbol: &str,
    ) -> ApyResult<()> {
        self.metadata.set_override(netuid, name, symbol).await?;
        self.subnets.invalidate(&self.key(Dataset::Subnets));
        info!(netuid, name, symbol, "Updated subnet metadata");
        Ok(())
    }

    /// Store a validator identity and expire the validator collection
    pub async fn set_validator_identity(
        &self,
        hotkey: &str,
        identity: ValidatorIdentity,
    ) -> ApyResult<()> {
        self.metadata.set_validator_identity(hotkey, identity).await?;
        self.validators.invalidate(&self.key(Dataset::Validators));
        info!(hotkey, "Updated validator identity");
        Ok(())
    }

    /// Fill both collections once. Failures are logged, not returned.
    pub async fn warm(&self) {
        let (validators, subnets) = futures::join!(self.validators(), self.subnets());
        match validators {
            Ok(entry) => info!(count = entry.value.len(), "Warmed validator cache"),
            Err(e) => warn!(error = %e, "Failed to warm validator cache"),
        }
        match subnets {
            Ok(entry) => info!(count = entry.value.len(), "Warmed subnet cache"),
            Err(e) => warn!(error = %e, "Failed to warm subnet cache"),
        }
    }

    /// Current state of both collections
    pub fn cache_status(&self) -> Vec<CacheStatus> {
        vec![
            status_of(&self.validators, self.key(Dataset::Validators)),
            status_of(&self.subnets, self.key(Dataset::Subnets)),
        ]
    }

    pub fn cache_state(&self, dataset: Dataset) -> CacheState {
        match dataset {
            Dataset::Validators => self.validators.state(&self.key(dataset)),
            Dataset::Subnets => self.subnets.state(&self.key(dataset)),
        }
    }
}

fn status_of<T: Send + Sync + 'static>(cache: &ResultCache<CacheKey, Vec<T>>, key: CacheKey) -> CacheStatus {
    let entry = cache.peek(&key);
    CacheStatus {
        dataset: key.dataset,
        state: cache.state(&key),
        generation: entry.as_ref().map(|e| e.generation),
        computed_at: entry.as_ref().map(|e| e.computed_at),
        items: entry.as_ref().map(|e| e.value.len()),
        last_error: cache.last_error(&key).map(|e| e.to_string()),
        endpoint: key.endpoint,
    }
}
