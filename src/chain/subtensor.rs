//! Snapshot provider reading the Subtensor pallet
//!
//! A snapshot is assembled from these storage items:
//!
//! | Item                              | Used for                          |
//! |-----------------------------------|-----------------------------------|
//! | `TotalNetworks`                   | upper bound of netuids            |
//! | `SubnetworkN[netuid]`             | whether the subnet exists         |
//! | `SubnetTaoInEmission[netuid]`     | emission per block, in rao        |
//! | `ValidatorPermit[netuid]`         | uids holding a validator permit   |
//! | `Keys[(netuid, uid)]`             | hotkey of a permitted uid         |
//! | `TotalHotkeyAlpha[(hotkey, netuid)]` | stake of the hotkey on a subnet |
//! | `Owner[hotkey]`                   | coldkey                           |
//! | `Delegates[hotkey]`               | take, u16 normalised              |
//!
//! Units: `TotalHotkeyAlpha` is denominated in the subnet's alpha token
//! while `SubnetTaoInEmission` is TAO. Both are scaled by `rao_per_tao` and
//! divided as-is, so a subnet's rate is TAO emitted per unit of alpha
//! staked. On the root subnet (netuid 0) alpha is TAO and the rate is a
//! plain TAO yield; elsewhere it is only comparable after converting alpha
//! at the subnet's pool price, which this provider does not read.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use parity_scale_codec::Encode;
use sp_core::crypto::{AccountId32, Ss58Codec};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use subxt::dynamic::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::decode::{decode_account_id32, decode_ss58, decode_u128, decode_u16, decode_vec_bool, u16_fraction};
use super::snapshot::ChainSnapshotProvider;
use super::BittensorClient;
use crate::config::Config;
use crate::core::constants::{RAOPERTAO, SUBTENSOR_MODULE};
use crate::errors::{ApyResult, UpstreamFetchError};
use crate::types::{ChainSnapshot, NetUid, RawSubnet, RawValidator};

/// Take applied to hotkeys without a `Delegates` entry (11_796 / 65_535)
pub const DEFAULT_DELEGATE_TAKE: f64 = 11_796.0 / 65_535.0;

/// Storage reads in flight at once
pub const DEFAULT_READ_CONCURRENCY: usize = 32;

struct SubnetRead {
    netuid: NetUid,
    emission_rao: u128,
    permitted_uids: Vec<u16>,
}

struct Seat {
    netuid: NetUid,
    hotkey: AccountId32,
    stake_rao: u128,
}

/// [`ChainSnapshotProvider`] backed by a live Subtensor node
pub struct SubtensorSnapshotProvider {
    rao_per_tao: u128,
    connect_timeout: Duration,
    concurrency: usize,
    clients: Mutex<HashMap<String, Arc<BittensorClient>>>,
}

impl Default for SubtensorSnapshotProvider {
    fn default() -> Self {
        Self::new(RAOPERTAO, Duration::from_secs(30))
    }
}

impl SubtensorSnapshotProvider {
    pub fn new(rao_per_tao: u128, connect_timeout: Duration) -> Self {
        Self {
            rao_per_tao: rao_per_tao.max(1),
            connect_timeout,
            concurrency: DEFAULT_READ_CONCURRENCY,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Provider whose reconnect backoff gives up within one refresh window
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.apy.rao_per_tao, config.cache.fetch_timeout())
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn client(&self, endpoint: &str) -> ApyResult<Arc<BittensorClient>> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(endpoint) {
            return Ok(client.clone());
        }
        let client = BittensorClient::connect_with_retry(endpoint, self.connect_timeout)
            .await
            .map_err(|e| UpstreamFetchError::with_endpoint(e.to_string(), endpoint))?;
        let client = Arc::new(client);
        clients.insert(endpoint.to_string(), client.clone());
        Ok(client)
    }

    async fn forget_client(&self, endpoint: &str) {
        self.clients.lock().await.remove(endpoint);
    }

    fn to_tao(&self, rao: u128) -> f64 {
        rao as f64 / self.rao_per_tao as f64
    }

    async fn read_snapshot(&self, client: &BittensorClient) -> Result<ChainSnapshot> {
        let block = client.block_number().await.context("reading block number")?;

        let total_networks = client
            .storage(SUBTENSOR_MODULE, "TotalNetworks", vec![])
            .await
            .context("reading TotalNetworks")?
            .map(|v| decode_u16(&v))
            .transpose()?
            .unwrap_or(0);

        let subnets: Vec<SubnetRead> = stream::iter(0..total_networks)
            .map(|netuid| read_subnet(client, netuid))
            .buffer_unordered(self.concurrency)
            .try_collect::<Vec<_>>()
            .await?
            .into_iter()
            .flatten()
            .collect();

        let seat_keys: Vec<(NetUid, u16)> = subnets
            .iter()
            .flat_map(|s| s.permitted_uids.iter().map(move |uid| (s.netuid, *uid)))
            .collect();
        let seats: Vec<Seat> = stream::iter(seat_keys)
        .map(|(netuid, uid)| read_seat(client, netuid, uid))
        .buffer_unordered(self.concurrency)
        .try_collect::<Vec<_>>()
        .await?
        .into_iter()
        .flatten()
        .collect();

        let mut by_hotkey: BTreeMap<String, (AccountId32, BTreeMap<NetUid, u128>)> = BTreeMap::new();
        for seat in seats {
            let entry = by_hotkey
                .entry(seat.hotkey.to_ss58check())
                .or_insert_with(|| (seat.hotkey.clone(), BTreeMap::new()));
            *entry.1.entry(seat.netuid).or_insert(0) += seat.stake_rao;
        }

        let validators: Vec<RawValidator> = stream::iter(by_hotkey)
            .map(|(ss58, (account, stakes))| async move {
                let (coldkey, take) = read_owner_and_take(client, &account).await?;
                let mut validator = RawValidator::new(ss58, coldkey)
                    .with_permit(true)
                    .with_take(take);
                for (netuid, rao) in stakes {
                    validator = validator.with_stake(netuid, self.to_tao(rao));
                }
                Ok::<_, anyhow::Error>(validator)
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        let totals = ChainSnapshot::subnet_stake_totals(&validators);
        let mut subnets: Vec<RawSubnet> = subnets
            .iter()
            .map(|s| {
                RawSubnet::new(
                    s.netuid,
                    self.to_tao(s.emission_rao),
                    totals.get(&s.netuid).copied().unwrap_or(0.0),
                )
            })
            .collect();
        subnets.sort_by_key(|s| s.netuid);

        debug!(
            block,
            subnets = subnets.len(),
            validators = validators.len(),
            "Read chain snapshot"
        );

        Ok(ChainSnapshot::new(validators, subnets).at_block(block))
    }
}

async fn read_subnet(client: &BittensorClient, netuid: NetUid) -> Result<Option<SubnetRead>> {
    let key = || vec![Value::u128(netuid as u128)];

    let size = client
        .storage(SUBTENSOR_MODULE, "SubnetworkN", key())
        .await
        .with_context(|| format!("reading SubnetworkN[{}]", netuid))?;
    let Some(size) = size.map(|v| decode_u16(&v)).transpose()? else {
        return Ok(None);
    };
    if size == 0 {
        return Ok(None);
    }

    let emission_rao = client
        .storage(SUBTENSOR_MODULE, "SubnetTaoInEmission", key())
        .await
        .with_context(|| format!("reading SubnetTaoInEmission[{}]", netuid))?
        .map(|v| decode_u128(&v))
        .transpose()?
        .unwrap_or(0);

    let permits = client
        .storage(SUBTENSOR_MODULE, "ValidatorPermit", key())
        .await
        .with_context(|| format!("reading ValidatorPermit[{}]", netuid))?
        .map(|v| decode_vec_bool(&v))
        .transpose()?
        .unwrap_or_default();

    let permitted_uids = permits
        .iter()
        .enumerate()
        .filter(|(_, permitted)| **permitted)
        .filter_map(|(uid, _)| u16::try_from(uid).ok())
        .collect();

    Ok(Some(SubnetRead {
        netuid,
        emission_rao,
        permitted_uids,
    }))
}

async fn read_seat(client: &BittensorClient, netuid: NetUid, uid: u16) -> Result<Option<Seat>> {
    let Some(hotkey) = client
        .storage(
            SUBTENSOR_MODULE,
            "Keys",
            vec![Value::u128(netuid as u128), Value::u128(uid as u128)],
        )
        .await
        .with_context(|| format!("reading Keys[{}, {}]", netuid, uid))?
    else {
        return Ok(None);
    };
    let hotkey = decode_account_id32(&hotkey)?;

    let stake_rao = client
        .storage(
            SUBTENSOR_MODULE,
            "TotalHotkeyAlpha",
            vec![Value::from_bytes(hotkey.encode()), Value::u128(netuid as u128)],
        )
        .await
        .with_context(|| format!("reading TotalHotkeyAlpha for uid {} on {}", uid, netuid))?
        .map(|v| decode_u128(&v))
        .transpose()?
        .unwrap_or(0);

    Ok(Some(Seat {
        netuid,
        hotkey,
        stake_rao,
    }))
}

async fn read_owner_and_take(client: &BittensorClient, hotkey: &AccountId32) -> Result<(String, f64)> {
    let key = || vec![Value::from_bytes(hotkey.encode())];

    let coldkey = client
        .storage(SUBTENSOR_MODULE, "Owner", key())
        .await
        .context("reading Owner")?
        .map(|v| decode_ss58(&v))
        .transpose()?
        .unwrap_or_default();

    let take = match client
        .storage(SUBTENSOR_MODULE, "Delegates", key())
        .await
        .context("reading Delegates")?
    {
        Some(v) => u16_fraction(decode_u16(&v)?),
        None => DEFAULT_DELEGATE_TAKE,
    };

    Ok((coldkey, take))
}

#[async_trait]
impl ChainSnapshotProvider for SubtensorSnapshotProvider {
    async fn fetch_snapshot(&self, endpoint: &str) -> ApyResult<ChainSnapshot> {
        let client = self.client(endpoint).await?;
        match self.read_snapshot(&client).await {
            Ok(snapshot) => {
                info!(
                    endpoint,
                    block = snapshot.block,
                    validators = snapshot.validators.len(),
                    subnets = snapshot.subnets.len(),
                    "Fetched chain snapshot"
                );
                Ok(snapshot)
            }
            Err(e) => {
                warn!(endpoint, error = %format!("{:#}", e), "Chain snapshot failed, dropping connection");
                self.forget_client(endpoint).await;
                Err(UpstreamFetchError::with_endpoint(format!("{:#}", e), endpoint).into())
            }
        }
    }
}
