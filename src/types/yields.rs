//! Validator and subnet records with computed yields
//!
//! Field names serialize in camelCase to match the public API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::chain::NetUid;

/// A validator with its yields and display metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedValidator {
    pub hotkey: String,
    pub coldkey: String,
    pub nominator: String,
    pub validator_permit: bool,
    pub take: f64,
    pub staked_by_subnet: BTreeMap<NetUid, f64>,
    pub total_stake: f64,
    pub subnet_count: usize,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default)]
    pub verified: bool,
    /// Stake weighted annual yield, as a fraction
    pub apy: f64,
    /// `apy` net of take
    pub nominator_apy: f64,
    pub per_subnet_apy: BTreeMap<NetUid, f64>,
    pub last_updated: DateTime<Utc>,
}

impl EnrichedValidator {
    /// Stake on one subnet, zero when absent
    pub fn stake_in(&self, netuid: NetUid) -> f64 {
        self.staked_by_subnet.get(&netuid).copied().unwrap_or(0.0)
    }

    /// Whether the validator holds nonzero stake on a subnet
    pub fn is_staked_in(&self, netuid: NetUid) -> bool {
        self.stake_in(netuid) > 0.0
    }
}

/// A subnet with its labels and annualised rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedSubnet {
    pub netuid: NetUid,
    pub name: String,
    pub symbol: String,
    pub emission_rate: f64,
    pub total_stake: f64,
    /// Annualised yield of the subnet's stake pool, as a fraction
    pub apy: f64,
    /// Validators in the snapshot holding stake on this subnet
    pub validator_count: usize,
}
