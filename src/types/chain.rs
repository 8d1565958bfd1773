//! Raw chain records, as produced by a snapshot provider

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Subnet identifier
pub type NetUid = u16;

/// One delegate hotkey as read from chain, amounts in TAO
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawValidator {
    /// Hotkey SS58 address
    pub hotkey: String,
    /// Owner coldkey SS58 address
    pub coldkey: String,
    /// Account credited with nominator rewards
    pub nominator: String,
    pub validator_permit: bool,
    /// Fraction of emission kept by the validator, 0..=1
    pub take: f64,
    /// Stake held on each subnet the hotkey participates in
    pub staked_by_subnet: BTreeMap<NetUid, f64>,
}

impl RawValidator {
    /// Create a validator with no stake, no permit and zero take.
    /// The nominator defaults to the coldkey.
    pub fn new(hotkey: impl Into<String>, coldkey: impl Into<String>) -> Self {
        let coldkey = coldkey.into();
        Self {
            hotkey: hotkey.into(),
            nominator: coldkey.clone(),
            coldkey,
            validator_permit: false,
            take: 0.0,
            staked_by_subnet: BTreeMap::new(),
        }
    }

    pub fn with_take(mut self, take: f64) -> Self {
        self.take = take;
        self
    }

    pub fn with_permit(mut self, permit: bool) -> Self {
        self.validator_permit = permit;
        self
    }

    pub fn with_nominator(mut self, nominator: impl Into<String>) -> Self {
        self.nominator = nominator.into();
        self
    }

    pub fn with_stake(mut self, netuid: NetUid, amount: f64) -> Self {
        self.staked_by_subnet.insert(netuid, amount);
        self
    }

    /// Total stake across subnets
    pub fn total_stake(&self) -> f64 {
        self.staked_by_subnet.values().sum()
    }

    /// Stake on one subnet, zero when absent
    pub fn stake_in(&self, netuid: NetUid) -> f64 {
        self.staked_by_subnet.get(&netuid).copied().unwrap_or(0.0)
    }
}

/// One subnet as read from chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSubnet {
    pub netuid: NetUid,
    /// Tokens emitted to the subnet per period
    pub emission_rate: f64,
    /// Sum of validator stake on the subnet
    pub total_subnet_stake: f64,
}

impl RawSubnet {
    pub fn new(netuid: NetUid, emission_rate: f64, total_subnet_stake: f64) -> Self {
        Self {
            netuid,
            emission_rate,
            total_subnet_stake,
        }
    }
}

/// Everything one fetch cycle reads from chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSnapshot {
    pub validators: Vec<RawValidator>,
    pub subnets: Vec<RawSubnet>,
    /// Block the snapshot was read at, when known
    pub block: Option<u64>,
}

impl ChainSnapshot {
    pub fn new(validators: Vec<RawValidator>, subnets: Vec<RawSubnet>) -> Self {
        Self {
            validators,
            subnets,
            block: None,
        }
    }

    pub fn at_block(mut self, block: u64) -> Self {
        self.block = Some(block);
        self
    }

    /// Subnet totals derived from the validators' stake maps.
    ///
    /// Used by providers that do not read subnet totals from chain.
    pub fn subnet_stake_totals(validators: &[RawValidator]) -> BTreeMap<NetUid, f64> {
        let mut totals = BTreeMap::new();
        for v in validators {
            for (netuid, stake) in &v.staked_by_subnet {
                *totals.entry(*netuid).or_insert(0.0) += *stake;
            }
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_validator_builder() {
        let v = RawValidator::new("5Hot", "5Cold")
            .with_take(0.18)
            .with_permit(true)
            .with_stake(1, 100.0)
            .with_stake(3, 50.0);

        assert_eq!(v.nominator, "5Cold");
        assert_eq!(v.total_stake(), 150.0);
        assert_eq!(v.stake_in(3), 50.0);
        assert_eq!(v.stake_in(9), 0.0);
    }

    #[test]
    fn test_subnet_stake_totals() {
        let validators = vec![
            RawValidator::new("a", "x").with_stake(1, 10.0),
            RawValidator::new("b", "y").with_stake(1, 5.0).with_stake(2, 1.0),
        ];
        let totals = ChainSnapshot::subnet_stake_totals(&validators);
        assert_eq!(totals.get(&1), Some(&15.0));
        assert_eq!(totals.get(&2), Some(&1.0));
    }

    #[test]
    fn test_camel_case_serialization() {
        let v = RawValidator::new("h", "c").with_stake(0, 1.0);
        let json = serde_json::to_value(&v).expect("serialize");
        assert!(json.get("validatorPermit").is_some());
        assert_eq!(json["stakedBySubnet"]["0"], 1.0);
    }
}
