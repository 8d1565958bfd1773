//! Human readable labels kept outside the chain

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::chain::NetUid;
use crate::core::constants::VALIDATOR_LABEL_PREFIX_LEN;

/// Admin supplied subnet name and symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetOverride {
    pub name: String,
    pub symbol: String,
}

impl SubnetOverride {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
        }
    }
}

/// Public identity of a validator hotkey
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
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
}

impl ValidatorIdentity {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// Point-in-time copy of every stored label.
///
/// Taken once at the start of a refresh so concurrent admin writes never
/// mix into a computation that is already running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    #[serde(default)]
    pub subnets: BTreeMap<NetUid, SubnetOverride>,
    #[serde(default)]
    pub validators: BTreeMap<String, ValidatorIdentity>,
}

impl MetadataSnapshot {
    /// Name and symbol for a subnet, falling back to generated labels
    pub fn subnet_labels(&self, netuid: NetUid) -> (String, String) {
        match self.subnets.get(&netuid) {
            Some(o) => (o.name.clone(), o.symbol.clone()),
            None => (default_subnet_name(netuid), default_subnet_symbol(netuid)),
        }
    }

    pub fn validator_identity(&self, hotkey: &str) -> Option<&ValidatorIdentity> {
        self.validators.get(hotkey)
    }

    /// Display name for a validator, falling back to a generated label
    pub fn validator_name(&self, hotkey: &str) -> String {
        self.validators
            .get(hotkey)
            .and_then(|id| id.name.clone())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_validator_name(hotkey))
    }
}

pub fn default_subnet_name(netuid: NetUid) -> String {
    format!("Subnet {}", netuid)
}

pub fn default_subnet_symbol(netuid: NetUid) -> String {
    format!("SN{}", netuid)
}

pub fn default_validator_name(hotkey: &str) -> String {
    let prefix: String = hotkey.chars().take(VALIDATOR_LABEL_PREFIX_LEN).collect();
    format!("Validator {}", prefix)
}
