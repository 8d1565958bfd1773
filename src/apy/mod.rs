//! Yield computation
//!
//! Turns a [`ChainSnapshot`] into enriched validator and subnet records.
//! The computation is pure: the same snapshot, metadata and timestamp always
//! produce the same output.
//!
//! For a subnet `s` with emission `e_s` per period and total stake `S_s`:
//!
//! ```text
//! subnet_apy(s)     = e_s * periods_per_year / S_s        (0 when S_s == 0)
//! per_subnet(v, s)  = subnet_apy(s) if v holds a permit and stake_v(s) > 0, else 0
//! apy(v)            = sum_s stake_v(s) * per_subnet(v, s) / total_stake(v)
//! nominator_apy(v)  = apy(v) * (1 - take_v)
//! ```

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::config::ApyConfig;
use crate::errors::{ApyResult, DataIntegrityError, UpstreamFetchError, ValidationError};
use crate::types::{
    ChainSnapshot, EnrichedSubnet, EnrichedValidator, MetadataSnapshot, NetUid, RawSubnet,
    RawValidator,
};

/// Output of one computation cycle
#[derive(Debug, Clone, Default)]
pub struct ApyComputation {
    pub validators: Vec<EnrichedValidator>,
    /// Ordered by netuid
    pub subnets: Vec<EnrichedSubnet>,
    /// Records dropped for being malformed
    pub rejected: Vec<DataIntegrityError>,
}

/// Computes annualised yields from raw chain records
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApyCalculator {
    periods_per_year: f64,
}

impl ApyCalculator {
    /// `periods_per_year` is the number of emission periods in a year and
    /// must be finite and positive.
    pub fn new(periods_per_year: f64) -> ApyResult<Self> {
        if !periods_per_year.is_finite() || periods_per_year <= 0.0 {
            return Err(ValidationError::with_parameter(
                format!("periods_per_year must be positive, got {}", periods_per_year),
                "periods_per_year",
            )
            .into());
        }
        Ok(Self { periods_per_year })
    }

    pub fn from_config(config: &ApyConfig) -> ApyResult<Self> {
        Self::new(config.periods_per_year)
    }

    pub fn periods_per_year(&self) -> f64 {
        self.periods_per_year
    }

    /// Annualised yield of a subnet's stake pool
    pub fn subnet_apy(&self, subnet: &RawSubnet) -> f64 {
        if subnet.total_subnet_stake <= 0.0 {
            return 0.0;
        }
        subnet.emission_rate * self.periods_per_year / subnet.total_subnet_stake
    }

    /// Compute every validator and subnet in `snapshot`.
    ///
    /// Malformed records are dropped, logged and reported in
    /// [`ApyComputation::rejected`]. A snapshot with no subnets is treated
    /// as an upstream failure rather than an empty result.
    pub fn compute(
        &self,
        snapshot: &ChainSnapshot,
        metadata: &MetadataSnapshot,
        computed_at: DateTime<Utc>,
    ) -> ApyResult<ApyComputation> {
        if snapshot.subnets.is_empty() {
            return Err(UpstreamFetchError::new("chain snapshot contains no subnets").into());
        }

        let mut rejected = Vec::new();
        let mut rates: BTreeMap<NetUid, (&RawSubnet, f64)> = BTreeMap::new();

        for subnet in &snapshot.subnets {
            let checked = check_subnet(subnet).and_then(|()| {
                if rates.contains_key(&subnet.netuid) {
                    Err(DataIntegrityError::with_field(
                        "duplicate subnet in snapshot",
                        subnet.netuid.to_string(),
                        "netuid",
                    ))
                } else {
                    Ok(())
                }
            });
            match checked {
                Ok(()) => {
                    rates.insert(subnet.netuid, (subnet, self.subnet_apy(subnet)));
                }
                Err(e) => reject(&mut rejected, e),
            }
        }

        let mut seen = HashSet::new();
        let mut validators = Vec::with_capacity(snapshot.validators.len());
        for raw in &snapshot.validators {
            if !seen.insert(raw.hotkey.as_str()) {
                reject(
                    &mut rejected,
                    DataIntegrityError::with_field(
                        "duplicate hotkey in snapshot",
                        raw.hotkey.clone(),
                        "hotkey",
                    ),
                );
                continue;
            }
            match check_validator(raw, &rates) {
                Ok(()) => validators.push(enrich_validator(raw, &rates, metadata, computed_at)),
                Err(e) => reject(&mut rejected, e),
            }
        }

        let subnets = rates
            .iter()
            .map(|(netuid, (raw, apy))| {
                let (name, symbol) = metadata.subnet_labels(*netuid);
                EnrichedSubnet {
                    netuid: *netuid,
                    name,
                    symbol,
                    emission_rate: raw.emission_rate,
                    total_stake: raw.total_subnet_stake,
                    apy: *apy,
                    validator_count: validators.iter().filter(|v| v.is_staked_in(*netuid)).count(),
                }
            })
            .collect();

        debug!(
            validators = validators.len(),
            subnets = rates.len(),
            rejected = rejected.len(),
            "Computed yields"
        );

        Ok(ApyComputation {
            validators,
            subnets,
            rejected,
        })
    }
}

fn reject(rejected: &mut Vec<DataIntegrityError>, err: DataIntegrityError) {
    warn!(
        record = err.record.as_deref().unwrap_or("-"),
        field = err.field.as_deref().unwrap_or("-"),
        "Dropping malformed record: {}",
        err.message
    );
    rejected.push(err);
}

fn check_amount(value: f64, record: &str, field: &str) -> Result<(), DataIntegrityError> {
    if !value.is_finite() || value < 0.0 {
        return Err(DataIntegrityError::with_field(
            format!("{} must be a non-negative number, got {}", field, value),
            record,
            field,
        ));
    }
    Ok(())
}

fn check_subnet(subnet: &RawSubnet) -> Result<(), DataIntegrityError> {
    let record = subnet.netuid.to_string();
    check_amount(subnet.emission_rate, &record, "emissionRate")?;
    check_amount(subnet.total_subnet_stake, &record, "totalSubnetStake")
}

fn check_validator(
    raw: &RawValidator,
    rates: &BTreeMap<NetUid, (&RawSubnet, f64)>,
) -> Result<(), DataIntegrityError> {
    if raw.hotkey.trim().is_empty() {
        return Err(DataIntegrityError::with_field(
            "validator hotkey is empty",
            raw.coldkey.clone(),
            "hotkey",
        ));
    }
    if !raw.take.is_finite() || !(0.0..=1.0).contains(&raw.take) {
        return Err(DataIntegrityError::with_field(
            format!("take must be within [0, 1], got {}", raw.take),
            raw.hotkey.clone(),
            "take",
        ));
    }
    for (netuid, stake) in &raw.staked_by_subnet {
        check_amount(*stake, &raw.hotkey, "stakedBySubnet")?;
        if !rates.contains_key(netuid) {
            return Err(DataIntegrityError::with_field(
                format!("stake references unknown subnet {}", netuid),
                raw.hotkey.clone(),
                "stakedBySubnet",
            ));
        }
    }
    Ok(())
}

fn enrich_validator(
    raw: &RawValidator,
    rates: &BTreeMap<NetUid, (&RawSubnet, f64)>,
    metadata: &MetadataSnapshot,
    computed_at: DateTime<Utc>,
) -> EnrichedValidator {
    let total_stake = raw.total_stake();

    let mut per_subnet_apy = BTreeMap::new();
    let mut apy = 0.0;
    if total_stake > 0.0 {
        let mut weighted = 0.0;
        for (netuid, stake) in &raw.staked_by_subnet {
            let rate = match rates.get(netuid) {
                Some((_, rate)) if raw.validator_permit && *stake > 0.0 => *rate,
                _ => 0.0,
            };
            per_subnet_apy.insert(*netuid, rate);
            weighted += stake * rate;
        }
        apy = weighted / total_stake;
    }

    let identity = metadata.validator_identity(&raw.hotkey).cloned().unwrap_or_default();

    EnrichedValidator {
        hotkey: raw.hotkey.clone(),
        coldkey: raw.coldkey.clone(),
        nominator: raw.nominator.clone(),
        validator_permit: raw.validator_permit,
        take: raw.take,
        staked_by_subnet: raw.staked_by_subnet.clone(),
        total_stake,
        subnet_count: raw.staked_by_subnet.values().filter(|s| **s > 0.0).count(),
        name: metadata.validator_name(&raw.hotkey),
        url: identity.url,
        logo: identity.logo,
        description: identity.description,
        twitter: identity.twitter,
        verified: identity.verified,
        apy,
        nominator_apy: apy * (1.0 - raw.take),
        per_subnet_apy,
        last_updated: computed_at,
    }
}
