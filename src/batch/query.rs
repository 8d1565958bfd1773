//! Query parameters, filtering, sorting and pagination

use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::errors::{ApyResult, ValidationError};
use crate::types::{EnrichedSubnet, EnrichedValidator, NetUid};

/// Query parameters as received, before validation
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawQuery {
    pub batch: Option<String>,
    #[serde(alias = "batchSize")]
    pub batch_size: Option<String>,
    pub limit: Option<String>,
    #[serde(alias = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(alias = "sortOrder")]
    pub sort_order: Option<String>,
    #[serde(alias = "subnetId")]
    pub subnet_id: Option<String>,
}

impl RawQuery {
    /// Overlay keys of a JSON object on top of these parameters.
    ///
    /// Numbers and strings are taken as given; `null` clears a parameter.
    pub fn overlay(&self, input: &serde_json::Map<String, serde_json::Value>) -> RawQuery {
        let mut out = self.clone();
        for (name, value) in input {
            let slot = match name.as_str() {
                "batch" => &mut out.batch,
                "batch_size" | "batchSize" => &mut out.batch_size,
                "limit" => &mut out.limit,
                "sort_by" | "sortBy" => &mut out.sort_by,
                "sort_order" | "sortOrder" => &mut out.sort_order,
                "subnet_id" | "subnetId" => &mut out.subnet_id,
                _ => continue,
            };
            *slot = match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            };
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    TotalStake,
    SubnetStake,
    Apy,
}

impl std::str::FromStr for SortKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "total_stake" => Ok(SortKey::TotalStake),
            "subnet_stake" => Ok(SortKey::SubnetStake),
            "apy" => Ok(SortKey::Apy),
            _ => Err(ValidationError::with_parameter(
                format!(
                    "unknown sort key '{}', expected total_stake, subnet_stake or apy",
                    s
                ),
                "sort_by",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(ValidationError::with_parameter(
                format!("unknown sort order '{}', expected asc or desc", s),
                "sort_order",
            )),
        }
    }
}

/// Page size bounds taken from server configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDefaults {
    pub batch_size: usize,
    pub max_batch_size: usize,
}

impl Default for PageDefaults {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for PageDefaults {
    fn from(config: &ServerConfig) -> Self {
        Self {
            batch_size: config.default_batch_size,
            max_batch_size: config.max_batch_size,
        }
    }
}

/// Validated query parameters
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    /// Zero-based page; `None` returns the whole collection
    pub batch: Option<usize>,
    pub batch_size: usize,
    /// Truncation applied when no page is requested
    pub limit: Option<usize>,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
    pub subnet_id: Option<NetUid>,
}

impl QueryParams {
    pub fn new(defaults: PageDefaults) -> Self {
        Self {
            batch: None,
            batch_size: defaults.batch_size,
            limit: None,
            sort_by: SortKey::default(),
            sort_order: SortOrder::default(),
            subnet_id: None,
        }
    }

    pub fn parse(raw: &RawQuery, defaults: PageDefaults) -> ApyResult<Self> {
        let mut params = Self::new(defaults);

        params.batch = parse_count(raw.batch.as_deref(), "batch")?;

        if let Some(size) = parse_count(raw.batch_size.as_deref(), "batch_size")? {
            if size == 0 || size > defaults.max_batch_size {
                return Err(ValidationError::with_parameter(
                    format!(
                        "batch_size must be between 1 and {}, got {}",
                        defaults.max_batch_size, size
                    ),
                    "batch_size",
                )
                .into());
            }
            params.batch_size = size;
        }

        params.limit = parse_count(raw.limit.as_deref(), "limit")?.filter(|l| *l > 0);

        if let Some(sort_by) = non_empty(raw.sort_by.as_deref()) {
            params.sort_by = sort_by.parse()?;
        }
        if let Some(order) = non_empty(raw.sort_order.as_deref()) {
            params.sort_order = order.parse()?;
        }

        if let Some(id) = non_empty(raw.subnet_id.as_deref()) {
            params.subnet_id = Some(id.parse::<NetUid>().map_err(|_| {
                ValidationError::with_parameter(
                    format!("subnet_id must be a subnet number, got '{}'", id),
                    "subnet_id",
                )
            })?);
        }

        if params.sort_by == SortKey::SubnetStake && params.subnet_id.is_none() {
            return Err(ValidationError::with_parameter(
                "sorting by subnet_stake requires subnet_id",
                "sort_by",
            )
            .into());
        }

        Ok(params)
    }

    pub fn with_batch(mut self, batch: usize, batch_size: usize) -> Self {
        self.batch = Some(batch);
        self.batch_size = batch_size;
        self
    }

    pub fn with_sort(mut self, sort_by: SortKey, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }

    pub fn with_subnet(mut self, netuid: NetUid) -> Self {
        self.subnet_id = Some(netuid);
        self
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_count(value: Option<&str>, parameter: &str) -> ApyResult<Option<usize>> {
    let Some(value) = non_empty(value) else {
        return Ok(None);
    };
    value.parse::<usize>().map(Some).map_err(|_| {
        ValidationError::with_parameter(
            format!("{} must be a non-negative integer, got '{}'", parameter, value),
            parameter,
        )
        .into()
    })
}

/// Pagination metadata. Page fields are `None` when no page was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub total: usize,
    pub batch_size: Option<usize>,
    pub current_batch: Option<usize>,
    pub total_batches: Option<usize>,
}

/// One page of a collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PageMeta,
}

impl<T> Page<T> {
    /// Convert every item on the page, keeping the metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

/// Slice `items` according to `params`. Never fails: a page past the end
/// is empty.
pub fn paginate<T: Clone>(items: &[T], params: &QueryParams) -> Page<T> {
    let total = items.len();
    match params.batch {
        Some(batch) => {
            let size = params.batch_size.max(1);
            let start = batch.saturating_mul(size).min(total);
            let end = start.saturating_add(size).min(total);
            Page {
                data: items[start..end].to_vec(),
                pagination: PageMeta {
                    total,
                    batch_size: Some(size),
                    current_batch: Some(batch),
                    total_batches: Some(total.div_ceil(size)),
                },
            }
        }
        None => {
            let end = params.limit.map_or(total, |l| l.min(total));
            Page {
                data: items[..end].to_vec(),
                pagination: PageMeta {
                    total,
                    batch_size: None,
                    current_batch: None,
                    total_batches: None,
                },
            }
        }
    }
}

fn sort_value(v: &EnrichedValidator, params: &QueryParams) -> f64 {
    match params.sort_by {
        SortKey::TotalStake => v.total_stake,
        SortKey::SubnetStake => params.subnet_id.map_or(0.0, |id| v.stake_in(id)),
        SortKey::Apy => v.apy,
    }
}

/// Filter, sort and page a validator collection
pub fn select_validators(items: &[EnrichedValidator], params: &QueryParams) -> Page<EnrichedValidator> {
    let mut selected: Vec<&EnrichedValidator> = match params.subnet_id {
        Some(netuid) => items.iter().filter(|v| v.is_staked_in(netuid)).collect(),
        None => items.iter().collect(),
    };

    selected.sort_by(|a, b| {
        let primary = sort_value(a, params).total_cmp(&sort_value(b, params));
        let primary = match params.sort_order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary.then_with(|| a.hotkey.cmp(&b.hotkey))
    });

    paginate(&selected, params).map(EnrichedValidator::clone)
}

/// Page a subnet collection. Subnets keep netuid order; sort and subnet
/// filters only apply to validators.
pub fn select_subnets(items: &[EnrichedSubnet], params: &QueryParams) -> Page<EnrichedSubnet> {
    let mut ordered: Vec<&EnrichedSubnet> = items.iter().collect();
    ordered.sort_by_key(|s| s.netuid);
    paginate(&ordered, params).map(EnrichedSubnet::clone)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawQuery {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        RawQuery::default().overlay(&map)
    }

    #[test]
    fn test_defaults() {
        let params = QueryParams::parse(&RawQuery::default(), PageDefaults::default()).unwrap();
        assert_eq!(params.batch, None);
        assert_eq!(params.batch_size, 32);
        assert_eq!(params.sort_by, SortKey::TotalStake);
        assert_eq!(params.sort_order, SortOrder::Desc);
    }

    #[test]
    fn test_rejects_malformed_parameters() {
        let d = PageDefaults::default();
        for bad in [
            raw(&[("batch", "-1")]),
            raw(&[("limit", "-5")]),
            raw(&[("batch_size", "0")]),
            raw(&[("batch_size", "100000")]),
            raw(&[("sort_by", "name")]),
            raw(&[("sort_order", "sideways")]),
            raw(&[("subnet_id", "x")]),
            raw(&[("sort_by", "subnet_stake")]),
        ] {
            let err = QueryParams::parse(&bad, d).unwrap_err();
            assert!(err.is_validation(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_case_insensitive_sort() {
        let params = QueryParams::parse(
            &raw(&[("sort_by", "APY"), ("sort_order", "Asc")]),
            PageDefaults::default(),
        )
        .unwrap();
        assert_eq!(params.sort_by, SortKey::Apy);
        assert_eq!(params.sort_order, SortOrder::Asc);
    }

    #[test]
    fn test_overlay_accepts_numbers_and_camel_case() {
        let input = serde_json::json!({"batch": 2, "batchSize": 10, "subnet_id": null});
        let base = RawQuery {
            subnet_id: Some("3".into()),
            ..Default::default()
        };
        let merged = base.overlay(input.as_object().unwrap());
        assert_eq!(merged.batch.as_deref(), Some("2"));
        assert_eq!(merged.batch_size.as_deref(), Some("10"));
        assert_eq!(merged.subnet_id, None);
    }

    #[test]
    fn test_paginate_ranges() {
        let items: Vec<u32> = (0..10).collect();
        let params = QueryParams::new(PageDefaults::default()).with_batch(1, 4);
        let page = paginate(&items, &params);
        assert_eq!(page.data, vec![4, 5, 6, 7]);
        assert_eq!(page.pagination.total_batches, Some(3));

        let past = paginate(&items, &params.clone().with_batch(9, 4));
        assert!(past.data.is_empty());
        assert_eq!(past.pagination.total, 10);
    }

    #[test]
    fn test_page_of_references_maps_to_owned() {
        let items: Vec<String> = (0..10).map(|i| format!("item{}", i)).collect();
        let refs: Vec<&String> = items.iter().rev().collect();
        let params = QueryParams::new(PageDefaults::default()).with_batch(2, 4);

        let page = paginate(&refs, &params).map(String::clone);
        assert_eq!(page.data, vec!["item1".to_string(), "item0".to_string()]);
        assert_eq!(page.pagination.total, 10);
        assert_eq!(page.pagination.current_batch, Some(2));
        assert_eq!(page.pagination.total_batches, Some(3));
    }

    #[test]
    fn test_limit_without_batch() {
        let items: Vec<u32> = (0..10).collect();
        let mut params = QueryParams::new(PageDefaults::default());
        params.limit = Some(3);
        let page = paginate(&items, &params);
        assert_eq!(page.data, vec![0, 1, 2]);
        assert_eq!(page.pagination.batch_size, None);
    }
}
