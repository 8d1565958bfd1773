//! Batch assembly tests
//!
//! Validates:
//! - Envelope index order mirrors request order
//! - Per-resource filters and partial failures stay local to their index
//! - Procedure aliases and their data keys
//! - Sorting, tie breaking and pagination over the cached collections

use bittensor_apy::batch::{
    parse_batch, select_validators, BatchEntry, BatchResponseAssembler, PageDefaults,
    QueryParams, RawQuery, ResourceRequest, SortKey, SortOrder,
};
use bittensor_apy::chain::{ChainSnapshotProvider, MockSnapshotProvider};
use bittensor_apy::config::Config;
use bittensor_apy::errors::UpstreamFetchError;
use bittensor_apy::metadata::InMemoryMetadataStore;
use bittensor_apy::service::YieldService;
use bittensor_apy::types::{ChainSnapshot, EnrichedSubnet, EnrichedValidator, RawSubnet, RawValidator};
use bittensor_apy::ApyCalculator;
use chrono::Utc;
use proptest::prelude::*;
use serde_json::Value;
use std::sync::Arc;

fn fixture() -> ChainSnapshot {
    ChainSnapshot::new(
        vec![
            RawValidator::new("5Alpha", "C1")
                .with_permit(true)
                .with_take(0.18)
                .with_stake(0, 500.0)
                .with_stake(5, 200.0),
            RawValidator::new("5Bravo", "C2")
                .with_permit(true)
                .with_stake(1, 900.0),
            RawValidator::new("5Charlie", "C3")
                .with_permit(true)
                .with_stake(5, 0.0)
                .with_stake(1, 100.0),
            RawValidator::new("5Delta", "C4")
                .with_permit(false)
                .with_stake(5, 50.0),
        ],
        vec![
            RawSubnet::new(0, 1.0, 500.0),
            RawSubnet::new(1, 2.0, 1000.0),
            RawSubnet::new(5, 0.5, 250.0),
        ],
    )
}

fn service_with(provider: Arc<MockSnapshotProvider>) -> YieldService {
    let provider: Arc<dyn ChainSnapshotProvider> = provider;
    YieldService::new(
        Config::default(),
        provider,
        Arc::new(InMemoryMetadataStore::new()),
    )
    .unwrap()
}

fn raw(pairs: &[(&str, &str)]) -> RawQuery {
    let map: serde_json::Map<String, Value> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    RawQuery::default().overlay(&map)
}

fn validators_of(entry: &BatchEntry) -> Vec<EnrichedValidator> {
    match entry {
        BatchEntry::Data { items, .. } => serde_json::from_value(items.clone()).unwrap(),
        BatchEntry::Error(e) => panic!("expected data, got error: {e}"),
    }
}

fn subnets_of(entry: &BatchEntry) -> Vec<EnrichedSubnet> {
    match entry {
        BatchEntry::Data { items, .. } => serde_json::from_value(items.clone()).unwrap(),
        BatchEntry::Error(e) => panic!("expected data, got error: {e}"),
    }
}

// ============================================================================
// Envelope shape
// ============================================================================

#[tokio::test]
async fn test_subnet_filter_only_applies_to_validators() {
    let service = service_with(Arc::new(MockSnapshotProvider::new(fixture())));
    let shared = raw(&[("subnet_id", "5")]);
    let requests = vec![
        ResourceRequest::new("validators", shared.clone()),
        ResourceRequest::new("subnets", shared),
    ];

    let envelope = BatchResponseAssembler::new(&service).assemble(&requests).await;

    assert_eq!(envelope.len(), 2);
    let validators = validators_of(envelope.get(0).unwrap());
    let hotkeys: Vec<&str> = validators.iter().map(|v| v.hotkey.as_str()).collect();
    assert_eq!(hotkeys, vec!["5Alpha", "5Delta"]);
    assert!(validators.iter().all(|v| v.stake_in(5) > 0.0));

    let subnets = subnets_of(envelope.get(1).unwrap());
    assert_eq!(subnets.len(), 3);
}

#[tokio::test]
async fn test_envelope_keys_and_aliases() {
    let service = service_with(Arc::new(MockSnapshotProvider::new(fixture())));
    let requests = parse_batch(
        "subnets.getSubnetsNameAndSymbol,unknown.procedure,delegates.getDelegates4",
        &RawQuery::default(),
        None,
    )
    .unwrap();

    let envelope = BatchResponseAssembler::new(&service).assemble(&requests).await;
    let json = serde_json::to_value(&envelope).unwrap();

    let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["0", "1", "2"]);
    assert_eq!(json["0"]["result"]["data"]["subnets"].as_array().unwrap().len(), 3);
    assert_eq!(json["1"]["error"]["message"], "Unknown procedure: unknown.procedure");
    assert_eq!(json["1"]["error"]["data"]["httpStatus"], 404);
    assert_eq!(json["2"]["result"]["data"]["delegates"].as_array().unwrap().len(), 4);
    assert!(envelope.has_errors());
}

#[tokio::test(start_paused = true)]
async fn test_slow_first_resource_keeps_its_index() {
    let mock = Arc::new(
        MockSnapshotProvider::new(fixture()).with_delay(std::time::Duration::from_millis(500)),
    );
    let service = service_with(mock.clone());
    service.subnets().await.unwrap();

    // Validators load cold and slow, subnets come straight from the cache
    let requests = parse_batch(
        "delegates.getDelegates4,subnets.getSubnetsNameAndSymbol",
        &RawQuery::default(),
        None,
    )
    .unwrap();
    let envelope = BatchResponseAssembler::new(&service).assemble(&requests).await;

    assert_eq!(mock.fetch_count(), 2);
    assert_eq!(validators_of(envelope.get(0).unwrap()).len(), 4);
    assert_eq!(subnets_of(envelope.get(1).unwrap()).len(), 3);

    let json = serde_json::to_value(&envelope).unwrap();
    let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["0", "1"]);
    assert!(json["0"]["result"]["data"]["delegates"].is_array());
    assert!(json["1"]["result"]["data"]["subnets"].is_array());
}

#[tokio::test]
async fn test_invalid_parameters_fail_only_their_index() {
    let service = service_with(Arc::new(MockSnapshotProvider::new(fixture())));
    let requests = parse_batch(
        "validators,validators",
        &RawQuery::default(),
        Some(r#"{"0":{"json":{"sort_by":"bogus"}},"1":{"json":{"batch":0,"batch_size":2}}}"#),
    )
    .unwrap();

    let envelope = BatchResponseAssembler::new(&service).assemble(&requests).await;

    match envelope.get(0).unwrap() {
        BatchEntry::Error(e) => {
            assert!(e.is_validation());
            assert_eq!(e.code(), "BAD_REQUEST");
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(validators_of(envelope.get(1).unwrap()).len(), 2);
}

#[tokio::test]
async fn test_upstream_failure_marks_each_index() {
    let mock = Arc::new(MockSnapshotProvider::new(fixture()));
    mock.push_failure(UpstreamFetchError::new("node unreachable"));
    mock.push_failure(UpstreamFetchError::new("node unreachable"));
    let service = service_with(mock);

    let requests = vec![
        ResourceRequest::new("validators", RawQuery::default()),
        ResourceRequest::new("subnets", RawQuery::default()),
    ];
    let envelope = BatchResponseAssembler::new(&service).assemble(&requests).await;

    for entry in envelope.entries() {
        match entry {
            BatchEntry::Error(e) => assert_eq!(e.http_status(), 503),
            other => panic!("expected error, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_repeated_requests_are_identical() {
    let service = service_with(Arc::new(MockSnapshotProvider::new(fixture())));
    let requests = vec![ResourceRequest::new(
        "validators",
        raw(&[("batch", "0"), ("batch_size", "3"), ("sort_order", "asc")]),
    )];
    let assembler = BatchResponseAssembler::new(&service);

    let first = assembler.assemble(&requests).await;
    let second = assembler.assemble(&requests).await;

    assert_eq!(first, second);
}

// ============================================================================
// Sorting and pagination
// ============================================================================

fn computed() -> Vec<EnrichedValidator> {
    ApyCalculator::new(52560.0)
        .unwrap()
        .compute(&fixture(), &Default::default(), Utc::now())
        .unwrap()
        .validators
}

#[test]
fn test_sort_by_total_stake_desc_default() {
    let params = QueryParams::new(PageDefaults::default());
    let page = select_validators(&computed(), &params);
    let hotkeys: Vec<&str> = page.data.iter().map(|v| v.hotkey.as_str()).collect();
    assert_eq!(hotkeys, vec!["5Bravo", "5Alpha", "5Charlie", "5Delta"]);
    assert_eq!(page.pagination.total, 4);
    assert_eq!(page.pagination.current_batch, None);
}

#[test]
fn test_sort_by_subnet_stake() {
    let params = QueryParams::new(PageDefaults::default())
        .with_subnet(1)
        .with_sort(SortKey::SubnetStake, SortOrder::Asc);
    let page = select_validators(&computed(), &params);
    let hotkeys: Vec<&str> = page.data.iter().map(|v| v.hotkey.as_str()).collect();
    assert_eq!(hotkeys, vec!["5Charlie", "5Bravo"]);
}

#[test]
fn test_ties_break_by_hotkey_in_both_orders() {
    let items = generated(&[10.0, 10.0, 10.0]);
    for order in [SortOrder::Asc, SortOrder::Desc] {
        let params = QueryParams::new(PageDefaults::default()).with_sort(SortKey::TotalStake, order);
        let hotkeys: Vec<String> = select_validators(&items, &params)
            .data
            .into_iter()
            .map(|v| v.hotkey)
            .collect();
        assert_eq!(hotkeys, vec!["HK000", "HK001", "HK002"]);
    }
}

#[test]
fn test_subnet_stake_sort_requires_subnet() {
    let err = QueryParams::parse(&raw(&[("sort_by", "subnet_stake")]), PageDefaults::default())
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_page_past_end_is_empty() {
    let params = QueryParams::new(PageDefaults::default()).with_batch(10, 2);
    let page = select_validators(&computed(), &params);
    assert!(page.data.is_empty());
    assert_eq!(page.pagination.total, 4);
    assert_eq!(page.pagination.total_batches, Some(2));
}

#[test]
fn test_limit_truncates_unpaged_results() {
    let page = select_validators(
        &computed(),
        &QueryParams::parse(&raw(&[("limit", "2")]), PageDefaults::default()).unwrap(),
    );
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.pagination.total, 4);

    let page = select_validators(
        &computed(),
        &QueryParams::parse(&raw(&[("limit", "0")]), PageDefaults::default()).unwrap(),
    );
    assert_eq!(page.data.len(), 4);
}

fn generated(stakes: &[f64]) -> Vec<EnrichedValidator> {
    let validators = stakes
        .iter()
        .enumerate()
        .map(|(i, stake)| {
            RawValidator::new(format!("HK{:03}", i), format!("CK{:03}", i))
                .with_permit(true)
                .with_stake(0, *stake)
        })
        .collect();
    let snapshot = ChainSnapshot::new(validators, vec![RawSubnet::new(0, 1.0, 1000.0)]);
    ApyCalculator::new(52560.0)
        .unwrap()
        .compute(&snapshot, &Default::default(), Utc::now())
        .unwrap()
        .validators
}

proptest! {
    #[test]
    fn prop_pages_partition_the_sorted_collection(
        stakes in prop::collection::vec(prop_oneof![Just(10.0f64), 0.0f64..1000.0], 0..40),
        batch_size in 1usize..8,
        ascending in any::<bool>(),
    ) {
        let items = generated(&stakes);
        let order = if ascending { SortOrder::Asc } else { SortOrder::Desc };
        let base = QueryParams::new(PageDefaults::default()).with_sort(SortKey::TotalStake, order);

        let full: Vec<String> = select_validators(&items, &base)
            .data
            .into_iter()
            .map(|v| v.hotkey)
            .collect();
        prop_assert_eq!(full.len(), items.len());

        let total_batches = items.len().div_ceil(batch_size);
        let mut paged = Vec::new();
        for batch in 0..total_batches {
            let page = select_validators(&items, &base.clone().with_batch(batch, batch_size));
            prop_assert!(page.data.len() <= batch_size);
            prop_assert_eq!(page.pagination.total_batches, Some(total_batches));
            prop_assert_eq!(page.pagination.total, items.len());
            paged.extend(page.data.into_iter().map(|v| v.hotkey));
        }
        prop_assert_eq!(paged, full);
    }
}
