//! Yield service tests
//!
//! Validates:
//! - Concurrent readers share one chain fetch per collection
//! - Lookups by hotkey and netuid
//! - Admin writes invalidate the affected collection only
//! - Stale values are served while the chain is unreachable
//! - Cache status reporting

use bittensor_apy::cache::{CacheState, Dataset};
use bittensor_apy::chain::{ChainSnapshotProvider, MockSnapshotProvider};
use bittensor_apy::config::Config;
use bittensor_apy::errors::UpstreamFetchError;
use bittensor_apy::metadata::{InMemoryMetadataStore, MetadataStore};
use bittensor_apy::service::YieldService;
use bittensor_apy::types::{ChainSnapshot, RawSubnet, RawValidator, ValidatorIdentity};
use std::sync::Arc;
use std::time::Duration;

fn snapshot(stake: f64) -> ChainSnapshot {
    ChainSnapshot::new(
        vec![
            RawValidator::new("5Alpha", "C1")
                .with_permit(true)
                .with_take(0.2)
                .with_stake(0, stake),
            RawValidator::new("5Bravo", "C2")
                .with_permit(true)
                .with_stake(3, 10.0),
        ],
        vec![RawSubnet::new(0, 1.0, stake), RawSubnet::new(3, 0.1, 10.0)],
    )
}

fn build(mock: Arc<MockSnapshotProvider>, config: Config) -> Arc<YieldService> {
    let provider: Arc<dyn ChainSnapshotProvider> = mock;
    let metadata: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
    Arc::new(YieldService::new(config, provider, metadata).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_share_one_fetch() {
    let mock = Arc::new(
        MockSnapshotProvider::new(snapshot(100.0)).with_delay(Duration::from_millis(200)),
    );
    let service = build(mock.clone(), Config::default());

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move { service.validators().await }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().value.len(), 2);
    }

    assert_eq!(mock.fetch_count(), 1);
}

#[tokio::test]
async fn test_lookups() {
    let service = build(
        Arc::new(MockSnapshotProvider::new(snapshot(100.0))),
        Config::default(),
    );

    let alpha = service.validator("5Alpha").await.unwrap();
    assert!((alpha.apy - 525.6).abs() < 1e-6);
    assert!((alpha.nominator_apy - 420.48).abs() < 1e-6);

    let err = service.validator("5Missing").await.unwrap_err();
    assert!(err.is_not_found());

    let subnet = service.subnet(3).await.unwrap();
    assert_eq!(subnet.name, "Subnet 3");
    assert!(service.subnet(99).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_subnet_update_invalidates_subnets_only() {
    let mock = Arc::new(MockSnapshotProvider::new(snapshot(100.0)));
    let service = build(mock.clone(), Config::default().with_admin_key("secret"));

    service.validators().await.unwrap();
    service.subnets().await.unwrap();
    let fetches = mock.fetch_count();

    service.authorize_admin(Some("secret")).unwrap();
    service.update_subnet_metadata(3, "Dojo", "DJ").await.unwrap();

    assert_eq!(service.cache_state(Dataset::Subnets), CacheState::Stale);
    assert_eq!(service.cache_state(Dataset::Validators), CacheState::Valid);

    let subnet = service.subnet(3).await.unwrap();
    assert_eq!(subnet.name, "Dojo");
    assert_eq!(subnet.symbol, "DJ");
    assert_eq!(mock.fetch_count(), fetches + 1);
}

#[tokio::test(start_paused = true)]
async fn test_subnet_update_during_refresh_is_not_lost() {
    let mock = Arc::new(
        MockSnapshotProvider::new(snapshot(100.0)).with_delay(Duration::from_millis(300)),
    );
    let service = build(mock.clone(), Config::default().with_admin_key("secret"));

    let early = {
        let service = service.clone();
        tokio::spawn(async move { service.subnets().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    service.update_subnet_metadata(3, "Dojo", "DJ").await.unwrap();

    // Readers after the write do not join the refresh that started before it
    let subnet = service.subnet(3).await.unwrap();
    assert_eq!(subnet.name, "Dojo");
    assert_eq!(subnet.symbol, "DJ");

    early.await.unwrap().unwrap();
    assert_eq!(service.subnet(3).await.unwrap().name, "Dojo");
    assert_eq!(mock.fetch_count(), 2);
    assert_eq!(service.cache_state(Dataset::Subnets), CacheState::Valid);
}

#[tokio::test(start_paused = true)]
async fn test_identity_update_during_refresh_is_not_lost() {
    let mock = Arc::new(
        MockSnapshotProvider::new(snapshot(100.0)).with_delay(Duration::from_millis(300)),
    );
    let service = build(mock.clone(), Config::default());

    let early = {
        let service = service.clone();
        tokio::spawn(async move { service.validators().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    service
        .set_validator_identity("5Bravo", ValidatorIdentity::named("Bravo Staking"))
        .await
        .unwrap();

    // The early refresh publishes first but its labels predate the write
    early.await.unwrap().unwrap();
    assert_eq!(service.cache_state(Dataset::Validators), CacheState::Stale);

    assert_eq!(service.validator("5Bravo").await.unwrap().name, "Bravo Staking");
    assert_eq!(mock.fetch_count(), 2);
}

#[tokio::test]
async fn test_identity_update_relabels_validator() {
    let service = build(
        Arc::new(MockSnapshotProvider::new(snapshot(100.0))),
        Config::default(),
    );
    assert_eq!(service.validator("5Bravo").await.unwrap().name, "Validator 5Bravo");

    service
        .set_validator_identity("5Bravo", ValidatorIdentity::named("Bravo Staking"))
        .await
        .unwrap();

    assert_eq!(service.validator("5Bravo").await.unwrap().name, "Bravo Staking");
}

#[tokio::test]
async fn test_admin_key_checked() {
    let service = build(
        Arc::new(MockSnapshotProvider::new(snapshot(100.0))),
        Config::default().with_admin_key("secret"),
    );
    assert!(service.authorize_admin(Some("secret")).is_ok());
    assert_eq!(service.authorize_admin(Some("wrong")).unwrap_err().http_status(), 401);
    assert_eq!(service.authorize_admin(None).unwrap_err().http_status(), 401);
}

#[tokio::test(start_paused = true)]
async fn test_stale_value_served_while_chain_down() {
    let mock = Arc::new(MockSnapshotProvider::new(snapshot(100.0)));
    let config = Config::default().with_cache_ttl(Duration::from_secs(60));
    let service = build(mock.clone(), config);

    let first = service.validators().await.unwrap();

    tokio::time::advance(Duration::from_secs(61)).await;
    mock.push_failure(UpstreamFetchError::new("node unreachable"));

    let served = service.validators().await.unwrap();
    assert_eq!(served.generation, first.generation);
    assert_eq!(served.value, first.value);

    let status = service.cache_status();
    let validators = status
        .iter()
        .find(|s| s.dataset == Dataset::Validators)
        .unwrap();
    assert_eq!(validators.state, CacheState::Stale);
    assert!(validators.last_error.is_some());

    // Chain is back with new stake
    mock.set_snapshot(snapshot(200.0));
    let refreshed = service.validators().await.unwrap();
    assert!(refreshed.generation > first.generation);
    assert_eq!(refreshed.value[0].total_stake, 200.0);
}

#[tokio::test]
async fn test_first_load_failure_is_reported() {
    let mock = Arc::new(MockSnapshotProvider::new(snapshot(100.0)));
    mock.push_failure(UpstreamFetchError::new("node unreachable"));
    let service = build(mock, Config::default());

    assert!(service.validators().await.unwrap_err().is_upstream());
    assert_eq!(service.cache_state(Dataset::Validators), CacheState::Failed);

    assert_eq!(service.validators().await.unwrap().value.len(), 2);
}

#[tokio::test]
async fn test_warm_fills_both_collections() {
    let service = build(
        Arc::new(MockSnapshotProvider::new(snapshot(100.0))),
        Config::default(),
    );
    assert_eq!(service.cache_state(Dataset::Subnets), CacheState::Empty);

    service.warm().await;

    let status = service.cache_status();
    assert_eq!(status.len(), 2);
    assert!(status.iter().all(|s| s.state == CacheState::Valid));
    assert!(status.iter().all(|s| s.items == Some(2)));
}

#[test]
fn test_rejects_invalid_periods() {
    let provider: Arc<dyn ChainSnapshotProvider> =
        Arc::new(MockSnapshotProvider::new(ChainSnapshot::default()));
    let result = YieldService::new(
        Config::default().with_periods_per_year(0.0),
        provider,
        Arc::new(InMemoryMetadataStore::new()),
    );
    assert!(result.is_err());
}
