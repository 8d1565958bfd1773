//! Time-bounded result cache with single-flight refresh
//!
//! Each key owns a slot holding the last published entry and, while a
//! refresh runs, a shared handle to it. The first caller that finds the
//! entry missing or expired starts the refresh on its own task; every
//! other caller for that key awaits the same handle. The refresh task
//! publishes its result under the slot lock, so readers see either the old
//! entry or the new one, never a mix.
//!
//! Invalidation bumps the slot's epoch. A refresh remembers the epoch it
//! started under: callers never join a refresh from an older epoch, and an
//! entry published from an older epoch is installed already stale.
//!
//! A failed refresh falls back to the previous entry when there is one.
//! Without a previous entry the error goes to every waiter and the slot is
//! marked failed until the next request retries it.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{ApyError, ApyResult, UpstreamFetchError};

/// Collection a cache entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Validators,
    Subnets,
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Validators => write!(f, "validators"),
            Dataset::Subnets => write!(f, "subnets"),
        }
    }
}

/// Identity of a cached collection.
///
/// Entries hold the full unfiltered collection for one network, so filter
/// and sort parameters are not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub dataset: Dataset,
    pub endpoint: String,
}

impl CacheKey {
    pub fn new(dataset: Dataset, endpoint: impl Into<String>) -> Self {
        Self {
            dataset,
            endpoint: endpoint.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.dataset, self.endpoint)
    }
}

/// Observable state of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Never requested
    Empty,
    /// A refresh is in flight
    Refreshing,
    /// Published entry younger than the TTL
    Valid,
    /// Published entry that is expired or invalidated
    Stale,
    /// Last refresh failed with nothing to fall back on
    Failed,
}

/// A published value. Immutable once published.
#[derive(Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub computed_at: DateTime<Utc>,
    /// Increases by one with every successful refresh of the cache
    pub generation: u64,
    published: Instant,
}

impl<V> CacheEntry<V> {
    pub fn age(&self) -> Duration {
        self.published.elapsed()
    }
}

type RefreshResult<V> = Result<Arc<CacheEntry<V>>, ApyError>;
type InFlight<V> = Shared<BoxFuture<'static, RefreshResult<V>>>;

struct Slot<V> {
    entry: Option<Arc<CacheEntry<V>>>,
    /// Epoch the current entry's refresh started under
    entry_epoch: u64,
    /// Bumped by every invalidation
    epoch: u64,
    inflight: Option<(u64, InFlight<V>)>,
    last_error: Option<ApyError>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            entry: None,
            entry_epoch: 0,
            epoch: 0,
            inflight: None,
            last_error: None,
        }
    }
}

impl<V> Slot<V> {
    fn fresh_entry(&self, ttl: Duration) -> Option<Arc<CacheEntry<V>>> {
        match &self.entry {
            Some(entry) if self.entry_epoch == self.epoch && entry.age() < ttl => {
                Some(entry.clone())
            }
            _ => None,
        }
    }

    fn invalidate(&mut self) {
        self.epoch += 1;
    }
}

struct Inner<K, V> {
    name: String,
    ttl: Duration,
    fetch_timeout: Duration,
    slots: Mutex<HashMap<K, Slot<V>>>,
    generation: AtomicU64,
}

impl<K, V> Inner<K, V> {
    fn slots(&self) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
        // Slot updates are single assignments, a poisoned map is still consistent.
        self.slots.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Single-flight memoization of expensive collection loads
pub struct ResultCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for ResultCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// `ttl` bounds the age of a served entry; `fetch_timeout` bounds a
    /// single refresh.
    pub fn new(name: impl Into<String>, ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                ttl,
                fetch_timeout,
                slots: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Return the entry for `key`, refreshing it through `loader` when it
    /// is missing, expired or invalidated.
    ///
    /// `loader` is only invoked when no refresh for `key` is in flight. The
    /// refresh runs on its own task, so it completes and publishes even if
    /// every caller stops waiting.
    pub async fn get<F, Fut>(&self, key: &K, loader: F) -> ApyResult<Arc<CacheEntry<V>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApyResult<V>> + Send + 'static,
    {
        let inflight = {
            let mut slots = self.inner.slots();
            let slot = slots.entry(key.clone()).or_default();

            if let Some(entry) = slot.fresh_entry(self.inner.ttl) {
                return Ok(entry);
            }

            let current = slot.epoch;
            match slot.inflight.as_ref() {
                Some((epoch, shared)) if *epoch == current => {
                    debug!(cache = %self.inner.name, key = %key, "Joining in-flight refresh");
                    shared.clone()
                }
                running => {
                    if running.is_some() {
                        debug!(
                            cache = %self.inner.name,
                            key = %key,
                            "In-flight refresh predates invalidation, starting another"
                        );
                    }
                    let shared = self.spawn_refresh(key.clone(), current, loader());
                    slot.inflight = Some((current, shared.clone()));
                    shared
                }
            }
        };

        inflight.await
    }

    fn spawn_refresh<Fut>(&self, key: K, epoch: u64, load: Fut) -> InFlight<V>
    where
        Fut: Future<Output = ApyResult<V>> + Send + 'static,
    {
        let inner = self.inner.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            info!(cache = %inner.name, key = %task_key, "Cache refresh started");

            let outcome = match tokio::time::timeout(inner.fetch_timeout, load).await {
                Ok(result) => result,
                Err(_) => Err(UpstreamFetchError::timeout(format!(
                    "refresh of {} exceeded {:?}",
                    task_key, inner.fetch_timeout
                ))
                .into()),
            };

            publish(&inner, &task_key, epoch, outcome, started)
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(ApyError::internal(format!("refresh of {} aborted: {}", key, e))),
            }
        }
        .boxed()
        .shared()
    }

    /// Current state of `key`
    pub fn state(&self, key: &K) -> CacheState {
        let slots = self.inner.slots();
        let Some(slot) = slots.get(key) else {
            return CacheState::Empty;
        };
        if slot.inflight.is_some() {
            return CacheState::Refreshing;
        }
        match &slot.entry {
            Some(_) if slot.fresh_entry(self.inner.ttl).is_some() => CacheState::Valid,
            Some(_) => CacheState::Stale,
            None if slot.last_error.is_some() => CacheState::Failed,
            None => CacheState::Empty,
        }
    }

    /// The last published entry for `key`, fresh or not
    pub fn peek(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
        self.inner.slots().get(key).and_then(|s| s.entry.clone())
    }

    /// Error of the most recent failed refresh of `key`, cleared on success
    pub fn last_error(&self, key: &K) -> Option<ApyError> {
        self.inner.slots().get(key).and_then(|s| s.last_error.clone())
    }

    /// Mark the entry for `key` expired. The value is kept as a fallback.
    pub fn invalidate(&self, key: &K) {
        if let Some(slot) = self.inner.slots().get_mut(key) {
            slot.invalidate();
            info!(cache = %self.inner.name, key = %key, "Cache entry invalidated");
        }
    }

    /// Mark every entry expired
    pub fn invalidate_all(&self) {
        for slot in self.inner.slots().values_mut() {
            slot.invalidate();
        }
        info!(cache = %self.inner.name, "All cache entries invalidated");
    }

    /// Keys with a slot, in no particular order
    pub fn keys(&self) -> Vec<K> {
        self.inner.slots().keys().cloned().collect()
    }
}

fn publish<K, V>(
    inner: &Inner<K, V>,
    key: &K,
    epoch: u64,
    outcome: ApyResult<V>,
    started: Instant,
) -> RefreshResult<V>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    let mut slots = inner.slots();
    let slot = slots.entry(key.clone()).or_default();
    if matches!(&slot.inflight, Some((running, _)) if *running == epoch) {
        slot.inflight = None;
    }

    match outcome {
        Ok(_) if slot.entry.is_some() && epoch < slot.entry_epoch => {
            debug!(cache = %inner.name, key = %key, "Discarding refresh overtaken by a newer one");
            slot.entry.clone().ok_or_else(|| ApyError::internal("cache entry vanished"))
        }
        Ok(value) => {
            let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let entry = Arc::new(CacheEntry {
                value,
                computed_at: Utc::now(),
                generation,
                published: Instant::now(),
            });
            slot.entry = Some(entry.clone());
            slot.entry_epoch = epoch;
            slot.last_error = None;
            if epoch != slot.epoch {
                info!(cache = %inner.name, key = %key, "Published entry was invalidated while refreshing");
            }
            info!(
                cache = %inner.name,
                key = %key,
                generation,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Cache refreshed"
            );
            Ok(entry)
        }
        Err(err) => {
            slot.last_error = Some(err.clone());
            match &slot.entry {
                Some(previous) => {
                    warn!(
                        cache = %inner.name,
                        key = %key,
                        generation = previous.generation,
                        error = %err,
                        "Refresh failed, serving stale value"
                    );
                    Ok(previous.clone())
                }
                None => {
                    warn!(cache = %inner.name, key = %key, error = %err, "Refresh failed with no fallback");
                    Err(err)
                }
            }
        }
    }
}
