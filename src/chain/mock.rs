//! In-process snapshot provider for tests and offline runs

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::snapshot::ChainSnapshotProvider;
use crate::errors::{ApyError, ApyResult};
use crate::types::ChainSnapshot;

/// Serves a fixed snapshot, optionally after a delay, and counts fetches.
///
/// Scripted outcomes queued with [`MockSnapshotProvider::push_failure`] or
/// [`MockSnapshotProvider::push_snapshot`] are consumed one per fetch before
/// falling back to the fixed snapshot.
pub struct MockSnapshotProvider {
    snapshot: Mutex<ChainSnapshot>,
    scripted: Mutex<VecDeque<ApyResult<ChainSnapshot>>>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl MockSnapshotProvider {
    pub fn new(snapshot: ChainSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            scripted: Mutex::new(VecDeque::new()),
            delay: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make the next unscripted fetch fail with `err`
    pub fn push_failure(&self, err: impl Into<ApyError>) {
        self.scripted_queue().push_back(Err(err.into()));
    }

    /// Make the next unscripted fetch return `snapshot` once
    pub fn push_snapshot(&self, snapshot: ChainSnapshot) {
        self.scripted_queue().push_back(Ok(snapshot));
    }

    /// Replace the fixed snapshot
    pub fn set_snapshot(&self, snapshot: ChainSnapshot) {
        *self.snapshot.lock().unwrap_or_else(|p| p.into_inner()) = snapshot;
    }

    /// Number of fetches started so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn scripted_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<ApyResult<ChainSnapshot>>> {
        self.scripted.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl ChainSnapshotProvider for MockSnapshotProvider {
    async fn fetch_snapshot(&self, _endpoint: &str) -> ApyResult<ChainSnapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.scripted_queue().pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => Ok(self.snapshot.lock().unwrap_or_else(|p| p.into_inner()).clone()),
        }
    }
}
