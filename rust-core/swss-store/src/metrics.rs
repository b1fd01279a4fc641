// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metrics-collecting wrapper for store backends.
//
// Wraps any `StoreBackend` and counts connection attempts and the commands
// issued through the connections it opens. Used to observe reconnect
// behaviour of the access layer and in tests that assert no connection was
// attempted at all.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{StoreBackend, StoreConnection, Subscription};
use crate::error::StoreError;

/// Accumulated statistics for a store backend.
///
/// All counters are monotonically increasing for the lifetime of the
/// [`MetricsBackend`] that owns them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Number of `open` calls, successful or not.
    pub open_count: u64,
    /// Number of `open` calls that failed.
    pub open_failures: u64,
    /// Number of read commands (`keys`, `get`, `hget`, `hgetall`, `exists`).
    pub read_count: u64,
    /// Number of write commands (`set`, `hset`, `hdel`, `del`, `flushdb`).
    pub write_count: u64,
    /// Number of `config_set` commands.
    pub config_count: u64,
    /// Number of pattern subscriptions opened.
    pub subscribe_count: u64,
    /// Number of commands that returned an error.
    pub error_count: u64,
}

/// A store backend wrapper that collects operation metrics.
///
/// # Example
///
/// ```rust
/// use swss_store::backend::StoreBackend;
/// use swss_store::memory::InMemoryBackend;
/// use swss_store::metrics::MetricsBackend;
///
/// # tokio_test::block_on(async {
/// let metered = MetricsBackend::new(InMemoryBackend::new());
/// let mut conn = metered.open(0).await.unwrap();
/// conn.hset("key", "field", "value").await.unwrap();
/// conn.hget("key", "field").await.unwrap();
///
/// let stats = metered.stats().await;
/// assert_eq!(stats.open_count, 1);
/// assert_eq!(stats.write_count, 1);
/// assert_eq!(stats.read_count, 1);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MetricsBackend<B: StoreBackend> {
    /// The wrapped backend that opens the real connections.
    inner: B,
    /// Shared, mutable statistics accumulator.
    stats: Arc<RwLock<BackendStats>>,
}

impl<B: StoreBackend> MetricsBackend<B> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            stats: Arc::new(RwLock::new(BackendStats::default())),
        }
    }

    /// Return a snapshot of the current statistics.
    pub async fn stats(&self) -> BackendStats {
        self.stats.read().await.clone()
    }

    /// Reset all statistics to zero.
    pub async fn reset_stats(&self) {
        let mut s = self.stats.write().await;
        *s = BackendStats::default();
    }

    /// Return a reference to the inner backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: StoreBackend> StoreBackend for MetricsBackend<B> {
    async fn open(&self, db_index: u32) -> Result<Box<dyn StoreConnection>, StoreError> {
        let result = self.inner.open(db_index).await;

        let mut s = self.stats.write().await;
        s.open_count += 1;
        match result {
            Ok(inner) => Ok(Box::new(MetricsConnection {
                inner,
                stats: self.stats.clone(),
            })),
            Err(err) => {
                s.open_failures += 1;
                Err(err)
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Read,
    Write,
    Config,
    Subscribe,
}

struct MetricsConnection {
    inner: Box<dyn StoreConnection>,
    stats: Arc<RwLock<BackendStats>>,
}

async fn record<T>(
    stats: &Arc<RwLock<BackendStats>>,
    kind: Kind,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut s = stats.write().await;
    match kind {
        Kind::Read => s.read_count += 1,
        Kind::Write => s.write_count += 1,
        Kind::Config => s.config_count += 1,
        Kind::Subscribe => s.subscribe_count += 1,
    }
    if result.is_err() {
        s.error_count += 1;
    }
    result
}

#[async_trait]
impl StoreConnection for MetricsConnection {
    async fn config_set(&mut self, parameter: &str, value: &str) -> Result<(), StoreError> {
        let result = self.inner.config_set(parameter, value).await;
        record(&self.stats, Kind::Config, result).await
    }

    async fn keys(&mut self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let result = self.inner.keys(pattern).await;
        record(&self.stats, Kind::Read, result).await
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let result = self.inner.get(key).await;
        record(&self.stats, Kind::Read, result).await
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let result = self.inner.set(key, value).await;
        record(&self.stats, Kind::Write, result).await
    }

    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let result = self.inner.hget(key, field).await;
        record(&self.stats, Kind::Read, result).await
    }

    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let result = self.inner.hgetall(key).await;
        record(&self.stats, Kind::Read, result).await
    }

    async fn hset(&mut self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let result = self.inner.hset(key, field, value).await;
        record(&self.stats, Kind::Write, result).await
    }

    async fn hdel(&mut self, key: &str, fields: &[String]) -> Result<usize, StoreError> {
        let result = self.inner.hdel(key, fields).await;
        record(&self.stats, Kind::Write, result).await
    }

    async fn del(&mut self, key: &str) -> Result<bool, StoreError> {
        let result = self.inner.del(key).await;
        record(&self.stats, Kind::Write, result).await
    }

    async fn exists(&mut self, key: &str) -> Result<bool, StoreError> {
        let result = self.inner.exists(key).await;
        record(&self.stats, Kind::Read, result).await
    }

    async fn flushdb(&mut self) -> Result<(), StoreError> {
        let result = self.inner.flushdb().await;
        record(&self.stats, Kind::Write, result).await
    }

    async fn psubscribe(&mut self, pattern: &str) -> Result<Box<dyn Subscription>, StoreError> {
        let result = self.inner.psubscribe(pattern).await;
        record(&self.stats, Kind::Subscribe, result).await
    }
}
