use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use tracing::{Instrument, debug, info, info_span, warn};
use vitalsync_core::{DataType, Sample, SyncOptions, SyncResult};

use crate::cache::LocalCache;
use crate::clock::Clock;
use crate::cursor::SyncCursorStore;
use crate::provider::{AnchoredQuery, HealthDataProvider, RangeQuery};
use crate::store::KeyValueStore;
use crate::types::{Result, SyncError};

const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_secs(5 * 60);

type PendingSync = Shared<BoxFuture<'static, Result<SyncResult>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Freshness bound used by [`SyncOrchestrator::get_cached`].
    pub cache_max_age: Duration,
    /// How long a completed result is handed to later callers without a new
    /// provider query. Zero only coalesces calls that overlap in flight.
    pub coalesce_window: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            coalesce_window: Duration::ZERO,
        }
    }
}

/// Combines cursor store, provider and cache into per-type incremental syncs.
///
/// Clones share state; at most one provider query per data type is in flight.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    cursors: SyncCursorStore,
    cache: LocalCache,
    provider: Arc<dyn HealthDataProvider>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    in_flight: Mutex<HashMap<DataType, PendingSync>>,
    recent: Mutex<HashMap<DataType, SyncResult>>,
    /// Last successful provider query per type. Not persisted.
    last_polled: Mutex<HashMap<DataType, DateTime<Utc>>>,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        provider: Arc<dyn HealthDataProvider>,
        clock: Arc<dyn Clock>,
        config: OrchestratorConfig,
    ) -> Self {
        let cursors = SyncCursorStore::new(Arc::clone(&store), Arc::clone(&clock));
        let cache = LocalCache::new(store, Arc::clone(&clock));
        Self {
            inner: Arc::new(Inner {
                cursors,
                cache,
                provider,
                clock,
                config,
                in_flight: Mutex::new(HashMap::new()),
                recent: Mutex::new(HashMap::new()),
                last_polled: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn cache(&self) -> &LocalCache {
        &self.inner.cache
    }

    pub fn cursors(&self) -> &SyncCursorStore {
        &self.inner.cursors
    }

    pub fn config(&self) -> OrchestratorConfig {
        self.inner.config
    }

    /// Syncs one data type. A call made while another sync for the same type
    /// is running receives that sync's result instead of querying again.
    pub async fn sync(&self, data_type: DataType, options: SyncOptions) -> Result<SyncResult> {
        if let Some(result) = self.inner.recent_result(data_type) {
            debug!(data_type = %data_type, "reusing result inside coalesce window");
            return Ok(result);
        }
        let pending = {
            let mut in_flight = lock(&self.inner.in_flight);
            match in_flight.get(&data_type) {
                Some(pending) => {
                    debug!(data_type = %data_type, "joining in-flight sync");
                    pending.clone()
                }
                None => {
                    let pending = self.spawn_sync(data_type, options);
                    in_flight.insert(data_type, pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// Returns cached samples when fresh (refreshing them in the background),
    /// otherwise syncs inline and returns the new samples.
    ///
    /// Freshness counts from the last successful provider query in this
    /// process as well as the entry's fetch time, so a sync that found no
    /// changes keeps the cached samples servable.
    pub async fn get_cached_or_sync(
        &self,
        data_type: DataType,
        options: SyncOptions,
        max_cache_age: Duration,
    ) -> Result<Vec<Sample>> {
        let polled = lock(&self.inner.last_polled).get(&data_type).copied();
        if let Some(samples) = self
            .inner
            .cache
            .get_checked(data_type, max_cache_age, polled)
            .await
        {
            let orchestrator = self.clone();
            tokio::spawn(async move {
                if let Err(err) = orchestrator.sync(data_type, options).await {
                    warn!(data_type = %data_type, error = %err, "background cache refresh failed");
                }
            });
            return Ok(samples);
        }
        Ok(self.sync(data_type, options).await?.new_samples)
    }

    pub async fn get_cached(&self, data_type: DataType, options: SyncOptions) -> Result<Vec<Sample>> {
        self.get_cached_or_sync(data_type, options, self.inner.config.cache_max_age)
            .await
    }

    /// Runs independent syncs in parallel. Outcomes are reported per type.
    pub async fn sync_many(
        &self,
        data_types: &[DataType],
        options: SyncOptions,
    ) -> Vec<(DataType, Result<SyncResult>)> {
        join_all(data_types.iter().map(|data_type| {
            let options = options.clone();
            async move { (*data_type, self.sync(*data_type, options).await) }
        }))
        .await
    }

    pub async fn needs_initial_sync(&self, data_type: DataType) -> bool {
        self.inner.cursors.get_cursor(data_type).await.is_none()
    }

    /// Drops the cursor so the next sync asks the provider for everything.
    /// Cached samples are left alone.
    pub async fn force_full_resync(&self, data_type: DataType) {
        lock(&self.inner.recent).remove(&data_type);
        self.inner.cursors.clear_cursor(data_type).await;
        info!(data_type = %data_type, "cursor cleared for full resync");
    }

    fn spawn_sync(&self, data_type: DataType, options: SyncOptions) -> PendingSync {
        let inner = Arc::clone(&self.inner);
        let span = info_span!("sync", data_type = %data_type);
        let handle = tokio::spawn(
            async move {
                let _guard = InFlightGuard {
                    inner: Arc::clone(&inner),
                    data_type,
                };
                let result = inner.run_sync(data_type, options).await;
                if let Ok(result) = &result {
                    lock(&inner.last_polled).insert(data_type, result.sync_timestamp);
                    inner.remember(result);
                }
                result
            }
            .instrument(span),
        );
        async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => Err(SyncError::TaskFailed {
                    data_type,
                    message: err.to_string(),
                }),
            }
        }
        .boxed()
        .shared()
    }
}

impl Inner {
    async fn run_sync(&self, data_type: DataType, options: SyncOptions) -> Result<SyncResult> {
        if !self.provider.supports_anchored(data_type) {
            return self.run_range_sync(data_type, options).await;
        }

        let cursor = self.cursors.get_cursor(data_type).await;
        if cursor.is_none() {
            info!("no cursor stored, requesting full fetch");
        }
        let params = options.query_params();
        let query = AnchoredQuery {
            cursor_token: cursor,
            start_date: options.start_date,
            end_date: options.end_date,
            limit: options.limit,
            unit: options.unit,
        };
        let batch = self
            .provider
            .query_anchored(data_type, query)
            .await
            .map_err(|err| SyncError::Provider {
                data_type,
                message: err.message,
            })?;

        // Deletions first so an id that is deleted and re-added in one batch stays present.
        self.cache
            .remove_by_ids(data_type, &batch.deleted_ids)
            .await
            .map_err(SyncError::storage_write(data_type))?;
        self.cache
            .merge(data_type, &batch.samples, params)
            .await
            .map_err(SyncError::storage_write(data_type))?;
        self.cursors
            .set_cursor(data_type, &batch.new_cursor_token)
            .await
            .map_err(SyncError::storage_write(data_type))?;

        info!(
            new = batch.samples.len(),
            deleted = batch.deleted_ids.len(),
            "sync complete"
        );
        Ok(SyncResult {
            new_samples: batch.samples,
            deleted_sample_ids: batch.deleted_ids,
            cursor: Some(batch.new_cursor_token),
            data_type,
            sync_timestamp: self.clock.now(),
        })
    }

    async fn run_range_sync(&self, data_type: DataType, options: SyncOptions) -> Result<SyncResult> {
        let now = self.clock.now();
        let params = options.query_params();
        let query = RangeQuery {
            start_date: options.start_date.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            end_date: options.end_date.unwrap_or(now),
            limit: options.limit,
            ascending: true,
        };
        let samples = self
            .provider
            .query_samples(data_type, query)
            .await
            .map_err(|err| SyncError::Provider {
                data_type,
                message: err.message,
            })?;
        self.cache
            .merge(data_type, &samples, params)
            .await
            .map_err(SyncError::storage_write(data_type))?;
        info!(new = samples.len(), "range sync complete");
        Ok(SyncResult {
            new_samples: samples,
            deleted_sample_ids: Vec::new(),
            cursor: None,
            data_type,
            sync_timestamp: self.clock.now(),
        })
    }

    fn recent_result(&self, data_type: DataType) -> Option<SyncResult> {
        if self.config.coalesce_window.is_zero() {
            return None;
        }
        let recent = lock(&self.recent);
        let result = recent.get(&data_type)?;
        let age = (self.clock.now() - result.sync_timestamp)
            .to_std()
            .unwrap_or(Duration::ZERO);
        (age < self.config.coalesce_window).then(|| result.clone())
    }

    fn remember(&self, result: &SyncResult) {
        if self.config.coalesce_window.is_zero() {
            return;
        }
        lock(&self.recent).insert(result.data_type, result.clone());
    }
}

/// Removes the in-flight entry when the spawned sync ends, including on panic.
struct InFlightGuard {
    inner: Arc<Inner>,
    data_type: DataType,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.inner.in_flight).remove(&self.data_type);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}
