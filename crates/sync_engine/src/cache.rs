use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use vitalsync_core::{
    CacheEntry, CacheQueryParams, CacheStats, CacheTypeStats, DataType, Sample,
};

use crate::clock::Clock;
use crate::store::KeyValueStore;
use crate::types::StoreError;

pub(crate) const CACHE_PREFIX: &str = "sample_cache:";

fn cache_key(data_type: DataType) -> String {
    format!("{}{}", CACHE_PREFIX, data_type.as_str())
}

/// TTL-bounded, id-deduplicated sample cache, one entry per data type.
///
/// Reads fail open (a broken entry is a miss). Mutations propagate store
/// failures so a failed read never lets a merge overwrite cached samples.
#[derive(Clone)]
pub struct LocalCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl LocalCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Cached samples if the entry is no older than `max_age`.
    /// Pass `Duration::MAX` to accept any age.
    pub async fn get(&self, data_type: DataType, max_age: Duration) -> Option<Vec<Sample>> {
        self.get_checked(data_type, max_age, None).await
    }

    /// Like [`get`](Self::get), but age is measured from the later of the
    /// entry's fetch time and `checked_at`, the last time the provider was
    /// asked and reported nothing new.
    pub async fn get_checked(
        &self,
        data_type: DataType,
        max_age: Duration,
        checked_at: Option<DateTime<Utc>>,
    ) -> Option<Vec<Sample>> {
        let entry = self.entry(data_type).await?;
        let since = checked_at.map_or(entry.last_fetch_timestamp, |checked| {
            checked.max(entry.last_fetch_timestamp)
        });
        let age = (self.clock.now() - since)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if age > max_age {
            debug!(data_type = %data_type, age_ms = millis(age), "cache entry stale");
            return None;
        }
        Some(entry.samples)
    }

    /// The stored entry regardless of freshness.
    pub async fn entry(&self, data_type: DataType) -> Option<CacheEntry> {
        match self.load(data_type).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(data_type = %data_type, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    pub async fn put(
        &self,
        data_type: DataType,
        samples: Vec<Sample>,
        query_params: CacheQueryParams,
    ) -> Result<(), StoreError> {
        let entry = CacheEntry {
            data_type,
            samples: merge_samples(Vec::new(), samples),
            last_fetch_timestamp: self.clock.now(),
            last_query_params: query_params,
        };
        self.save(&entry).await
    }

    /// Union by id with `new_samples` winning, re-sorted by start time.
    /// `query_params` is recorded whenever the entry is written; merging
    /// nothing into an existing entry writes nothing.
    pub async fn merge(
        &self,
        data_type: DataType,
        new_samples: &[Sample],
        query_params: CacheQueryParams,
    ) -> Result<(), StoreError> {
        let existing = self.load(data_type).await?;
        if existing.is_some() && new_samples.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();
        let mut entry = existing.unwrap_or_else(|| CacheEntry {
            data_type,
            samples: Vec::new(),
            last_fetch_timestamp: now,
            last_query_params: CacheQueryParams::default(),
        });
        entry.samples = merge_samples(entry.samples, new_samples.to_vec());
        entry.last_fetch_timestamp = now;
        entry.last_query_params = query_params;
        self.save(&entry).await
    }

    /// Drops samples whose id is listed. Returns how many were removed.
    pub async fn remove_by_ids(&self, data_type: DataType, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let Some(mut entry) = self.load(data_type).await? else {
            return Ok(0);
        };
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let before = entry.samples.len();
        entry
            .samples
            .retain(|sample| !ids.contains(sample.id.as_str()));
        let removed = before - entry.samples.len();
        if removed > 0 {
            self.save(&entry).await?;
        }
        Ok(removed)
    }

    /// Clears one type, or every cached type when `data_type` is `None`.
    pub async fn clear(&self, data_type: Option<DataType>) -> Result<(), StoreError> {
        match data_type {
            Some(data_type) => {
                self.store.delete(&cache_key(data_type)).await?;
            }
            None => {
                let removed = self.store.delete_prefix(CACHE_PREFIX).await?;
                debug!(removed, "cleared sample cache");
            }
        }
        Ok(())
    }

    pub async fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::new();
        let keys = match self.store.list_keys(CACHE_PREFIX).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "failed to list cache entries");
                return stats;
            }
        };
        for key in keys {
            let Some(data_type) = key
                .strip_prefix(CACHE_PREFIX)
                .and_then(|value| value.parse::<DataType>().ok())
            else {
                continue;
            };
            if let Some(entry) = self.entry(data_type).await {
                stats.insert(
                    data_type,
                    CacheTypeStats {
                        count: entry.samples.len(),
                        last_fetch: entry.last_fetch_timestamp,
                    },
                );
            }
        }
        stats
    }

    async fn load(&self, data_type: DataType) -> Result<Option<CacheEntry>, StoreError> {
        let Some(raw) = self.store.get(&cache_key(data_type)).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                warn!(data_type = %data_type, error = %err, "discarding unreadable cache entry");
                Ok(None)
            }
        }
    }

    async fn save(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        let raw = serde_json::to_string(entry).map_err(StoreError::Encode)?;
        self.store.set(&cache_key(entry.data_type), &raw).await
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Last occurrence of an id wins; output is ordered by start time, then id.
fn merge_samples(existing: Vec<Sample>, incoming: Vec<Sample>) -> Vec<Sample> {
    let mut by_id: HashMap<String, Sample> = HashMap::with_capacity(existing.len() + incoming.len());
    for sample in existing.into_iter().chain(incoming) {
        by_id.insert(sample.id.clone(), sample);
    }
    let mut samples: Vec<Sample> = by_id.into_values().collect();
    samples.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.id.cmp(&b.id))
    });
    samples
}
