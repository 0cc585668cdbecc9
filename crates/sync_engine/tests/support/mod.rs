#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sync_engine::{
    AnchoredBatch, AnchoredQuery, HealthDataProvider, KeyValueStore, MemoryStore, ProviderError,
    RangeQuery, StoreError,
};
use vitalsync_core::{DataType, Sample, SampleOrigin};

pub fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-03-01T08:00:00Z")
        .expect("parse")
        .with_timezone(&Utc)
        + ChronoDuration::seconds(seconds)
}

pub fn sample(id: &str, data_type: DataType, start_secs: i64, amount: f64) -> Sample {
    Sample {
        id: id.to_string(),
        data_type,
        start_time: at(start_secs),
        end_time: at(start_secs + 60),
        amount,
        unit: "count".to_string(),
        origin: SampleOrigin {
            source_name: "Watch".to_string(),
            source_id: "com.example.watch".to_string(),
            device: Some("Apple Watch Series 9".to_string()),
        },
        metadata: Default::default(),
    }
}

pub fn batch(samples: Vec<Sample>, deleted: &[&str], token: &str) -> AnchoredBatch {
    AnchoredBatch {
        samples,
        deleted_ids: deleted.iter().map(|id| id.to_string()).collect(),
        new_cursor_token: token.to_string(),
    }
}

pub fn ids(samples: &[Sample]) -> Vec<&str> {
    samples.iter().map(|sample| sample.id.as_str()).collect()
}

/// Scripted provider. With no scripted answer it echoes the cursor back with no changes.
#[derive(Default)]
pub struct MockProvider {
    anchored: Mutex<HashMap<DataType, VecDeque<Result<AnchoredBatch, ProviderError>>>>,
    ranged: Mutex<HashMap<DataType, Vec<Sample>>>,
    range_only: Mutex<HashSet<DataType>>,
    pub anchored_queries: Mutex<Vec<(DataType, AnchoredQuery)>>,
    pub range_queries: Mutex<Vec<(DataType, RangeQuery)>>,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, data_type: DataType, response: AnchoredBatch) {
        self.anchored
            .lock()
            .expect("lock")
            .entry(data_type)
            .or_default()
            .push_back(Ok(response));
    }

    pub fn push_error(&self, data_type: DataType, message: &str) {
        self.anchored
            .lock()
            .expect("lock")
            .entry(data_type)
            .or_default()
            .push_back(Err(ProviderError::new(message)));
    }

    pub fn range_only(&self, data_type: DataType, samples: Vec<Sample>) {
        self.range_only.lock().expect("lock").insert(data_type);
        self.ranged.lock().expect("lock").insert(data_type, samples);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("lock") = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_anchored_query(&self, data_type: DataType) -> Option<AnchoredQuery> {
        self.anchored_queries
            .lock()
            .expect("lock")
            .iter()
            .rev()
            .find(|(queried, _)| *queried == data_type)
            .map(|(_, query)| query.clone())
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().expect("lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl HealthDataProvider for MockProvider {
    fn supports_anchored(&self, data_type: DataType) -> bool {
        !self.range_only.lock().expect("lock").contains(&data_type)
    }

    async fn query_anchored(
        &self,
        data_type: DataType,
        query: AnchoredQuery,
    ) -> Result<AnchoredBatch, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.anchored_queries
            .lock()
            .expect("lock")
            .push((data_type, query.clone()));
        self.pause().await;
        let scripted = self
            .anchored
            .lock()
            .expect("lock")
            .get_mut(&data_type)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| {
            Ok(AnchoredBatch {
                new_cursor_token: query.cursor_token.unwrap_or_else(|| "T0".to_string()),
                ..AnchoredBatch::default()
            })
        })
    }

    async fn query_samples(
        &self,
        data_type: DataType,
        query: RangeQuery,
    ) -> Result<Vec<Sample>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.range_queries
            .lock()
            .expect("lock")
            .push((data_type, query));
        self.pause().await;
        Ok(self
            .ranged
            .lock()
            .expect("lock")
            .get(&data_type)
            .cloned()
            .unwrap_or_default())
    }
}

/// Memory store with switchable read and write failures.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_write_prefix: Mutex<Option<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, enabled: bool) {
        self.fail_reads.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_writes_under(&self, prefix: Option<&str>) {
        *self.fail_write_prefix.lock().expect("lock") = prefix.map(str::to_string);
    }

    fn write_blocked(&self, key: &str) -> bool {
        self.fail_write_prefix
            .lock()
            .expect("lock")
            .as_deref()
            .is_some_and(|prefix| key.starts_with(prefix))
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk unavailable".to_string()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.write_blocked(key) {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        if self.write_blocked(key) {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.delete(key).await
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk unavailable".to_string()));
        }
        self.inner.list_keys(prefix).await
    }
}
