#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sync_engine::{
    AnchoredBatch, AnchoredQuery, HealthDataProvider, ManualClock, MemoryStore, ProviderError,
    RangeQuery, SyncOrchestrator,
};
use vitalsync_app::{
    AppConfig, AppPaths, AppState, MemoryCloudStore, SessionProvider, SyncSettings, UploadService,
};
use vitalsync_core::{DataType, Sample, SampleOrigin};

pub const USER: &str = "user-1";

pub fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-03-01T08:00:00Z")
        .expect("parse")
        .with_timezone(&Utc)
        + Duration::seconds(seconds)
}

/// Sample starting `start_secs` before the harness start time.
pub fn sample(id: &str, data_type: DataType, start_secs: i64, amount: f64) -> Sample {
    Sample {
        id: id.to_string(),
        data_type,
        start_time: at(-start_secs),
        end_time: at(-start_secs + 60),
        amount,
        unit: "count".to_string(),
        origin: SampleOrigin {
            source_name: "Jane's iPhone".to_string(),
            source_id: "com.apple.health.A1B2".to_string(),
            device: Some("iPhone15,2".to_string()),
        },
        metadata: Default::default(),
    }
}

pub fn batch(samples: Vec<Sample>, token: &str) -> AnchoredBatch {
    AnchoredBatch {
        samples,
        deleted_ids: Vec::new(),
        new_cursor_token: token.to_string(),
    }
}

/// Provider answering anchored queries from per-type scripts; unscripted
/// queries return no changes and echo the cursor.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<DataType, VecDeque<Result<AnchoredBatch, ProviderError>>>>,
    calls: AtomicUsize,
    delay: Mutex<Option<StdDuration>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, data_type: DataType, response: AnchoredBatch) {
        self.script(data_type, Ok(response));
    }

    pub fn push_error(&self, data_type: DataType, message: &str) {
        self.script(data_type, Err(ProviderError::new(message)));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every query sleeps this long before answering.
    pub fn set_delay(&self, delay: StdDuration) {
        *self.delay.lock().expect("lock") = Some(delay);
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().expect("lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn script(&self, data_type: DataType, response: Result<AnchoredBatch, ProviderError>) {
        self.scripts
            .lock()
            .expect("lock")
            .entry(data_type)
            .or_default()
            .push_back(response);
    }
}

#[async_trait]
impl HealthDataProvider for ScriptedProvider {
    async fn query_anchored(
        &self,
        data_type: DataType,
        query: AnchoredQuery,
    ) -> Result<AnchoredBatch, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let scripted = self
            .scripts
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
        _data_type: DataType,
        _query: RangeQuery,
    ) -> Result<Vec<Sample>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(Vec::new())
    }
}

pub struct FixedSession(pub Option<String>);

impl SessionProvider for FixedSession {
    fn current_user_id(&self) -> Option<String> {
        self.0.clone()
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub cloud: Arc<MemoryCloudStore>,
    pub provider: Arc<ScriptedProvider>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(at(0)));
        Self {
            cloud: Arc::new(MemoryCloudStore::new(clock.clone())),
            clock,
            store: Arc::new(MemoryStore::new()),
            provider: Arc::new(ScriptedProvider::new()),
        }
    }

    pub fn orchestrator(&self, settings: &SyncSettings) -> SyncOrchestrator {
        SyncOrchestrator::new(
            self.store.clone(),
            self.provider.clone(),
            self.clock.clone(),
            settings.orchestrator_config(),
        )
    }

    pub fn upload(&self, settings: &SyncSettings) -> UploadService {
        UploadService::new(
            USER,
            self.orchestrator(settings),
            self.cloud.clone(),
            self.clock.clone(),
            settings.upload_config(),
        )
    }

    /// App state over this harness's store, provider and clock.
    pub fn app_state(&self, settings: SyncSettings) -> AppState {
        let config = AppConfig {
            paths: AppPaths::new(std::env::temp_dir().join("vitalsync-unused")),
            settings,
        };
        AppState::with_store(
            config,
            self.store.clone(),
            self.provider.clone(),
            self.clock.clone(),
        )
    }

    pub fn sample_docs(&self) -> Vec<(String, serde_json::Value)> {
        self.cloud
            .documents_under(&format!("users/{}/health_samples/", USER))
    }
}
