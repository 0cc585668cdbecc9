use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use sync_engine::Clock;
use thiserror::Error;

use crate::util::time::to_rfc3339_millis;

/// Upper bound on writes in one atomic batch.
pub const MAX_BATCH_WRITES: usize = 500;

/// Field the store stamps on every written document.
pub const SERVER_TIMESTAMP_FIELD: &str = "server_written_at";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloudError {
    #[error("batch of {0} writes exceeds the limit of {MAX_BATCH_WRITES}")]
    BatchTooLarge(usize),
    #[error("write rejected: {0}")]
    Rejected(String),
    #[error("cloud store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
    pub path: String,
    pub data: Value,
}

pub fn sample_document_path(user_id: &str, doc_id: &str) -> String {
    format!("users/{}/health_samples/{}", user_id, doc_id)
}

pub fn run_metadata_path(user_id: &str) -> String {
    format!("users/{}/sync_metadata/latest", user_id)
}

/// Remote document store. Writes overwrite the whole document at `path`.
#[async_trait]
pub trait CloudStore: Send + Sync {
    async fn set_document(&self, path: &str, data: Value) -> Result<(), CloudError>;

    async fn get_document(&self, path: &str) -> Result<Option<Value>, CloudError>;

    /// All writes land or none do.
    async fn commit_batch(&self, writes: Vec<DocumentWrite>) -> Result<(), CloudError>;
}

/// In-process document store.
pub struct MemoryCloudStore {
    documents: Mutex<BTreeMap<String, Value>>,
    clock: Arc<dyn Clock>,
    batches: AtomicUsize,
    unavailable: AtomicBool,
    reject_paths_containing: Mutex<Vec<String>>,
}

impl MemoryCloudStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            documents: Mutex::new(BTreeMap::new()),
            clock,
            batches: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            reject_paths_containing: Mutex::new(Vec::new()),
        }
    }

    pub fn document(&self, path: &str) -> Option<Value> {
        lock(&self.documents).get(path).cloned()
    }

    pub fn documents_under(&self, prefix: &str) -> Vec<(String, Value)> {
        lock(&self.documents)
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, value)| (path.clone(), value.clone()))
            .collect()
    }

    /// Number of batches committed successfully.
    pub fn committed_batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Every call fails with `Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Rejects any batch or single write whose path contains `fragment`.
    pub fn reject_paths_containing(&self, fragment: &str) {
        lock(&self.reject_paths_containing).push(fragment.to_string());
    }

    pub fn clear_rejections(&self) {
        lock(&self.reject_paths_containing).clear();
    }

    fn check_available(&self) -> Result<(), CloudError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CloudError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }

    fn check_path(&self, path: &str) -> Result<(), CloudError> {
        let rejected = lock(&self.reject_paths_containing);
        if rejected.iter().any(|fragment| path.contains(fragment.as_str())) {
            return Err(CloudError::Rejected(path.to_string()));
        }
        Ok(())
    }

    fn stamp(&self, mut data: Value) -> Value {
        if let Value::Object(fields) = &mut data {
            fields.insert(
                SERVER_TIMESTAMP_FIELD.to_string(),
                Value::String(to_rfc3339_millis(self.clock.now())),
            );
        }
        data
    }
}

#[async_trait]
impl CloudStore for MemoryCloudStore {
    async fn set_document(&self, path: &str, data: Value) -> Result<(), CloudError> {
        self.check_available()?;
        self.check_path(path)?;
        let data = self.stamp(data);
        lock(&self.documents).insert(path.to_string(), data);
        Ok(())
    }

    async fn get_document(&self, path: &str) -> Result<Option<Value>, CloudError> {
        self.check_available()?;
        Ok(self.document(path))
    }

    async fn commit_batch(&self, writes: Vec<DocumentWrite>) -> Result<(), CloudError> {
        if writes.len() > MAX_BATCH_WRITES {
            return Err(CloudError::BatchTooLarge(writes.len()));
        }
        self.check_available()?;
        for write in &writes {
            self.check_path(&write.path)?;
        }
        let stamped: Vec<_> = writes
            .into_iter()
            .map(|write| (write.path, self.stamp(write.data)))
            .collect();
        lock(&self.documents).extend(stamped);
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}
