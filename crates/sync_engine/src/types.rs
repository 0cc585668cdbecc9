use thiserror::Error;
use vitalsync_core::DataType;

/// Failures from the local key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("db error: {0}")]
    Db(#[from] vitalsync_db::DbError),
    #[error("decode error: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Error returned by a health-data provider facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Outcome of a failed orchestrator sync.
///
/// Cloneable so every coalesced caller receives the same value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("provider query for {data_type} failed: {message}")]
    Provider { data_type: DataType, message: String },
    #[error("storage write for {data_type} failed: {message}")]
    StorageWrite { data_type: DataType, message: String },
    #[error("sync task for {data_type} did not complete: {message}")]
    TaskFailed { data_type: DataType, message: String },
}

impl SyncError {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Provider { data_type, .. }
            | Self::StorageWrite { data_type, .. }
            | Self::TaskFailed { data_type, .. } => *data_type,
        }
    }

    /// Nothing was committed for a provider failure, so the next run can simply retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::TaskFailed { .. })
    }

    pub(crate) fn storage_write(data_type: DataType) -> impl FnOnce(StoreError) -> Self {
        move |err| Self::StorageWrite {
            data_type,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
