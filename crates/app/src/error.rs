use thiserror::Error;

use crate::cloud::CloudError;
use crate::scheduler::SchedulerError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("db error: {0}")]
    Db(#[from] vitalsync_db::DbError),
    #[error("store error: {0}")]
    Store(#[from] sync_engine::StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failure uploading one data type.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Sync(#[from] sync_engine::SyncError),
    #[error("cloud write failed: {0}")]
    Cloud(#[from] CloudError),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}
