pub mod app;
pub mod cloud;
pub mod config;
pub mod error;
pub mod logging;
pub mod privacy;
pub mod scheduler;
pub mod services;
pub mod startup;
pub mod util;

pub use app::{AppConfig, AppState};
pub use cloud::{CloudError, CloudStore, DocumentWrite, MAX_BATCH_WRITES, MemoryCloudStore};
pub use config::{SettingsLoad, SyncSettings, load_or_create};
pub use error::{AppError, Result, UploadError};
pub use logging::init_logging;
pub use scheduler::{
    BackgroundContext, BackgroundOutcome, BackgroundTask, HostScheduler, SchedulerError,
    SessionProvider, TokioScheduler, register_background_sync, run_background_sync,
    unregister_background_sync,
};
pub use services::{AppServices, UploadConfig, UploadService};
pub use startup::{AppPaths, ensure_app_data_dir};
