use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sync_engine::OrchestratorConfig;
use vitalsync_core::DataType;

use crate::cloud::MAX_BATCH_WRITES;
use crate::error::Result;
use crate::services::UploadConfig;

pub const SETTINGS_FILE_NAME: &str = "vitalsync.toml";
pub const DEFAULT_TASK_NAME: &str = "vitalsync-background";

/// User-tunable sync behaviour, persisted as TOML next to the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub cache_max_age_ms: u64,
    pub coalesce_window_ms: u64,
    pub upload_window_days: u32,
    pub batch_size: usize,
    pub timestamp_granularity_secs: u32,
    pub sync_interval_minutes: u32,
    pub tracked_types: Vec<DataType>,
    pub task_name: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            cache_max_age_ms: 5 * 60 * 1000,
            coalesce_window_ms: 0,
            upload_window_days: 7,
            batch_size: MAX_BATCH_WRITES,
            timestamp_granularity_secs: 60,
            sync_interval_minutes: 60,
            tracked_types: vec![
                DataType::Steps,
                DataType::HeartRate,
                DataType::ActiveCalories,
                DataType::Workouts,
            ],
            task_name: DEFAULT_TASK_NAME.to_string(),
        }
    }
}

impl SyncSettings {
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            cache_max_age: Duration::from_millis(self.cache_max_age_ms),
            coalesce_window: Duration::from_millis(self.coalesce_window_ms),
        }
    }

    /// Batch size is clamped to `1..=MAX_BATCH_WRITES`.
    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            batch_size: self.batch_size.clamp(1, MAX_BATCH_WRITES),
            upload_window: chrono::Duration::days(i64::from(self.upload_window_days)),
            timestamp_granularity: chrono::Duration::seconds(i64::from(
                self.timestamp_granularity_secs,
            )),
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.sync_interval_minutes) * 60)
    }
}

#[derive(Debug, Clone)]
pub struct SettingsLoad {
    pub settings: SyncSettings,
    pub path: PathBuf,
    pub created: bool,
}

/// Reads settings from `path`, writing the defaults there first if the file is missing.
pub fn load_or_create(path: &Path) -> Result<SettingsLoad> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let settings: SyncSettings = toml::from_str(&contents)?;
        return Ok(SettingsLoad {
            settings,
            path: path.to_path_buf(),
            created: false,
        });
    }

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let settings = SyncSettings::default();
    fs::write(path, toml::to_string_pretty(&settings)?)?;
    Ok(SettingsLoad {
        settings,
        path: path.to_path_buf(),
        created: true,
    })
}
