use std::path::PathBuf;

use crate::config::SETTINGS_FILE_NAME;
use crate::error::Result;

const DB_FILE_NAME: &str = "vitalsync.sqlite";

#[derive(Clone, Debug)]
pub struct AppPaths {
    pub app_data_dir: PathBuf,
    pub db_path: PathBuf,
    pub settings_path: PathBuf,
}

impl AppPaths {
    pub fn new(app_data_dir: PathBuf) -> Self {
        let db_path = app_data_dir.join(DB_FILE_NAME);
        let settings_path = app_data_dir.join(SETTINGS_FILE_NAME);
        Self {
            app_data_dir,
            db_path,
            settings_path,
        }
    }
}

pub fn ensure_app_data_dir(paths: &AppPaths) -> Result<()> {
    std::fs::create_dir_all(&paths.app_data_dir)?;
    Ok(())
}
