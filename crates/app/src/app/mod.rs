use std::sync::Arc;

use sync_engine::{
    Clock, HealthDataProvider, KeyValueStore, SqliteStore, SyncOrchestrator, SystemClock,
};
use tracing::info;

use crate::cloud::CloudStore;
use crate::config::{self, SyncSettings};
use crate::error::Result;
use crate::scheduler::{BackgroundContext, SessionProvider};
use crate::services::AppServices;
use crate::startup::{AppPaths, ensure_app_data_dir};

/// Resolved locations and settings for one installation.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub paths: AppPaths,
    pub settings: SyncSettings,
}

/// Application state shared by foreground and background entry points.
///
/// Owns the process-wide orchestrator; services and background contexts
/// hold clones of it so per-type syncs coalesce across all of them.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    sync: SyncOrchestrator,
}

impl AppState {
    /// Creates the data directory, loads or writes settings and opens the database.
    pub fn new(paths: AppPaths, provider: Arc<dyn HealthDataProvider>) -> Result<Self> {
        ensure_app_data_dir(&paths)?;
        let loaded = config::load_or_create(&paths.settings_path)?;
        if loaded.created {
            info!(path = %loaded.path.display(), "wrote default settings");
        }
        let store = SqliteStore::open(&paths.db_path)?;
        let config = AppConfig {
            paths,
            settings: loaded.settings,
        };
        Ok(Self::with_store(
            config,
            Arc::new(store),
            provider,
            Arc::new(SystemClock),
        ))
    }

    pub fn with_store(
        config: AppConfig,
        store: Arc<dyn KeyValueStore>,
        provider: Arc<dyn HealthDataProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sync = SyncOrchestrator::new(
            Arc::clone(&store),
            provider,
            Arc::clone(&clock),
            config.settings.orchestrator_config(),
        );
        Self {
            config: Arc::new(config),
            store,
            clock,
            sync,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.config.settings
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn sync(&self) -> &SyncOrchestrator {
        &self.sync
    }

    pub fn services(&self, user_id: &str, cloud: Arc<dyn CloudStore>) -> AppServices {
        AppServices::new(self, user_id, cloud)
    }

    pub fn background_context(
        &self,
        session: Arc<dyn SessionProvider>,
        cloud: Arc<dyn CloudStore>,
    ) -> BackgroundContext {
        BackgroundContext {
            session,
            orchestrator: self.sync.clone(),
            cloud,
            clock: self.clock(),
            settings: self.settings().clone(),
        }
    }

    /// Drops every cursor and cached sample, e.g. when the user signs out.
    pub async fn reset_local_state(&self) -> Result<()> {
        self.sync.cursors().clear_all().await;
        self.sync.cache().clear(None).await?;
        info!("local sync state cleared");
        Ok(())
    }
}
