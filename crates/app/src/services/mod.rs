mod upload;

use std::sync::Arc;

use sync_engine::SyncOrchestrator;

use crate::app::AppState;
use crate::cloud::CloudStore;

pub use upload::{UploadConfig, UploadService};

/// Services bound to one signed-in user. `sync` is a clone of the
/// orchestrator owned by [`AppState`].
#[derive(Clone)]
pub struct AppServices {
    pub sync: SyncOrchestrator,
    pub upload: UploadService,
}

impl AppServices {
    pub fn new(state: &AppState, user_id: &str, cloud: Arc<dyn CloudStore>) -> Self {
        let sync = state.sync().clone();
        let upload = UploadService::new(
            user_id,
            sync.clone(),
            cloud,
            state.clock(),
            state.settings().upload_config(),
        );
        Self { sync, upload }
    }
}
