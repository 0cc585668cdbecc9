use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use sync_engine::{Clock, SyncOrchestrator};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use vitalsync_core::RunSummary;

use crate::cloud::CloudStore;
use crate::config::SyncSettings;
use crate::services::UploadService;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

pub type BackgroundTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no async runtime to host background tasks: {0}")]
    NoRuntime(String),
}

/// Host hook for periodic work. Registering an existing name and removing an
/// unknown one are both no-ops.
pub trait HostScheduler: Send + Sync {
    /// Returns `false` when `name` is already registered.
    fn register(&self, name: &str, interval: Duration, task: BackgroundTask) -> bool;

    /// Returns `false` when nothing was registered under `name`.
    fn unregister(&self, name: &str) -> bool;

    fn is_registered(&self, name: &str) -> bool;
}

/// Runs each registered task on its own tokio interval. The first run happens
/// one interval after registration.
pub struct TokioScheduler {
    handle: Handle,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TokioScheduler {
    /// Binds to the runtime of the calling context.
    pub fn new() -> Result<Self, SchedulerError> {
        let handle =
            Handle::try_current().map_err(|err| SchedulerError::NoRuntime(err.to_string()))?;
        Ok(Self::with_handle(handle))
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

impl HostScheduler for TokioScheduler {
    fn register(&self, name: &str, interval: Duration, task: BackgroundTask) -> bool {
        let mut tasks = lock(&self.tasks);
        if tasks.get(name).is_some_and(|handle| !handle.is_finished()) {
            debug!(task = name, "background task already registered");
            return false;
        }
        let period = interval.max(MIN_INTERVAL);
        let handle = self.handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                task().await;
            }
        });
        tasks.insert(name.to_string(), handle);
        info!(task = name, interval_secs = period.as_secs(), "background task registered");
        true
    }

    fn unregister(&self, name: &str) -> bool {
        match lock(&self.tasks).remove(name) {
            Some(handle) => {
                handle.abort();
                info!(task = name, "background task unregistered");
                true
            }
            None => false,
        }
    }

    fn is_registered(&self, name: &str) -> bool {
        lock(&self.tasks)
            .get(name)
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in lock(&self.tasks).drain() {
            handle.abort();
        }
    }
}

/// Identity of the signed-in user, if any.
pub trait SessionProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
}

/// Everything a background run needs; built once at registration.
#[derive(Clone)]
pub struct BackgroundContext {
    pub session: Arc<dyn SessionProvider>,
    /// Shared with foreground callers. Its provider must not prompt the
    /// user; background runs have no UI.
    pub orchestrator: SyncOrchestrator,
    pub cloud: Arc<dyn CloudStore>,
    pub clock: Arc<dyn Clock>,
    pub settings: SyncSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundOutcome {
    NoSession,
    NotDue,
    Completed(RunSummary),
}

pub async fn run_background_sync(ctx: &BackgroundContext) -> BackgroundOutcome {
    let Some(user_id) = ctx.session.current_user_id() else {
        debug!("no signed-in user, skipping background sync");
        return BackgroundOutcome::NoSession;
    };
    let upload = UploadService::new(
        user_id,
        ctx.orchestrator.clone(),
        Arc::clone(&ctx.cloud),
        Arc::clone(&ctx.clock),
        ctx.settings.upload_config(),
    );
    if !upload.should_sync(ctx.settings.sync_interval_minutes).await {
        debug!("background sync not due");
        return BackgroundOutcome::NotDue;
    }
    BackgroundOutcome::Completed(upload.sync_all(&ctx.settings.tracked_types).await)
}

/// Registers the periodic upload under `settings.task_name`.
pub fn register_background_sync(scheduler: &dyn HostScheduler, ctx: BackgroundContext) -> bool {
    let name = ctx.settings.task_name.clone();
    let interval = ctx.settings.sync_interval();
    let ctx = Arc::new(ctx);
    let task: BackgroundTask = Arc::new(move || {
        let ctx = Arc::clone(&ctx);
        async move {
            match run_background_sync(&ctx).await {
                BackgroundOutcome::Completed(summary) if !summary.success => {
                    warn!(errors = summary.errors.len(), "background sync finished with errors");
                }
                BackgroundOutcome::Completed(summary) => {
                    info!(total = summary.total_synced(), "background sync finished");
                }
                outcome => debug!(?outcome, "background sync skipped"),
            }
        }
        .boxed()
    });
    scheduler.register(&name, interval, task)
}

pub fn unregister_background_sync(scheduler: &dyn HostScheduler, name: &str) -> bool {
    scheduler.unregister(name)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}
