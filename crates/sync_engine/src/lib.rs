mod cache;
mod clock;
mod cursor;
mod orchestrator;
mod provider;
mod store;
mod types;

pub use cache::LocalCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use cursor::SyncCursorStore;
pub use orchestrator::{OrchestratorConfig, SyncOrchestrator};
pub use provider::{AnchoredBatch, AnchoredQuery, HealthDataProvider, RangeQuery};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use types::{ProviderError, Result, StoreError, SyncError};
