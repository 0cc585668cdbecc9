use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use vitalsync_core::{DataType, SyncCursor};

use crate::clock::Clock;
use crate::store::KeyValueStore;
use crate::types::StoreError;

pub(crate) const CURSOR_PREFIX: &str = "sync_cursor:";

fn cursor_key(data_type: DataType) -> String {
    format!("{}{}", CURSOR_PREFIX, data_type.as_str())
}

/// Durable per-type store of provider cursor tokens.
///
/// Reads fail open: a missing or unreadable cursor only costs a full fetch.
#[derive(Clone)]
pub struct SyncCursorStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl SyncCursorStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn get(&self, data_type: DataType) -> Option<SyncCursor> {
        let raw = match self.store.get(&cursor_key(data_type)).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(data_type = %data_type, error = %err, "cursor read failed, treating as missing");
                return None;
            }
        };
        match serde_json::from_str::<SyncCursor>(&raw) {
            Ok(cursor) => Some(cursor),
            Err(err) => {
                warn!(data_type = %data_type, error = %err, "cursor record unreadable, treating as missing");
                None
            }
        }
    }

    pub async fn get_cursor(&self, data_type: DataType) -> Option<String> {
        self.get(data_type).await.map(|cursor| cursor.opaque_token)
    }

    pub async fn get_last_sync_timestamp(&self, data_type: DataType) -> Option<DateTime<Utc>> {
        self.get(data_type)
            .await
            .map(|cursor| cursor.last_sync_timestamp)
    }

    /// Replaces the stored cursor. Re-storing the current token leaves the record untouched.
    pub async fn set_cursor(&self, data_type: DataType, token: &str) -> Result<(), StoreError> {
        if let Some(existing) = self.get(data_type).await
            && existing.opaque_token == token
        {
            debug!(data_type = %data_type, "cursor unchanged");
            return Ok(());
        }
        let cursor = SyncCursor {
            data_type,
            opaque_token: token.to_string(),
            last_sync_timestamp: self.clock.now(),
        };
        let raw = serde_json::to_string(&cursor).map_err(StoreError::Encode)?;
        self.store.set(&cursor_key(data_type), &raw).await
    }

    pub async fn clear_cursor(&self, data_type: DataType) {
        if let Err(err) = self.store.delete(&cursor_key(data_type)).await {
            warn!(data_type = %data_type, error = %err, "failed to clear cursor");
        }
    }

    pub async fn clear_all(&self) {
        match self.store.delete_prefix(CURSOR_PREFIX).await {
            Ok(cleared) => debug!(cleared, "cleared cursors"),
            Err(err) => warn!(error = %err, "failed to clear cursors"),
        }
    }
}
