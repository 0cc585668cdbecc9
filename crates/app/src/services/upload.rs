use std::sync::Arc;

use chrono::Duration;
use futures::future::join_all;
use sync_engine::{Clock, SyncOrchestrator};
use tracing::{debug, error, info, instrument, warn};
use vitalsync_core::{DataType, RunMetadata, RunSummary, SyncOptions, TypeError};

use crate::cloud::{
    CloudStore, DocumentWrite, MAX_BATCH_WRITES, run_metadata_path, sample_document_path,
};
use crate::error::UploadError;
use crate::privacy;
use crate::util::time::trailing_window;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadConfig {
    /// Writes per atomic cloud batch, at most [`MAX_BATCH_WRITES`].
    pub batch_size: usize,
    /// How far back each run asks the orchestrator to look.
    pub upload_window: Duration,
    /// Timestamps are floored to this before leaving the device.
    pub timestamp_granularity: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_WRITES,
            upload_window: Duration::days(7),
            timestamp_granularity: Duration::seconds(60),
        }
    }
}

/// Pushes newly synced samples for one user to the cloud store.
#[derive(Clone)]
pub struct UploadService {
    user_id: String,
    orchestrator: SyncOrchestrator,
    cloud: Arc<dyn CloudStore>,
    clock: Arc<dyn Clock>,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(
        user_id: impl Into<String>,
        orchestrator: SyncOrchestrator,
        cloud: Arc<dyn CloudStore>,
        clock: Arc<dyn Clock>,
        config: UploadConfig,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            orchestrator,
            cloud,
            clock,
            config,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    /// Syncs and uploads every type in parallel, then records the run.
    ///
    /// A failing type is reported in `errors` and does not stop the others.
    #[instrument(skip_all, fields(user_id = %self.user_id, types = data_types.len()))]
    pub async fn sync_all(&self, data_types: &[DataType]) -> RunSummary {
        let outcomes = join_all(
            data_types
                .iter()
                .map(|data_type| async move { (*data_type, self.upload_type(*data_type).await) }),
        )
        .await;

        let mut summary = RunSummary::default();
        let mut uploaded_types = Vec::new();
        for (data_type, outcome) in outcomes {
            match outcome {
                Ok(count) => {
                    if count > 0 {
                        uploaded_types.push(data_type);
                    }
                    summary.synced.insert(data_type, count);
                }
                Err(err) => {
                    warn!(data_type = %data_type, error = %err, "upload failed");
                    summary.errors.push(TypeError {
                        data_type: Some(data_type),
                        message: err.to_string(),
                    });
                }
            }
        }

        let metadata = RunMetadata {
            last_sync_time: self.clock.now(),
            data_types_synced: uploaded_types,
            total_samples_synced: summary.total_synced(),
            errors: summary.errors.iter().map(ToString::to_string).collect(),
        };
        if let Err(err) = self.write_run_metadata(&metadata).await {
            error!(error = %err, "failed to record run metadata");
            summary.errors.push(TypeError {
                data_type: None,
                message: format!("run metadata write failed: {}", err),
            });
        }

        summary.success = summary.errors.is_empty();
        info!(
            total = summary.total_synced(),
            errors = summary.errors.len(),
            "upload run finished"
        );
        summary
    }

    /// Whether at least `interval_minutes` have passed since the last recorded run.
    /// Missing or unreadable metadata counts as due.
    pub async fn should_sync(&self, interval_minutes: u32) -> bool {
        let Some(metadata) = self.last_run_metadata().await else {
            return true;
        };
        let elapsed = self.clock.now() - metadata.last_sync_time;
        elapsed >= Duration::minutes(i64::from(interval_minutes))
    }

    pub async fn last_run_metadata(&self) -> Option<RunMetadata> {
        let path = run_metadata_path(&self.user_id);
        let value = match self.cloud.get_document(&path).await {
            Ok(value) => value?,
            Err(err) => {
                warn!(error = %err, "run metadata read failed");
                return None;
            }
        };
        match serde_json::from_value(value) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                warn!(error = %err, "run metadata unreadable");
                None
            }
        }
    }

    async fn upload_type(&self, data_type: DataType) -> Result<usize, UploadError> {
        let (start, end) = trailing_window(self.clock.now(), self.config.upload_window);
        let result = self
            .orchestrator
            .sync(data_type, SyncOptions::window(start, end))
            .await?;
        if result.new_samples.is_empty() {
            debug!(data_type = %data_type, "nothing new to upload");
            return Ok(0);
        }

        let writes = result
            .new_samples
            .iter()
            .map(|sample| -> Result<DocumentWrite, UploadError> {
                let record =
                    privacy::anonymize(sample, &self.user_id, self.config.timestamp_granularity);
                Ok(DocumentWrite {
                    path: sample_document_path(&self.user_id, &privacy::document_id(sample)),
                    data: serde_json::to_value(record)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let count = writes.len();
        if let Err(err) = self.commit_in_batches(writes).await {
            // The cursor is already past these samples; the next run re-reads the window.
            warn!(data_type = %data_type, "upload interrupted, dropping cursor");
            self.orchestrator.force_full_resync(data_type).await;
            return Err(err);
        }
        debug!(data_type = %data_type, count, "uploaded samples");
        Ok(count)
    }

    async fn commit_in_batches(&self, writes: Vec<DocumentWrite>) -> Result<(), UploadError> {
        let batch_size = self.config.batch_size.clamp(1, MAX_BATCH_WRITES);
        let mut batch = Vec::with_capacity(batch_size.min(writes.len()));
        for write in writes {
            batch.push(write);
            if batch.len() == batch_size {
                self.cloud.commit_batch(std::mem::take(&mut batch)).await?;
            }
        }
        if !batch.is_empty() {
            self.cloud.commit_batch(batch).await?;
        }
        Ok(())
    }

    async fn write_run_metadata(&self, metadata: &RunMetadata) -> Result<(), UploadError> {
        let value = serde_json::to_value(metadata)?;
        self.cloud
            .set_document(&run_metadata_path(&self.user_id), value)
            .await?;
        Ok(())
    }
}
