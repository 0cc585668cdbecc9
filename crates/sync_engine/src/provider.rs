use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vitalsync_core::{DataType, Sample};

use crate::types::ProviderError;

/// Parameters for an incremental (anchored) provider query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchoredQuery {
    /// Omitted on the first sync or after a forced resync, which asks for a full fetch.
    pub cursor_token: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub unit: Option<String>,
}

/// Provider answer to an anchored query. The new token is always present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchoredBatch {
    pub samples: Vec<Sample>,
    pub deleted_ids: Vec<String>,
    pub new_cursor_token: String,
}

/// Parameters for a full/historical range query.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub limit: Option<u32>,
    pub ascending: bool,
}

/// Facade over the on-device health data source.
///
/// Platform record shapes are normalized into [`Sample`] before they cross
/// this boundary.
#[async_trait]
pub trait HealthDataProvider: Send + Sync {
    /// Whether `query_anchored` works for this type. Types that return `false`
    /// are synced with `query_samples` and never get a cursor.
    fn supports_anchored(&self, _data_type: DataType) -> bool {
        true
    }

    async fn query_anchored(
        &self,
        data_type: DataType,
        query: AnchoredQuery,
    ) -> Result<AnchoredBatch, ProviderError>;

    async fn query_samples(
        &self,
        data_type: DataType,
        query: RangeQuery,
    ) -> Result<Vec<Sample>, ProviderError>;
}
