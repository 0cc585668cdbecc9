use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health data categories the engine knows how to sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Steps,
    HeartRate,
    RestingHeartRate,
    ActiveCalories,
    BasalCalories,
    Distance,
    Workouts,
    Sleep,
}

impl DataType {
    pub const ALL: [DataType; 8] = [
        DataType::Steps,
        DataType::HeartRate,
        DataType::RestingHeartRate,
        DataType::ActiveCalories,
        DataType::BasalCalories,
        DataType::Distance,
        DataType::Workouts,
        DataType::Sleep,
    ];

    /// Stable key used in storage keys and cloud documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Steps => "steps",
            Self::HeartRate => "heart_rate",
            Self::RestingHeartRate => "resting_heart_rate",
            Self::ActiveCalories => "active_calories",
            Self::BasalCalories => "basal_calories",
            Self::Distance => "distance",
            Self::Workouts => "workouts",
            Self::Sleep => "sleep",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDataType(pub String);

impl fmt::Display for UnknownDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown data type {}", self.0)
    }
}

impl std::error::Error for UnknownDataType {}

impl FromStr for DataType {
    type Err = UnknownDataType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|data_type| data_type.as_str() == value)
            .ok_or_else(|| UnknownDataType(value.to_string()))
    }
}

/// Where a sample was recorded. Resolved by the provider facade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleOrigin {
    pub source_name: String,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// One normalized health measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
    pub data_type: DataType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub amount: f64,
    pub unit: String,
    pub origin: SampleOrigin,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Incremental-sync position for one data type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub data_type: DataType,
    pub opaque_token: String,
    pub last_sync_timestamp: DateTime<Utc>,
}

/// Query parameters recorded alongside a cache entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheQueryParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data_type: DataType,
    pub samples: Vec<Sample>,
    pub last_fetch_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub last_query_params: CacheQueryParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTypeStats {
    pub count: usize,
    pub last_fetch: DateTime<Utc>,
}

pub type CacheStats = BTreeMap<DataType, CacheTypeStats>;

/// Caller options for a single sync.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOptions {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub unit: Option<String>,
}

impl SyncOptions {
    pub fn window(start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            start_date: Some(start_date),
            end_date: Some(end_date),
            ..Self::default()
        }
    }

    pub fn query_params(&self) -> CacheQueryParams {
        CacheQueryParams {
            start_date: self.start_date,
            end_date: self.end_date,
            limit: self.limit,
            unit: self.unit.clone(),
        }
    }
}

/// Output of one orchestrator sync for one data type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub new_samples: Vec<Sample>,
    pub deleted_sample_ids: Vec<String>,
    /// `None` when the provider could only answer with a range query.
    pub cursor: Option<String>,
    pub data_type: DataType,
    pub sync_timestamp: DateTime<Utc>,
}

/// Per-user run record kept in the cloud store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub last_sync_time: DateTime<Utc>,
    pub data_types_synced: Vec<DataType>,
    pub total_samples_synced: u64,
    pub errors: Vec<String>,
}

/// A failure attributed to one data type, or to the run itself when `data_type` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeError {
    pub data_type: Option<DataType>,
    pub message: String,
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data_type {
            Some(data_type) => write!(f, "{}: {}", data_type, self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub success: bool,
    pub synced: BTreeMap<DataType, usize>,
    pub errors: Vec<TypeError>,
}

impl RunSummary {
    pub fn total_synced(&self) -> u64 {
        self.synced.values().map(|count| *count as u64).sum()
    }
}
