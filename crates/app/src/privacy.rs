use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use vitalsync_core::{DataType, Sample};

use crate::util::time::{round_down, to_rfc3339_millis};

const LOCATION_KEY_MARKERS: &[&str] = &[
    "latitude",
    "longitude",
    "altitude",
    "location",
    "coordinate",
    "gps",
    "route",
    "geo",
];

const MODEL_QUALIFIERS: &[&str] = &["series", "pro", "max", "ultra", "plus", "mini", "se"];

const UNKNOWN_DEVICE: &str = "Unknown";

/// Sample as it is stored remotely, with identifying detail removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudSampleRecord {
    pub data_type: DataType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub amount: f64,
    pub unit: String,
    pub source_name: String,
    pub source_ref: String,
    pub device_family: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

pub fn anonymize(sample: &Sample, user_id: &str, granularity: Duration) -> CloudSampleRecord {
    let mut metadata = sample.metadata.clone();
    strip_location(&mut metadata);
    CloudSampleRecord {
        data_type: sample.data_type,
        start_time: round_down(sample.start_time, granularity),
        end_time: round_down(sample.end_time, granularity),
        amount: sample.amount,
        unit: sample.unit.clone(),
        source_name: device_family(&sample.origin.source_name),
        source_ref: pseudonymize(&sample.origin.source_id, user_id),
        device_family: sample.origin.device.as_deref().map(device_family),
        metadata,
    }
}

/// Stable remote id: the same reading always maps to the same document.
pub fn document_id(sample: &Sample) -> String {
    let mut hasher = Sha256::new();
    hasher.update(to_rfc3339_millis(sample.start_time).as_bytes());
    hasher.update(b"|");
    hasher.update(sample.amount.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(sample.data_type.as_str().as_bytes());
    hex_digest(&hasher.finalize())
}

/// Salted one-way replacement for a source identifier.
pub fn pseudonymize(value: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(value.as_bytes());
    hex_digest(&hasher.finalize())
}

/// Reduces a device or source name to its product family.
///
/// Owner names (`Jane's iPhone`) and model suffixes (`iPhone15,2`,
/// `Apple Watch Series 9`) are dropped.
pub fn device_family(name: &str) -> String {
    let mut words: Vec<&str> = Vec::new();
    for word in name.split_whitespace() {
        if word.ends_with("'s") || word.ends_with("\u{2019}s") {
            continue;
        }
        if MODEL_QUALIFIERS.contains(&word.to_ascii_lowercase().as_str()) {
            break;
        }
        match word.find(|c: char| c.is_ascii_digit()) {
            None => words.push(word),
            Some(index) => {
                let stem = word[..index].trim_end_matches(|c: char| !c.is_alphanumeric());
                if !stem.is_empty() {
                    words.push(stem);
                }
                break;
            }
        }
    }
    if words.is_empty() {
        UNKNOWN_DEVICE.to_string()
    } else {
        words.join(" ")
    }
}

/// Removes location-bearing keys at any depth.
pub fn strip_location(metadata: &mut BTreeMap<String, Value>) {
    metadata.retain(|key, _| !is_location_key(key));
    metadata.values_mut().for_each(scrub);
}

fn scrub(value: &mut Value) {
    match value {
        Value::Object(fields) => {
            fields.retain(|key, _| !is_location_key(key));
            fields.values_mut().for_each(scrub);
        }
        Value::Array(items) => items.iter_mut().for_each(scrub),
        _ => {}
    }
}

fn is_location_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    LOCATION_KEY_MARKERS
        .iter()
        .any(|marker| key.contains(marker))
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut out, "{:02x}", byte);
    }
    out
}
