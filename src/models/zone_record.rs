use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One flow reading for one zone, before anomaly scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowReading {
    pub zone_id: i64,
    pub zone_number: i64,
    pub zone_name: String,
    pub timestamp: DateTime<Utc>,
    pub gallons_per_minute: f64,
    pub gallons_total: f64,
    pub runtime_minutes: f64,
    pub note: String,
}

impl FlowReading {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            zone_id: self.zone_id,
            zone_number: self.zone_number,
            timestamp: self.timestamp,
        }
    }
}

/// Outlier scores for a reading, relative to the batch it was scored in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyScores {
    /// `None` when the zone's standard deviation is undefined or zero.
    pub std_z_score: Option<f64>,
    pub is_outlier_std: bool,
    pub mad_z_score: f64,
    pub is_outlier_mad: bool,
}

/// A scored reading, the row type of the history table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZoneRecord {
    #[serde(flatten)]
    pub reading: FlowReading,
    #[serde(flatten)]
    pub scores: AnomalyScores,
}

impl ZoneRecord {
    pub fn new(reading: FlowReading, scores: AnomalyScores) -> Self {
        Self { reading, scores }
    }

    pub fn key(&self) -> RecordKey {
        self.reading.key()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.reading.timestamp
    }

    pub fn gallons_per_minute(&self) -> f64 {
        self.reading.gallons_per_minute
    }

    pub fn into_reading(self) -> FlowReading {
        self.reading
    }
}

/// Composite identity of a stored row; at most one row per key is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub zone_id: i64,
    pub zone_number: i64,
    pub timestamp: DateTime<Utc>,
}
