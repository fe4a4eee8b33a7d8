//! Per-zone outlier scoring.
//!
//! Scores always describe the batch passed in: statistics are computed per zone id over that
//! batch only, then every reading is scored against its zone's statistics.

pub mod config;
pub mod scoring;
pub mod stats;

pub use config::DetectionConfig;
pub use scoring::{score_reading, zone_statistics, ZoneStats};

use crate::{
    log_info,
    models::{FlowReading, ZoneRecord},
};

const ENABLE_LOGS: bool = true;

/// Score a freshly parsed batch. Output order follows input order.
pub fn detect(readings: Vec<FlowReading>, config: &DetectionConfig) -> Vec<ZoneRecord> {
    let records = scoring::score_batch(readings, config);

    let std_count = records.iter().filter(|r| r.scores.is_outlier_std).count();
    let mad_count = records.iter().filter(|r| r.scores.is_outlier_mad).count();
    log_info!(
        "Scored {} readings: {} std outliers, {} MAD outliers",
        records.len(),
        std_count,
        mad_count
    );

    records
}

/// Recompute scores over an existing table, discarding the scores it carried.
pub fn rescore(records: Vec<ZoneRecord>, config: &DetectionConfig) -> Vec<ZoneRecord> {
    let readings = records.into_iter().map(ZoneRecord::into_reading).collect();
    detect(readings, config)
}
