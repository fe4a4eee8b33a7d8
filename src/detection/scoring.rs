use std::collections::HashMap;

use crate::models::{AnomalyScores, FlowReading, ZoneRecord};

use super::{config::DetectionConfig, stats};

/// Gallons-per-minute statistics for one zone within one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: Option<f64>,
    pub mad: f64,
}

impl ZoneStats {
    fn from_values(values: &[f64]) -> Option<Self> {
        let mean = stats::mean(values)?;
        let median = stats::median(values)?;
        let mad = stats::median_absolute_deviation(values, median)?;
        Some(Self {
            count: values.len(),
            mean,
            median,
            std_dev: stats::sample_std_dev(values),
            mad,
        })
    }

    /// Undefined when the deviation is missing or zero.
    pub fn std_z_score(&self, gpm: f64) -> Option<f64> {
        self.std_dev
            .filter(|sd| *sd > 0.0)
            .map(|sd| (gpm - self.mean) / sd)
    }

    /// Zero when the zone has no spread at all.
    pub fn mad_z_score(&self, gpm: f64) -> f64 {
        if self.mad == 0.0 {
            0.0
        } else {
            (gpm - self.median) / self.mad
        }
    }
}

/// First pass: per-zone statistics keyed by zone id.
pub fn zone_statistics(readings: &[FlowReading]) -> HashMap<i64, ZoneStats> {
    let mut grouped: HashMap<i64, Vec<f64>> = HashMap::new();
    for reading in readings {
        grouped
            .entry(reading.zone_id)
            .or_default()
            .push(reading.gallons_per_minute);
    }

    grouped
        .into_iter()
        .filter_map(|(zone_id, values)| ZoneStats::from_values(&values).map(|s| (zone_id, s)))
        .collect()
}

/// Second pass: score one reading against its zone's precomputed statistics.
pub fn score_reading(
    reading: &FlowReading,
    zone: &ZoneStats,
    config: &DetectionConfig,
) -> AnomalyScores {
    let gpm = reading.gallons_per_minute;
    let std_z_score = zone.std_z_score(gpm);
    let mad_z_score = zone.mad_z_score(gpm);

    AnomalyScores {
        std_z_score,
        is_outlier_std: std_z_score.map_or(false, |z| z > config.std_threshold),
        mad_z_score,
        is_outlier_mad: mad_z_score > config.mad_threshold,
    }
}

pub(crate) fn score_batch(readings: Vec<FlowReading>, config: &DetectionConfig) -> Vec<ZoneRecord> {
    let statistics = zone_statistics(&readings);

    readings
        .into_iter()
        .filter_map(|reading| {
            let zone = statistics.get(&reading.zone_id)?;
            let scores = score_reading(&reading, zone, config);
            Some(ZoneRecord::new(reading, scores))
        })
        .collect()
}
