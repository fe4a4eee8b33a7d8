use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

/// Outlier thresholds; a score strictly greater than its threshold is flagged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Standard z-score threshold.
    pub std_threshold: f64,

    /// Median-absolute-deviation z-score threshold.
    pub mad_threshold: f64,
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("std_threshold", self.std_threshold),
            ("mad_threshold", self.mad_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(MonitorError::Config(format!(
                    "{name} must be a positive finite number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            std_threshold: 2.0,
            mad_threshold: 10.0,
        }
    }
}
