//! Runtime extraction from the free-text note attached to every flow reading.
//!
//! Notes look like `"Run time: 5 minutes"`; only the closed set of units below is accepted.

use crate::error::{MonitorError, Result};

const RUNTIME_MARKER: &str = "Run time: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuntimeUnit {
    Seconds,
    Minutes,
    Hours,
}

impl RuntimeUnit {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "second" | "seconds" => Some(RuntimeUnit::Seconds),
            "minute" | "minutes" => Some(RuntimeUnit::Minutes),
            "hour" | "hours" => Some(RuntimeUnit::Hours),
            _ => None,
        }
    }

    fn to_minutes(self, value: f64) -> f64 {
        match self {
            RuntimeUnit::Seconds => value / 60.0,
            RuntimeUnit::Minutes => value,
            RuntimeUnit::Hours => value * 60.0,
        }
    }
}

/// Runtime in minutes; never returns zero.
pub fn parse_runtime_minutes(note: &str) -> Result<f64> {
    let unparsable = || MonitorError::UnparsableNote {
        note: note.to_string(),
    };

    let (_, rest) = note.split_once(RUNTIME_MARKER).ok_or_else(unparsable)?;
    let mut tokens = rest.split_whitespace();

    let value: f64 = tokens
        .next()
        .and_then(|token| token.parse().ok())
        .ok_or_else(unparsable)?;
    let unit = tokens
        .next()
        .map(|token| token.trim_end_matches(|c: char| c.is_ascii_punctuation()))
        .and_then(RuntimeUnit::from_token)
        .ok_or_else(unparsable)?;

    let minutes = unit.to_minutes(value);
    if !minutes.is_finite() || minutes <= 0.0 {
        return Err(unparsable());
    }
    Ok(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(note: &str) -> f64 {
        parse_runtime_minutes(note).unwrap()
    }

    #[test]
    fn recognised_units_convert_to_minutes() {
        assert_eq!(minutes("Run time: 5 minutes"), 5.0);
        assert_eq!(minutes("Run time: 1 minute"), 1.0);
        assert_eq!(minutes("Run time: 2 hours"), 120.0);
        assert_eq!(minutes("Run time: 1 hour"), 60.0);
        assert_eq!(minutes("Run time: 30 seconds"), 0.5);
        assert_eq!(minutes("Run time: 1 second"), 1.0 / 60.0);
    }

    #[test]
    fn marker_may_follow_other_text() {
        assert_eq!(minutes("Watering cycle 2\nRun time: 12 minutes"), 12.0);
        assert_eq!(minutes("Run time: 1.5 hours, manual start"), 90.0);
        assert_eq!(minutes("Run time: 45 Seconds."), 0.75);
    }

    #[test]
    fn unknown_unit_is_rejected_not_zeroed() {
        let err = parse_runtime_minutes("Run time: 3 fortnights").unwrap_err();
        assert_eq!(
            err,
            MonitorError::UnparsableNote {
                note: "Run time: 3 fortnights".into()
            }
        );
    }

    #[test]
    fn missing_parts_are_rejected() {
        for note in [
            "",
            "Manual run",
            "Run time: ",
            "Run time: minutes",
            "Run time: 5",
            "Run time:5 minutes",
        ] {
            assert!(
                matches!(
                    parse_runtime_minutes(note),
                    Err(MonitorError::UnparsableNote { .. })
                ),
                "expected rejection for {note:?}"
            );
        }
    }

    #[test]
    fn zero_or_negative_runtime_is_rejected() {
        assert!(parse_runtime_minutes("Run time: 0 minutes").is_err());
        assert!(parse_runtime_minutes("Run time: -4 minutes").is_err());
        assert!(parse_runtime_minutes("Run time: NaN minutes").is_err());
    }
}
