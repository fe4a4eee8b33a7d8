use crate::error::{MonitorError, Result};

const NUMBER_MARKER: &str = "# ";

/// Split a display name such as `"Zone # 3 Front Lawn"` into `(3, "Front Lawn")`.
///
/// An empty number (`"Zone #  Drip"`) maps to zone 0; upstream data does this occasionally.
pub fn parse_zone_name(raw: &str) -> Result<(i64, String)> {
    let (_, remainder) = raw.split_once(NUMBER_MARKER).ok_or_else(|| {
        MonitorError::MalformedReading(format!("zone name {raw:?} has no \"# \" marker"))
    })?;

    let (number, name) = remainder.split_once(' ').unwrap_or((remainder, ""));
    let number = number.trim();
    let zone_number = if number.is_empty() {
        0
    } else {
        number.parse::<i64>().map_err(|_| {
            MonitorError::MalformedReading(format!(
                "zone name {raw:?} has non-numeric zone number {number:?}"
            ))
        })?
    };

    Ok((zone_number, name.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_number_and_name() {
        assert_eq!(
            parse_zone_name("Zone # 3 Front Lawn").unwrap(),
            (3, "Front Lawn".to_string())
        );
        assert_eq!(
            parse_zone_name("Backyard # 12 Drip  Line ").unwrap(),
            (12, "Drip  Line".to_string())
        );
    }

    #[test]
    fn empty_number_falls_back_to_zero() {
        assert_eq!(parse_zone_name("Zone #  Drip").unwrap(), (0, "Drip".to_string()));
    }

    #[test]
    fn number_without_name() {
        assert_eq!(parse_zone_name("Zone # 7").unwrap(), (7, String::new()));
    }

    #[test]
    fn malformed_names_are_errors() {
        assert!(matches!(
            parse_zone_name("Front Lawn"),
            Err(MonitorError::MalformedReading(_))
        ));
        assert!(matches!(
            parse_zone_name("Zone # A Front Lawn"),
            Err(MonitorError::MalformedReading(_))
        ));
    }
}
