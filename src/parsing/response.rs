use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::{
    api::RawFlowResponse,
    error::{MonitorError, Result},
    log_debug, log_info, log_warn,
    models::FlowReading,
};

use super::{parse_runtime_minutes, parse_zone_name, RejectionPolicy};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Deserialize)]
struct FlowEnvelope {
    data: FlowData,
}

#[derive(Debug, Deserialize)]
struct FlowData {
    controller: ControllerNode,
}

#[derive(Debug, Deserialize)]
struct ControllerNode {
    reporting: ReportingNode,
    zones: Vec<ZoneNode>,
}

#[derive(Debug, Deserialize)]
struct ReportingNode {
    #[serde(rename = "chartType")]
    chart_type: ChartTypeNode,
}

#[derive(Debug, Deserialize)]
struct ChartTypeNode {
    #[serde(default)]
    results: Option<Vec<ResultGroup>>,
}

#[derive(Debug, Deserialize)]
struct ResultGroup {
    name: String,
    #[serde(default)]
    data: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
struct DataPoint {
    x: Option<f64>,
    y: Option<f64>,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZoneNode {
    id: ZoneIdValue,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ZoneIdValue {
    Number(i64),
    Text(String),
}

impl ZoneIdValue {
    fn as_i64(&self) -> Option<i64> {
        match self {
            ZoneIdValue::Number(id) => Some(*id),
            ZoneIdValue::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// Zone display name to zone id, rebuilt from every fetch's zone list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneDirectory {
    by_name: HashMap<String, i64>,
}

impl ZoneDirectory {
    pub fn insert(&mut self, name: impl Into<String>, zone_id: i64) {
        self.by_name.insert(name.into(), zone_id);
    }

    pub fn resolve(&self, name: &str) -> Option<i64> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.by_name.iter().map(|(name, id)| (name.as_str(), *id))
    }
}

/// A reading left out of the batch, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedReading {
    pub zone: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub error: MonitorError,
}

/// Parser output: readings sorted by timestamp, the directory used to resolve ids,
/// and whatever the rejection policy dropped.
#[derive(Debug, Clone, Default)]
pub struct ParsedFlowData {
    pub readings: Vec<FlowReading>,
    pub directory: ZoneDirectory,
    pub rejected: Vec<RejectedReading>,
}

pub fn parse_flow_response(
    raw: &RawFlowResponse,
    policy: RejectionPolicy,
) -> Result<ParsedFlowData> {
    let envelope = FlowEnvelope::deserialize(raw.as_value()).map_err(|err| {
        MonitorError::Fetch(format!("flow response has unexpected structure: {err}"))
    })?;
    let controller = envelope.data.controller;

    let directory = build_directory(&controller.zones);
    let mut parsed = ParsedFlowData {
        directory,
        ..ParsedFlowData::default()
    };

    for group in controller.reporting.chart_type.results.unwrap_or_default() {
        parse_group(&group, &mut parsed, policy)?;
    }

    parsed.readings.sort_by_key(|reading| reading.timestamp);

    log_info!(
        "Parsed {} readings across {} zones ({} rejected)",
        parsed.readings.len(),
        parsed.directory.len(),
        parsed.rejected.len()
    );
    Ok(parsed)
}

fn build_directory(zones: &[ZoneNode]) -> ZoneDirectory {
    let mut directory = ZoneDirectory::default();
    for zone in zones {
        let Some(zone_id) = zone.id.as_i64() else {
            log_warn!("Skipping zone {:?}: id {:?} is not an integer", zone.name, zone.id);
            continue;
        };
        match parse_zone_name(&zone.name) {
            Ok((_, name)) => {
                log_debug!("Zone {name:?} resolves to id {zone_id}");
                directory.insert(name, zone_id);
            }
            Err(err) => log_warn!("Skipping zone {:?} in directory: {err}", zone.name),
        }
    }
    directory
}

fn parse_group(
    group: &ResultGroup,
    parsed: &mut ParsedFlowData,
    policy: RejectionPolicy,
) -> Result<()> {
    let resolved = parse_zone_name(&group.name).and_then(|(zone_number, zone_name)| {
        let zone_id = parsed.directory.resolve(&zone_name).ok_or_else(|| {
            MonitorError::MalformedReading(format!(
                "zone {zone_name:?} is not in the controller's zone list"
            ))
        })?;
        Ok((zone_id, zone_number, zone_name))
    });

    let (zone_id, zone_number, zone_name) = match resolved {
        Ok(zone) => zone,
        Err(error) => {
            // Every point in the group is unattributable.
            for point in &group.data {
                let timestamp = point.x.and_then(timestamp_from_millis);
                reject(parsed, policy, &group.name, timestamp, error.clone())?;
            }
            return Ok(());
        }
    };

    for point in &group.data {
        let timestamp = point.x.and_then(timestamp_from_millis);
        match build_reading(point, timestamp, zone_id, zone_number, &zone_name) {
            Ok(reading) => parsed.readings.push(reading),
            Err(error) => reject(parsed, policy, &group.name, timestamp, error)?,
        }
    }
    Ok(())
}

fn build_reading(
    point: &DataPoint,
    timestamp: Option<DateTime<Utc>>,
    zone_id: i64,
    zone_number: i64,
    zone_name: &str,
) -> Result<FlowReading> {
    let timestamp = timestamp.ok_or_else(|| {
        MonitorError::MalformedReading(format!(
            "reading for zone {zone_name:?} has missing or invalid x {:?}",
            point.x
        ))
    })?;
    let gallons_total = point.y.filter(|y| y.is_finite()).ok_or_else(|| {
        MonitorError::MalformedReading(format!(
            "reading for zone {zone_name:?} at {timestamp} has missing or invalid y"
        ))
    })?;
    let note = point.note.clone().unwrap_or_default();
    let runtime_minutes = parse_runtime_minutes(&note)?;
    let gallons_per_minute = gallons_total / runtime_minutes;
    if !gallons_per_minute.is_finite() {
        return Err(MonitorError::MalformedReading(format!(
            "reading for zone {zone_name:?} at {timestamp} has out-of-range flow \
             ({gallons_total} gallons over {runtime_minutes} minutes)"
        )));
    }

    Ok(FlowReading {
        zone_id,
        zone_number,
        zone_name: zone_name.to_string(),
        timestamp,
        gallons_per_minute,
        gallons_total,
        runtime_minutes,
        note,
    })
}

fn reject(
    parsed: &mut ParsedFlowData,
    policy: RejectionPolicy,
    zone: &str,
    timestamp: Option<DateTime<Utc>>,
    error: MonitorError,
) -> Result<()> {
    match policy {
        RejectionPolicy::RejectBatch => Err(error),
        RejectionPolicy::DropRecord => {
            log_warn!("Dropping reading for {zone:?} at {timestamp:?}: {error}");
            parsed.rejected.push(RejectedReading {
                zone: zone.to_string(),
                timestamp,
                error,
            });
            Ok(())
        }
    }
}

fn timestamp_from_millis(x: f64) -> Option<DateTime<Utc>> {
    if !x.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(x.round() as i64).single()
}
