use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row, Transaction};

use crate::{
    db::helpers::{format_timestamp, parse_datetime, parse_flag},
    models::{AnomalyScores, FlowReading, ZoneRecord},
};

fn row_to_record(row: &Row) -> Result<ZoneRecord> {
    let timestamp: String = row.get("timestamp")?;
    let is_outlier_std: i64 = row.get("is_outlier_std")?;
    let is_outlier_mad: i64 = row.get("is_outlier_mad")?;

    Ok(ZoneRecord::new(
        FlowReading {
            zone_id: row.get("zone_id")?,
            zone_number: row.get("zone_number")?,
            zone_name: row.get("zone_name")?,
            timestamp: parse_datetime(&timestamp, "timestamp")?,
            gallons_per_minute: row.get("gallons_per_minute")?,
            gallons_total: row.get("gallons_total")?,
            runtime_minutes: row.get("runtime_minutes")?,
            note: row.get("note")?,
        },
        AnomalyScores {
            std_z_score: row.get("std_z_score")?,
            is_outlier_std: parse_flag(is_outlier_std, "is_outlier_std")?,
            mad_z_score: row.get("mad_z_score")?,
            is_outlier_mad: parse_flag(is_outlier_mad, "is_outlier_mad")?,
        },
    ))
}

/// Load every stored record, oldest first; ties keep insertion order.
pub fn load_records(conn: &Connection) -> Result<Vec<ZoneRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT
                zone_id,
                zone_number,
                zone_name,
                timestamp,
                gallons_per_minute,
                gallons_total,
                runtime_minutes,
                note,
                std_z_score,
                is_outlier_std,
                mad_z_score,
                is_outlier_mad
            FROM zone_records
            ORDER BY timestamp ASC, rowid ASC",
        )
        .context("failed to prepare zone_records query")?;

    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(row_to_record(row)?);
    }
    Ok(records)
}

/// Insert records whose keys are already unique.
pub fn insert_records(tx: &Transaction<'_>, records: &[ZoneRecord]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO zone_records (
            zone_id,
            zone_number,
            zone_name,
            timestamp,
            gallons_per_minute,
            gallons_total,
            runtime_minutes,
            note,
            std_z_score,
            is_outlier_std,
            mad_z_score,
            is_outlier_mad
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )?;

    for record in records {
        let reading = &record.reading;
        let scores = &record.scores;
        stmt.execute(params![
            reading.zone_id,
            reading.zone_number,
            reading.zone_name,
            format_timestamp(&reading.timestamp),
            reading.gallons_per_minute,
            reading.gallons_total,
            reading.runtime_minutes,
            reading.note,
            scores.std_z_score,
            scores.is_outlier_std,
            scores.mad_z_score,
            scores.is_outlier_mad,
        ])
        .with_context(|| {
            format!(
                "failed to insert record for zone {} at {}",
                reading.zone_id, reading.timestamp
            )
        })?;
    }
    Ok(())
}
