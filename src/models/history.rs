use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

use super::ZoneRecord;

/// Immutable snapshot of the accumulated history, ordered by timestamp ascending.
///
/// Clones share the underlying rows, so handing a snapshot to a reader is cheap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryTable {
    records: Arc<Vec<ZoneRecord>>,
}

impl HistoryTable {
    pub fn new(mut records: Vec<ZoneRecord>) -> Self {
        records.sort_by_key(|record| record.timestamp());
        Self {
            records: Arc::new(records),
        }
    }

    pub fn records(&self) -> &[ZoneRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ZoneRecord> {
        self.records.as_ref().clone()
    }

    /// Distinct `(zone_number, zone_name)` pairs, sorted by number then name.
    pub fn zone_choices(&self) -> Vec<(i64, String)> {
        let mut seen = HashSet::new();
        let mut choices: Vec<(i64, String)> = self
            .records
            .iter()
            .filter(|record| {
                seen.insert((record.reading.zone_number, record.reading.zone_name.as_str()))
            })
            .map(|record| (record.reading.zone_number, record.reading.zone_name.clone()))
            .collect();
        choices.sort();
        choices
    }

    pub fn for_zone(&self, zone_number: i64) -> Vec<&ZoneRecord> {
        self.records
            .iter()
            .filter(|record| record.reading.zone_number == zone_number)
            .collect()
    }

    /// Records whose UTC timestamp falls on or between the two dates.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Vec<&ZoneRecord> {
        let lower = Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN));
        let upper = end
            .succ_opt()
            .map(|next| Utc.from_utc_datetime(&next.and_time(NaiveTime::MIN)));

        self.records
            .iter()
            .filter(|record| {
                let ts = record.timestamp();
                ts >= lower && upper.map_or(true, |upper| ts < upper)
            })
            .collect()
    }

    pub fn outliers_mad(&self) -> Vec<&ZoneRecord> {
        self.records
            .iter()
            .filter(|record| record.scores.is_outlier_mad)
            .collect()
    }

    /// Sum of gallons-per-minute across all zones for each UTC date.
    pub fn daily_gpm_totals(&self) -> Vec<(NaiveDate, f64)> {
        let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for record in self.records.iter() {
            *totals.entry(record.timestamp().date_naive()).or_insert(0.0) +=
                record.gallons_per_minute();
        }
        totals.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyScores, FlowReading};
    use chrono::{DateTime, Utc};

    fn record(zone_number: i64, name: &str, ts: &str, gpm: f64, mad_outlier: bool) -> ZoneRecord {
        let timestamp = DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc);
        ZoneRecord::new(
            FlowReading {
                zone_id: zone_number * 100,
                zone_number,
                zone_name: name.to_string(),
                timestamp,
                gallons_per_minute: gpm,
                gallons_total: gpm * 10.0,
                runtime_minutes: 10.0,
                note: "Run time: 10 minutes".to_string(),
            },
            AnomalyScores {
                std_z_score: None,
                is_outlier_std: false,
                mad_z_score: 0.0,
                is_outlier_mad: mad_outlier,
            },
        )
    }

    fn table() -> HistoryTable {
        HistoryTable::new(vec![
            record(2, "Back Beds", "2024-05-02T06:00:00Z", 2.0, false),
            record(1, "Front Lawn", "2024-05-01T06:00:00Z", 4.0, false),
            record(1, "Front Lawn", "2024-05-02T05:00:00Z", 5.0, true),
            record(2, "Back Beds", "2024-05-03T23:59:59Z", 1.5, false),
        ])
    }

    #[test]
    fn new_orders_by_timestamp() {
        let table = table();
        let stamps: Vec<String> = table
            .records()
            .iter()
            .map(|r| r.timestamp().to_rfc3339())
            .collect();
        assert_eq!(
            stamps,
            vec![
                "2024-05-01T06:00:00+00:00",
                "2024-05-02T05:00:00+00:00",
                "2024-05-02T06:00:00+00:00",
                "2024-05-03T23:59:59+00:00",
            ]
        );
    }

    #[test]
    fn zone_choices_are_distinct_and_sorted() {
        assert_eq!(
            table().zone_choices(),
            vec![(1, "Front Lawn".to_string()), (2, "Back Beds".to_string())]
        );
    }

    #[test]
    fn between_is_inclusive_of_both_dates() {
        let table = table();
        let start = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        assert_eq!(table.between(start, end).len(), 3);
        assert_eq!(table.between(start, start).len(), 2);
    }

    #[test]
    fn daily_totals_sum_gpm_per_date() {
        let totals = table().daily_gpm_totals();
        assert_eq!(totals.len(), 3);
        assert_eq!(totals[1], (NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(), 7.0));
    }

    #[test]
    fn zone_and_outlier_filters() {
        let table = table();
        assert_eq!(table.for_zone(2).len(), 2);
        let outliers = table.outliers_mad();
        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers[0].gallons_per_minute(), 5.0);
    }
}
