pub mod zone_records;
