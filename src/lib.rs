pub mod api;
pub mod db;
pub mod detection;
pub mod error;
pub mod models;
pub mod monitor;
pub mod parsing;
pub mod settings;
pub mod utils;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;

pub use api::{ApiTransport, HttpReply, ReqwestTransport};
pub use db::{HistoryStore, MergeOutcome};
pub use detection::DetectionConfig;
pub use error::{MonitorError, Result};
pub use models::{AnomalyScores, Credentials, FlowReading, HistoryTable, Session, ZoneRecord};
pub use monitor::FlowMonitor;
pub use parsing::RejectionPolicy;
pub use settings::{MonitorSettings, SettingsStore};

const SETTINGS_ENV: &str = "IRRIGATION_MONITOR_SETTINGS";

/// Run one refresh using settings from disk and credentials from the environment.
pub async fn run() -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    log::info!("Irrigation monitor starting up...");

    let settings_store = SettingsStore::new(settings_path())?;
    let settings = settings_store.current();
    let credentials = credentials_from_env()?;

    let transport = ReqwestTransport::new(Duration::from_secs(settings.request_timeout_secs))?;
    let monitor = FlowMonitor::open(settings, credentials, Arc::new(transport)).await?;

    let table = monitor.refresh().await?;
    let outliers = table.outliers_mad().len();
    log::info!(
        "History at {} holds {} records across {} zones ({} MAD outliers)",
        monitor.store().path().display(),
        table.len(),
        table.zone_choices().len(),
        outliers
    );
    Ok(())
}

fn settings_path() -> PathBuf {
    if let Some(path) = std::env::var_os(SETTINGS_ENV) {
        return PathBuf::from(path);
    }
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".config")
        .join("irrigation-monitor")
        .join("settings.json")
}

fn credentials_from_env() -> anyhow::Result<Credentials> {
    let read = |name: &str| {
        std::env::var(name).with_context(|| format!("environment variable {name} is not set"))
    };
    let controller_id = read("CONTROLLER_ID")?;
    let username = read("USERNAME")?;
    let password = read("PASSWORD")?;

    Ok(Credentials::new(&controller_id, &username, &password)?)
}
