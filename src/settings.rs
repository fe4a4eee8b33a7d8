use std::{
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{detection::DetectionConfig, error::MonitorError, parsing::RejectionPolicy};

const DEFAULT_ACCESS_TOKEN_URL: &str = "https://app.hydrawise.com/api/v2/oauth/access-token";
const DEFAULT_GRAPH_URL: &str = "https://app.hydrawise.com/api/v2/graph?appVersion=hydrawise-web-client";
const DEFAULT_CLIENT_ID: &str = "hydrawise_app";
const DEFAULT_CLIENT_SECRET: &str = "zn3CrjglwNV1";
const DEFAULT_SCOPE: &str = "all";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Remote controller API endpoints and OAuth client identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub access_token_url: String,
    pub graph_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            access_token_url: DEFAULT_ACCESS_TOKEN_URL.into(),
            graph_url: DEFAULT_GRAPH_URL.into(),
            client_id: DEFAULT_CLIENT_ID.into(),
            client_secret: DEFAULT_CLIENT_SECRET.into(),
            scope: DEFAULT_SCOPE.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub api: ApiSettings,
    pub detection: DetectionConfig,
    pub history_path: PathBuf,
    pub rejection_policy: RejectionPolicy,
    pub request_timeout_secs: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            detection: DetectionConfig::default(),
            history_path: default_history_path(),
            rejection_policy: RejectionPolicy::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl MonitorSettings {
    pub fn validate(&self) -> std::result::Result<(), MonitorError> {
        self.detection.validate()?;

        if self.api.access_token_url.trim().is_empty() || self.api.graph_url.trim().is_empty() {
            return Err(MonitorError::Config("API URLs must not be empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(MonitorError::Config(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.history_path.file_name().is_none() {
            return Err(MonitorError::Config(format!(
                "history_path {} does not name a file",
                self.history_path.display()
            )));
        }
        Ok(())
    }
}

fn default_history_path() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join("Documents")
        .join("hydrawise_monitor")
        .join("history.sqlite3")
}

/// Settings backed by a JSON file; missing keys take their defaults.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<MonitorSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings in {}", path.display()))?
        } else {
            MonitorSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> MonitorSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update<F>(&self, change: F) -> Result<MonitorSettings>
    where
        F: FnOnce(&mut MonitorSettings),
    {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        change(&mut next);
        next.validate()?;
        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    fn persist(&self, data: &MonitorSettings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
