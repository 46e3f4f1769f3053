//! Configuration module

use serde::Deserialize;

use crate::error::BridgeError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
}

/// Settings the host hands to the Ring bridge
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// Refresh token as entered by the user
    #[serde(default)]
    pub refreshtoken: String,
    /// Host-side adapter namespace (e.g. "ring.0")
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_refresh_interval_minutes")]
    pub refresh_interval_minutes: u64,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_camera_status_polling_seconds")]
    pub camera_status_polling_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfig {
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            refreshtoken: String::new(),
            namespace: default_namespace(),
            refresh_interval_minutes: default_refresh_interval_minutes(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            camera_status_polling_seconds: default_camera_status_polling_seconds(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            snapshot_file: default_snapshot_file(),
        }
    }
}

fn default_namespace() -> String {
    "ring.0".to_string()
}

fn default_refresh_interval_minutes() -> u64 {
    120
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_camera_status_polling_seconds() -> u64 {
    600
}

fn default_state_file() -> String {
    "ring-states.json".to_string()
}

fn default_snapshot_file() -> String {
    "ring-snapshot.json".to_string()
}

impl Config {
    pub fn load() -> Result<Self, BridgeError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("RINGBRIDGE").separator("__"))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.adapter.validate()?;
        Ok(config)
    }
}

impl AdapterConfig {
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.refresh_interval_minutes == 0 {
            return Err(BridgeError::Config(
                "refresh_interval_minutes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
