//! Ring cloud client seam
//!
//! The bridge never talks to the Ring cloud itself. Everything it needs from a
//! client library is expressed by the traits below.
//!
//! - `snapshot`: offline client replaying a JSON snapshot of an account

pub mod snapshot;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ApiError;

pub use snapshot::SnapshotConnector;

/// Options a session is opened with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiOptions {
    pub refresh_token: String,
    pub camera_status_polling_seconds: u64,
}

/// Published by the client whenever Ring issues a new refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenUpdate {
    pub new_refresh_token: String,
}

/// Raw camera data as reported by Ring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraData {
    pub id: u64,
    pub name: String,
    /// Ring device kind, e.g. "doorbell_v3" or "stickup_cam"
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub battery_level: Option<u8>,
    #[serde(default)]
    pub has_light: bool,
    #[serde(default)]
    pub has_siren: bool,
    #[serde(default)]
    pub light_on: bool,
    #[serde(default)]
    pub siren_on: bool,
}

/// Non-camera device of a location (base station, sensors, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceData {
    pub id: String,
    pub name: String,
    #[serde(rename = "deviceType")]
    pub device_type: String,
}

#[async_trait]
pub trait RingCamera: Send + Sync {
    fn data(&self) -> CameraData;

    async fn set_light(&self, on: bool) -> Result<(), ApiError>;

    async fn set_siren(&self, on: bool) -> Result<(), ApiError>;
}

#[async_trait]
pub trait Location: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn cameras(&self) -> Vec<Arc<dyn RingCamera>>;

    async fn get_devices(&self) -> Result<Vec<DeviceData>, ApiError>;

    /// Raw data update messages pushed by Ring
    fn on_data_update(&self) -> broadcast::Receiver<String>;

    /// Connectivity transitions of the location's socket
    fn on_connected(&self) -> broadcast::Receiver<bool>;
}

impl fmt::Debug for dyn Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// A live, authenticated session
#[async_trait]
pub trait RingApi: Send + Sync {
    fn on_refresh_token_updated(&self) -> broadcast::Receiver<RefreshTokenUpdate>;

    fn disconnect(&self);

    async fn get_locations(&self) -> Result<Vec<Arc<dyn Location>>, ApiError>;
}

/// Opens sessions; one call per refresh cycle
pub trait ApiConnector: Send + Sync {
    fn connect(&self, options: ApiOptions) -> Result<Arc<dyn RingApi>, ApiError>;
}
