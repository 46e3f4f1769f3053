//! Offline Ring client backed by a JSON account snapshot
//!
//! The snapshot file is re-read on every `connect`, so edits show up on the
//! next refresh cycle. Camera commands only change the in-memory copy.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::broadcast;

use super::{
    ApiConnector, ApiOptions, CameraData, DeviceData, Location, RefreshTokenUpdate, RingApi,
    RingCamera,
};
use crate::error::ApiError;

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Deserialize)]
pub struct AccountSnapshot {
    #[serde(default)]
    pub locations: Vec<LocationSnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationSnapshot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cameras: Vec<CameraData>,
    #[serde(default)]
    pub devices: Vec<DeviceData>,
}

pub struct SnapshotConnector {
    path: PathBuf,
}

impl SnapshotConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<AccountSnapshot, ApiError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            ApiError::new("connect", format!("{}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| ApiError::new("connect", e.to_string()))
    }
}

impl ApiConnector for SnapshotConnector {
    fn connect(&self, options: ApiOptions) -> Result<Arc<dyn RingApi>, ApiError> {
        if options.refresh_token.is_empty() {
            return Err(ApiError::new("connect", "refresh token required"));
        }

        let snapshot = self.load()?;
        tracing::debug!(
            "[Snapshot] Opened session with {} locations (status polling {}s)",
            snapshot.locations.len(),
            options.camera_status_polling_seconds
        );
        Ok(Arc::new(SnapshotApi::new(snapshot)))
    }
}

struct SnapshotApi {
    locations: Vec<Arc<SnapshotLocation>>,
    token_tx: broadcast::Sender<RefreshTokenUpdate>,
    connected: AtomicBool,
}

impl SnapshotApi {
    fn new(snapshot: AccountSnapshot) -> Self {
        let (token_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            locations: snapshot
                .locations
                .into_iter()
                .map(|l| Arc::new(SnapshotLocation::new(l)))
                .collect(),
            token_tx,
            connected: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl RingApi for SnapshotApi {
    fn on_refresh_token_updated(&self) -> broadcast::Receiver<RefreshTokenUpdate> {
        self.token_tx.subscribe()
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            for location in &self.locations {
                let _ = location.connected_tx.send(false);
            }
        }
    }

    async fn get_locations(&self) -> Result<Vec<Arc<dyn Location>>, ApiError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ApiError::new("get_locations", "session disconnected"));
        }

        Ok(self
            .locations
            .iter()
            .map(|l| l.clone() as Arc<dyn Location>)
            .collect())
    }
}

struct SnapshotLocation {
    id: String,
    name: String,
    devices: Vec<DeviceData>,
    cameras: Vec<Arc<SnapshotCamera>>,
    data_tx: broadcast::Sender<String>,
    connected_tx: broadcast::Sender<bool>,
}

impl SnapshotLocation {
    fn new(snapshot: LocationSnapshot) -> Self {
        let (data_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (connected_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id: snapshot.id,
            name: snapshot.name,
            devices: snapshot.devices,
            cameras: snapshot
                .cameras
                .into_iter()
                .map(|c| {
                    Arc::new(SnapshotCamera {
                        data: Mutex::new(c),
                    })
                })
                .collect(),
            data_tx,
            connected_tx,
        }
    }
}

#[async_trait]
impl Location for SnapshotLocation {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn cameras(&self) -> Vec<Arc<dyn RingCamera>> {
        self.cameras
            .iter()
            .map(|c| c.clone() as Arc<dyn RingCamera>)
            .collect()
    }

    async fn get_devices(&self) -> Result<Vec<DeviceData>, ApiError> {
        Ok(self.devices.clone())
    }

    fn on_data_update(&self) -> broadcast::Receiver<String> {
        self.data_tx.subscribe()
    }

    fn on_connected(&self) -> broadcast::Receiver<bool> {
        self.connected_tx.subscribe()
    }
}

struct SnapshotCamera {
    data: Mutex<CameraData>,
}

impl SnapshotCamera {
    fn update(
        &self,
        origin: &'static str,
        apply: impl FnOnce(&mut CameraData) -> bool,
    ) -> Result<(), ApiError> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        if apply(&mut *data) {
            Ok(())
        } else {
            Err(ApiError::new(
                origin,
                format!("camera {} does not support this command", data.id),
            ))
        }
    }
}

#[async_trait]
impl RingCamera for SnapshotCamera {
    fn data(&self) -> CameraData {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn set_light(&self, on: bool) -> Result<(), ApiError> {
        self.update("set_light", |d| {
            d.light_on = on && d.has_light;
            d.has_light
        })
    }

    async fn set_siren(&self, on: bool) -> Result<(), ApiError> {
        self.update("set_siren", |d| {
            d.siren_on = on && d.has_siren;
            d.has_siren
        })
    }
}
