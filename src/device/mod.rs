//! Device mirror: one locally owned representation per Ring camera
//!
//! A mirror publishes the camera's info and switch states into the host state
//! tree under `Device_<id>` and turns writes on its switches into camera
//! commands.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::host::{AdapterHost, StateCommon, StateType};
use crate::ring::{CameraData, Location, RingCamera};

pub const CHANNEL_INFO: &str = "info";
pub const CHANNEL_LIGHT: &str = "light";
pub const CHANNEL_SIREN: &str = "siren";
pub const STATE_SWITCH: &str = "switch";

/// Registry key: adapter namespace plus Ring device id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey {
    namespace: String,
    device_id: String,
}

impl DeviceKey {
    pub fn new(namespace: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            device_id: device_id.into(),
        }
    }

    /// Folder of the device in the host state tree
    pub fn folder(&self) -> String {
        format!("Device_{}", self.device_id)
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.folder())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Switch {
    Light,
    Siren,
}

impl Switch {
    fn parse(channel_id: &str, state_id: &str) -> Option<Self> {
        match (channel_id, state_id) {
            (CHANNEL_LIGHT, STATE_SWITCH) => Some(Self::Light),
            (CHANNEL_SIREN, STATE_SWITCH) => Some(Self::Siren),
            _ => None,
        }
    }

    fn channel(self) -> &'static str {
        match self {
            Self::Light => CHANNEL_LIGHT,
            Self::Siren => CHANNEL_SIREN,
        }
    }

    fn common(self) -> StateCommon {
        match self {
            Self::Light => StateCommon::writable("Light", StateType::Boolean, "switch.light"),
            Self::Siren => StateCommon::writable("Siren", StateType::Boolean, "switch"),
        }
    }
}

pub struct OwnRingDevice {
    key: DeviceKey,
    location_id: String,
    camera: Arc<dyn RingCamera>,
    host: Arc<dyn AdapterHost>,
}

impl OwnRingDevice {
    /// Stable identity of a camera within an adapter instance
    pub fn full_id(camera: &dyn RingCamera, namespace: &str) -> DeviceKey {
        DeviceKey::new(namespace, camera.data().id.to_string())
    }

    pub async fn new(
        camera: Arc<dyn RingCamera>,
        location: &dyn Location,
        host: Arc<dyn AdapterHost>,
    ) -> Self {
        let key = Self::full_id(camera.as_ref(), host.namespace());
        let data = camera.data();
        tracing::debug!(
            "[OwnRingDevice] Create {} \"{}\" ({}) in location {}",
            key,
            data.name,
            data.kind,
            location.name()
        );

        let device = Self {
            key,
            location_id: location.id().to_string(),
            camera,
            host,
        };
        device.publish(&data).await;
        device
    }

    /// Adopt the camera object of the latest refresh and republish its states
    pub async fn update_by_device(&mut self, camera: Arc<dyn RingCamera>) {
        self.camera = camera;
        let data = self.camera.data();
        tracing::trace!("[OwnRingDevice] Update {}", self.key);
        self.publish(&data).await;
    }

    pub async fn process_user_input(&self, channel_id: &str, state_id: &str, value: &Value) {
        let Some(switch) = Switch::parse(channel_id, state_id) else {
            tracing::warn!(
                "[OwnRingDevice] {} ignores input on unknown state {}.{}",
                self.key,
                channel_id,
                state_id
            );
            return;
        };

        let Some(on) = value.as_bool() else {
            tracing::warn!(
                "[OwnRingDevice] {} expected a boolean for {}.{}, got {}",
                self.key,
                channel_id,
                state_id,
                value
            );
            return;
        };

        tracing::info!(
            "[OwnRingDevice] {} switching {} {}",
            self.key,
            switch.channel(),
            if on { "on" } else { "off" }
        );

        let result = match switch {
            Switch::Light => self.camera.set_light(on).await,
            Switch::Siren => self.camera.set_siren(on).await,
        };

        match result {
            Ok(()) => {
                self.set_state(
                    &format!("{}.{}", switch.channel(), STATE_SWITCH),
                    &switch.common(),
                    Value::Bool(on),
                )
                .await;
            }
            Err(e) => {
                tracing::error!("[OwnRingDevice] {} command failed: {}", self.key, e);
            }
        }
    }

    async fn publish(&self, data: &CameraData) {
        let info = [
            (
                "id",
                StateCommon::read_only("Device ID", StateType::Number, "value"),
                Value::from(data.id),
            ),
            (
                "name",
                StateCommon::read_only("Name", StateType::String, "info.name"),
                Value::from(data.name.as_str()),
            ),
            (
                "kind",
                StateCommon::read_only("Kind", StateType::String, "text"),
                Value::from(data.kind.as_str()),
            ),
            (
                "description",
                StateCommon::read_only("Description", StateType::String, "text"),
                Value::from(data.description.as_str()),
            ),
            (
                "location_id",
                StateCommon::read_only("Location ID", StateType::String, "text"),
                Value::from(self.location_id.as_str()),
            ),
            (
                "battery_percentage",
                StateCommon::read_only("Battery", StateType::Number, "value.battery")
                    .with_unit("%"),
                data.battery_level.map(Value::from).unwrap_or(Value::Null),
            ),
            (
                "last_update",
                StateCommon::read_only("Last Update", StateType::Number, "value.time"),
                Value::from(Utc::now().timestamp_millis()),
            ),
        ];

        for (state, common, value) in info {
            self.set_state(&format!("{}.{}", CHANNEL_INFO, state), &common, value)
                .await;
        }

        if data.has_light {
            let switch = Switch::Light;
            self.set_state(
                &format!("{}.{}", switch.channel(), STATE_SWITCH),
                &switch.common(),
                Value::Bool(data.light_on),
            )
            .await;
        }

        if data.has_siren {
            let switch = Switch::Siren;
            self.set_state(
                &format!("{}.{}", switch.channel(), STATE_SWITCH),
                &switch.common(),
                Value::Bool(data.siren_on),
            )
            .await;
        }
    }

    async fn set_state(&self, suffix: &str, common: &StateCommon, value: Value) {
        let name = format!("{}.{}", self.key.folder(), suffix);
        if let Err(e) = self.host.upsert_state(&name, common, value).await {
            tracing::warn!("[OwnRingDevice] Failed to write {}: {}", name, e);
        }
    }
}
