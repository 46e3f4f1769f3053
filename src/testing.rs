//! In-crate fakes for the host and the Ring client, shared by unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::config::AdapterConfig;
use crate::error::{ApiError, BridgeError};
use crate::host::{AdapterHost, StateCommon};
use crate::ring::{
    ApiConnector, ApiOptions, CameraData, DeviceData, Location, RefreshTokenUpdate, RingApi,
    RingCamera,
};

/// Ordered record of client calls across all fakes of one test
pub type CallLog = Arc<Mutex<Vec<String>>>;

fn push(log: &CallLog, entry: String) {
    log.lock().unwrap().push(entry);
}

pub fn camera(id: u64, name: &str) -> CameraData {
    CameraData {
        id,
        name: name.to_string(),
        kind: "stickup_cam".to_string(),
        description: String::new(),
        battery_level: None,
        has_light: false,
        has_siren: false,
        light_on: false,
        siren_on: false,
    }
}

/// Counts ERROR events seen while installed as the default subscriber
pub struct ErrorCounter(pub Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub fn error_counting_subscriber() -> (impl Subscriber + Send + Sync, Arc<AtomicUsize>) {
    use tracing_subscriber::layer::SubscriberExt;

    let count = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(ErrorCounter(count.clone()));
    (subscriber, count)
}

pub struct RecordingHost {
    config: AdapterConfig,
    states: Mutex<Vec<(String, StateCommon, Value)>>,
    terminations: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn new(token: &str) -> Arc<Self> {
        Self::with_config(AdapterConfig {
            refreshtoken: token.to_string(),
            ..AdapterConfig::default()
        })
    }

    pub fn with_config(config: AdapterConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            states: Mutex::new(Vec::new()),
            terminations: Mutex::new(Vec::new()),
        })
    }

    pub fn states(&self) -> Vec<(String, StateCommon, Value)> {
        self.states.lock().unwrap().clone()
    }

    /// Latest value written to `name`
    pub fn state_value(&self, name: &str) -> Option<Value> {
        self.states
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, v)| v.clone())
    }

    pub fn terminations(&self) -> Vec<String> {
        self.terminations.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdapterHost for RecordingHost {
    fn namespace(&self) -> &str {
        &self.config.namespace
    }

    fn config(&self) -> &AdapterConfig {
        &self.config
    }

    async fn upsert_state(
        &self,
        name: &str,
        common: &StateCommon,
        value: Value,
    ) -> Result<(), BridgeError> {
        self.states
            .lock()
            .unwrap()
            .push((name.to_string(), common.clone(), value));
        Ok(())
    }

    fn terminate(&self, reason: &str) {
        self.terminations.lock().unwrap().push(reason.to_string());
    }

    async fn get_refresh_token(&self) -> Result<String, BridgeError> {
        Ok(self.config.refreshtoken.clone())
    }
}

pub struct FakeCamera {
    data: Mutex<CameraData>,
    commands: Mutex<Vec<(String, bool)>>,
    fail: AtomicBool,
}

impl FakeCamera {
    pub fn new(data: CameraData) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(data),
            commands: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    pub fn fail_commands(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<(String, bool)> {
        self.commands.lock().unwrap().clone()
    }

    fn command(&self, origin: &'static str, on: bool) -> Result<(), ApiError> {
        self.commands.lock().unwrap().push((origin.to_string(), on));
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::new(origin, "camera offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl RingCamera for FakeCamera {
    fn data(&self) -> CameraData {
        self.data.lock().unwrap().clone()
    }

    async fn set_light(&self, on: bool) -> Result<(), ApiError> {
        self.command("set_light", on)?;
        self.data.lock().unwrap().light_on = on;
        Ok(())
    }

    async fn set_siren(&self, on: bool) -> Result<(), ApiError> {
        self.command("set_siren", on)?;
        self.data.lock().unwrap().siren_on = on;
        Ok(())
    }
}

pub struct FakeLocation {
    id: String,
    name: String,
    cameras: Vec<Arc<FakeCamera>>,
    log: CallLog,
    fail_devices: AtomicBool,
    drop_during_devices: AtomicBool,
    pub data_tx: broadcast::Sender<String>,
    pub connected_tx: broadcast::Sender<bool>,
}

impl FakeLocation {
    pub fn new(id: &str, name: &str, cameras: Vec<Arc<FakeCamera>>) -> Arc<Self> {
        Self::with_log(id, name, cameras, CallLog::default())
    }

    pub fn with_log(
        id: &str,
        name: &str,
        cameras: Vec<Arc<FakeCamera>>,
        log: CallLog,
    ) -> Arc<Self> {
        let (data_tx, _) = broadcast::channel(16);
        let (connected_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            id: id.to_string(),
            name: name.to_string(),
            cameras,
            log,
            fail_devices: AtomicBool::new(false),
            drop_during_devices: AtomicBool::new(false),
            data_tx,
            connected_tx,
        })
    }

    pub fn fail_devices(&self) {
        self.fail_devices.store(true, Ordering::SeqCst);
    }

    /// Report a lost connection from inside every `get_devices` call
    pub fn drop_connection_during_devices(&self) {
        self.drop_during_devices.store(true, Ordering::SeqCst);
    }

    /// Number of live subscribers on the connectivity stream
    pub fn connection_listeners(&self) -> usize {
        self.connected_tx.receiver_count()
    }
}

#[async_trait]
impl Location for FakeLocation {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn cameras(&self) -> Vec<Arc<dyn RingCamera>> {
        push(&self.log, format!("cameras:{}", self.id));
        self.cameras
            .iter()
            .map(|c| c.clone() as Arc<dyn RingCamera>)
            .collect()
    }

    async fn get_devices(&self) -> Result<Vec<DeviceData>, ApiError> {
        push(&self.log, format!("devices:{}", self.id));
        if self.drop_during_devices.load(Ordering::SeqCst) {
            let _ = self.connected_tx.send(false);
        }
        if self.fail_devices.load(Ordering::SeqCst) {
            return Err(ApiError::new("get_devices", "timeout"));
        }
        Ok(vec![DeviceData {
            id: format!("{}-hub", self.id),
            name: "Base Station".to_string(),
            device_type: "hub.redsky".to_string(),
        }])
    }

    fn on_data_update(&self) -> broadcast::Receiver<String> {
        self.data_tx.subscribe()
    }

    fn on_connected(&self) -> broadcast::Receiver<bool> {
        self.connected_tx.subscribe()
    }
}

pub struct FakeApi {
    pub session: usize,
    log: CallLog,
    locations: Vec<Arc<FakeLocation>>,
    fail_locations: bool,
    pub token_tx: broadcast::Sender<RefreshTokenUpdate>,
}

#[async_trait]
impl RingApi for FakeApi {
    fn on_refresh_token_updated(&self) -> broadcast::Receiver<RefreshTokenUpdate> {
        self.token_tx.subscribe()
    }

    fn disconnect(&self) {
        push(&self.log, format!("disconnect:{}", self.session));
    }

    async fn get_locations(&self) -> Result<Vec<Arc<dyn Location>>, ApiError> {
        push(&self.log, format!("get_locations:{}", self.session));
        if self.fail_locations {
            return Err(ApiError::new("get_locations", "503 Service Unavailable"));
        }
        Ok(self
            .locations
            .iter()
            .map(|l| l.clone() as Arc<dyn Location>)
            .collect())
    }
}

pub struct FakeConnector {
    pub log: CallLog,
    locations: Mutex<Vec<Arc<FakeLocation>>>,
    fail_locations: AtomicBool,
    sessions: Mutex<Vec<Arc<FakeApi>>>,
    options: Mutex<Vec<ApiOptions>>,
}

impl FakeConnector {
    pub fn new(log: CallLog, locations: Vec<Arc<FakeLocation>>) -> Arc<Self> {
        Arc::new(Self {
            log,
            locations: Mutex::new(locations),
            fail_locations: AtomicBool::new(false),
            sessions: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        })
    }

    /// Locations handed to sessions opened from now on
    pub fn set_locations(&self, locations: Vec<Arc<FakeLocation>>) {
        *self.locations.lock().unwrap() = locations;
    }

    pub fn fail_locations(&self, fail: bool) {
        self.fail_locations.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn session(&self, index: usize) -> Arc<FakeApi> {
        self.sessions.lock().unwrap()[index].clone()
    }

    pub fn options(&self) -> Vec<ApiOptions> {
        self.options.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl ApiConnector for FakeConnector {
    fn connect(&self, options: ApiOptions) -> Result<Arc<dyn RingApi>, ApiError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.len();
        push(&self.log, format!("connect:{}", session));
        self.options.lock().unwrap().push(options);

        let (token_tx, _) = broadcast::channel(16);
        let api = Arc::new(FakeApi {
            session,
            log: self.log.clone(),
            locations: self.locations.lock().unwrap().clone(),
            fail_locations: self.fail_locations.load(Ordering::SeqCst),
            token_tx,
        });
        sessions.push(api.clone());
        Ok(api)
    }
}
