//! RingManager: Ring session lifecycle, device registry and input routing
//!
//! Keeps exactly one session to the Ring cloud, rebuilds it on every refresh
//! (periodic or after a location reports a lost connection) and mirrors every
//! camera it finds into the host state tree.

mod scheduler;

use std::backtrace::Backtrace;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::Value;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::device::{DeviceKey, OwnRingDevice};
use crate::error::{ApiError, BridgeError};
use crate::host::{
    common_new_token, common_old_token, AdapterHost, NEXT_REFRESH_TOKEN_STATE,
    OLD_REFRESH_TOKEN_STATE,
};
use crate::ring::{ApiConnector, ApiOptions, Location, RefreshTokenUpdate, RingApi, RingCamera};

pub use scheduler::RefreshScheduler;

/// Shortest refresh token that is worth sending to Ring
pub const MIN_REFRESH_TOKEN_LEN: usize = 10;

const NO_LOCATIONS_REASON: &str = "We couldn't find any locations in your Ring Account";

/// Live session plus the task listening for its token rotations
struct Session {
    api: Arc<dyn RingApi>,
    token_watcher: JoinHandle<()>,
}

impl Session {
    fn close(self) {
        self.token_watcher.abort();
        self.api.disconnect();
    }
}

/// Event streams of one location, subscribed before the location is processed
struct LocationEvents {
    name: String,
    updates: broadcast::Receiver<String>,
    connectivity: broadcast::Receiver<bool>,
}

impl LocationEvents {
    fn subscribe(location: &dyn Location) -> Self {
        Self {
            name: location.name().to_string(),
            updates: location.on_data_update(),
            connectivity: location.on_connected(),
        }
    }

    /// Drop connectivity changes buffered so far
    fn discard_connectivity(&mut self) {
        loop {
            match self.connectivity.try_recv() {
                Ok(connected) => tracing::debug!(
                    "[RingManager] Ignoring Connection Status Change to {} of Location {} during refresh",
                    connected,
                    self.name
                ),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}

/// Holds the `refreshing` flag up for the lifetime of one refresh pass
struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct RingManager {
    host: Arc<dyn AdapterHost>,
    connector: Arc<dyn ApiConnector>,
    session: Mutex<Option<Session>>,
    locations: RwLock<Vec<Arc<dyn Location>>>,
    location_watchers: StdMutex<Vec<JoinHandle<()>>>,
    devices: Mutex<HashMap<DeviceKey, OwnRingDevice>>,
    refreshing: AtomicBool,
    scheduler: RefreshScheduler,
}

impl RingManager {
    pub fn new(host: Arc<dyn AdapterHost>, connector: Arc<dyn ApiConnector>) -> Self {
        Self {
            host,
            connector,
            session: Mutex::new(None),
            locations: RwLock::new(Vec::new()),
            location_watchers: StdMutex::new(Vec::new()),
            devices: Mutex::new(HashMap::new()),
            refreshing: AtomicBool::new(false),
            scheduler: RefreshScheduler::new(),
        }
    }

    /// Check that the configured refresh token is present and plausible
    pub fn validate_refresh_token(&self) -> bool {
        let token = &self.host.config().refreshtoken;
        if token.is_empty() {
            tracing::error!("[RingManager] Refresh Token missing.");
            return false;
        }
        if token.chars().count() < MIN_REFRESH_TOKEN_LEN {
            tracing::error!("[RingManager] Refresh Token is oddly short.");
            return false;
        }
        true
    }

    /// Current session, opening a new one if none is live
    pub async fn get_api(&self) -> Result<Arc<dyn RingApi>, BridgeError> {
        let mut session = self.session.lock().await;
        if let Some(live) = session.as_ref() {
            return Ok(live.api.clone());
        }

        let config = self.host.config();
        if config.refreshtoken.is_empty() {
            return Err(BridgeError::Config("Refresh Token needed.".to_string()));
        }

        let refresh_token = self.host.get_refresh_token().await?;
        let api = self.connector.connect(ApiOptions {
            refresh_token,
            camera_status_polling_seconds: config.camera_status_polling_seconds,
        })?;

        let token_watcher = self.watch_token_rotation(api.on_refresh_token_updated());
        *session = Some(Session {
            api: api.clone(),
            token_watcher,
        });

        tracing::debug!("[RingManager] Opened new Ring session");
        Ok(api)
    }

    /// Initial refresh, then refresh periodically
    pub async fn init(self: &Arc<Self>) -> Result<(), BridgeError> {
        self.host.config().validate()?;
        self.refresh_all(true).await?;

        let minutes = self.host.config().refresh_interval_minutes;
        let manager = Arc::downgrade(self);
        self.scheduler
            .start_periodic(Duration::from_secs(minutes * 60), move || {
                let manager = manager.clone();
                async move {
                    if let Some(manager) = manager.upgrade() {
                        if let Err(e) = manager.refresh_all(false).await {
                            tracing::error!("[RingManager] Periodic refresh failed: {}", e);
                        }
                    }
                }
            });

        tracing::info!("[RingManager] Refreshing every {} minutes", minutes);
        Ok(())
    }

    /// Drop the current session, reconnect and mirror every location again
    pub async fn refresh_all(self: &Arc<Self>, initial: bool) -> Result<(), BridgeError> {
        // Ring drops its socket from time to time, so reconnect ourselves
        tracing::debug!("[RingManager] Refresh Ring Connection");
        let refreshing = RefreshGuard::engage(&self.refreshing);

        self.detach_location_watchers();
        self.close_session().await;
        self.retrieve_locations().await?;

        let locations = self.locations().await;
        if locations.is_empty() && initial {
            self.host.terminate(NO_LOCATIONS_REASON);
            return Err(BridgeError::Terminated(NO_LOCATIONS_REASON.to_string()));
        }

        let mut subscriptions = Vec::with_capacity(locations.len());
        for location in &locations {
            subscriptions.push(LocationEvents::subscribe(location.as_ref()));

            tracing::trace!("[RingManager] Location Debug Data: {:?}", location);
            tracing::debug!("[RingManager] Process Location {}", location.name());

            match location.get_devices().await {
                Ok(devices) => tracing::debug!(
                    "[RingManager] Received {} Devices in Location {}",
                    devices.len(),
                    location.name()
                ),
                Err(e) => self.handle_api_error(e),
            }

            let cameras = location.cameras();
            tracing::debug!("[RingManager] Location has {} Cameras", cameras.len());
            for camera in cameras {
                self.update_dev(camera, location.as_ref()).await;
            }
        }

        // Connectivity changes raised during the pass must not trigger a reconnect
        for events in &mut subscriptions {
            events.discard_connectivity();
        }
        drop(refreshing);

        for events in subscriptions {
            self.watch_location(events);
        }

        tracing::debug!("[RingManager] Refresh complete");
        Ok(())
    }

    /// Forward a host state change to the device it belongs to
    pub async fn process_user_input(
        &self,
        device_id: &str,
        channel_id: &str,
        state_id: &str,
        value: &Value,
    ) {
        let key = DeviceKey::new(self.host.namespace(), device_id);
        let devices = self.devices.lock().await;

        let Some(device) = devices.get(&key) else {
            tracing::error!(
                "[RingManager] Received State Change on Subscribed State, for unknown Device \"{}\"",
                device_id
            );
            return;
        };

        device.process_user_input(channel_id, state_id, value).await;
    }

    /// Stop periodic refreshing and let go of the session
    pub async fn unload(&self) {
        if self.scheduler.cancel() {
            tracing::debug!("[RingManager] Periodic refresh stopped");
        }
        self.detach_location_watchers();
        self.close_session().await;
    }

    pub async fn location_by_id(&self, id: &str) -> Option<Arc<dyn Location>> {
        self.locations
            .read()
            .await
            .iter()
            .find(|l| l.id() == id)
            .cloned()
    }

    pub async fn locations(&self) -> Vec<Arc<dyn Location>> {
        self.locations.read().await.clone()
    }

    pub async fn device_count(&self) -> usize {
        self.devices.lock().await.len()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    /// React to a location's connectivity change; returns whether a
    /// reconnect was scheduled
    fn on_connection_changed(self: &Arc<Self>, location_name: &str, connected: bool) -> bool {
        tracing::debug!(
            "[RingManager] Received Location Connection Status Change to {}",
            connected
        );
        if connected || self.is_refreshing() {
            return false;
        }

        let delay = Duration::from_secs(self.host.config().reconnect_delay_secs);
        tracing::warn!(
            "[RingManager] Lost connection to Location {}... Will try a reconnect in {}s",
            location_name,
            delay.as_secs()
        );

        let manager = Arc::downgrade(self);
        self.scheduler.schedule_once(delay, async move {
            if let Some(manager) = manager.upgrade() {
                if let Err(e) = manager.refresh_all(false).await {
                    tracing::error!("[RingManager] Reconnect failed: {}", e);
                }
            }
        });
        true
    }

    async fn retrieve_locations(&self) -> Result<(), BridgeError> {
        tracing::debug!("[RingManager] Retrieve Locations");
        let api = self.get_api().await?;

        match api.get_locations().await {
            Ok(locations) => {
                tracing::debug!("[RingManager] Received {} Locations", locations.len());
                *self.locations.write().await = locations;
            }
            Err(e) => self.handle_api_error(e),
        }
        Ok(())
    }

    fn handle_api_error(&self, error: ApiError) {
        tracing::error!("[RingManager] Api Call failed");
        tracing::debug!("[RingManager] Failure reason:\n{}", error);
        tracing::debug!("[RingManager] Call Stack: \n{}", Backtrace::force_capture());
    }

    async fn update_dev(&self, camera: Arc<dyn RingCamera>, location: &dyn Location) {
        let key = OwnRingDevice::full_id(camera.as_ref(), self.host.namespace());
        let mut devices = self.devices.lock().await;

        match devices.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().update_by_device(camera).await,
            Entry::Vacant(entry) => {
                let device = OwnRingDevice::new(camera, location, self.host.clone()).await;
                entry.insert(device);
            }
        }
    }

    async fn close_session(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.close();
        }
    }

    fn watch_token_rotation(
        &self,
        mut updates: broadcast::Receiver<RefreshTokenUpdate>,
    ) -> JoinHandle<()> {
        let host = self.host.clone();
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => store_rotated_token(host.as_ref(), &update).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("[RingManager] Missed {} token rotation events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn watch_location(self: &Arc<Self>, events: LocationEvents) {
        let updates = spawn_listener(events.updates, |message| {
            tracing::debug!("[RingManager] Received Location Update Event: \"{}\"", message);
        });

        let manager = Arc::downgrade(self);
        let name = events.name;
        let connectivity = spawn_listener(events.connectivity, move |connected| {
            if let Some(manager) = manager.upgrade() {
                manager.on_connection_changed(&name, connected);
            }
        });

        self.location_watchers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend([updates, connectivity]);
    }

    /// Unsubscribe from locations of the previous refresh
    fn detach_location_watchers(&self) {
        let watchers = std::mem::take(
            &mut *self
                .location_watchers
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        );
        for watcher in watchers {
            watcher.abort();
        }
    }
}

async fn store_rotated_token(host: &dyn AdapterHost, update: &RefreshTokenUpdate) {
    tracing::info!(
        "[RingManager] Received new Refresh Token. Will use the new one until the token in config gets changed"
    );

    let configured = host.config().refreshtoken.clone();
    let writes = [
        (
            NEXT_REFRESH_TOKEN_STATE,
            common_new_token(),
            Value::from(update.new_refresh_token.as_str()),
        ),
        (OLD_REFRESH_TOKEN_STATE, common_old_token(), Value::from(configured)),
    ];

    for (name, common, value) in writes {
        if let Err(e) = host.upsert_state(name, &common, value).await {
            tracing::warn!("[RingManager] Failed to store {}: {}", name, e);
        }
    }
}

/// Feed every event of `events` to `on_event` until the sender goes away
fn spawn_listener<T, F>(mut events: broadcast::Receiver<T>, mut on_event: F) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => on_event(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("[RingManager] Skipped {} location events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
