// ── Controller facade ──
//
// Full lifecycle of one NVR connection: initial bootstrap, periodic
// refresh, the reconnecting update stream, incremental apply, event
// coalescing, per-device refresh with retry, and device control.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uprotect_api::{Credentials, ProtectClient, RawFrame, TransportConfig, frame};

use crate::backend::{DeviceCommand, DeviceSource, ProtectBackend, ProtectStream, StreamConnector};
use crate::config::ControllerConfig;
use crate::error::CoreError;
use crate::model::{Event, ModelType, Record};
use crate::retry::{DeviceRefresh, DeviceRefresher, Reachability};
use crate::store::{Bootstrap, BootstrapCache, refresh_task};
use crate::stream::{
    Coalesced, ConnectionEvent, ConnectionState, EventCoalescer, EventStream, Reconnector,
    UpdateAction, UpdateMessage,
};

const FRAME_CHANNEL_SIZE: usize = 256;
const UPDATE_CHANNEL_SIZE: usize = 1024;

/// What the coalescer delivers for a detection event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventUpdate {
    /// Action of the most recent update in the burst.
    pub action: UpdateAction,
    pub id: String,
    /// The event as stored after the update; `None` once removed or
    /// when no bootstrap is held.
    pub event: Option<Arc<Event>>,
    /// Raw payload of the most recent update.
    pub payload: Option<Value>,
}

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    cache: BootstrapCache,
    devices: DeviceRefresher,
    reconnector: Reconnector,
    coalescer: EventCoalescer<EventUpdate>,
    update_tx: broadcast::Sender<Arc<UpdateMessage>>,
    active: Mutex<Option<ActiveSession>>,
}

/// Background work started by `connect`.
struct ActiveSession {
    cancel: CancellationToken,
    frames: Option<mpsc::Sender<RawFrame>>,
    handles: Vec<JoinHandle<()>>,
}

impl Controller {
    /// Build a controller talking to the NVR at `config.url`. Does NOT
    /// connect -- call [`connect()`](Self::connect).
    pub fn new(config: ControllerConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: (&config.tls).into(),
            timeout: config.timeout,
        };
        let credentials = config.credentials.as_ref().map(|c| Credentials {
            username: c.username.clone(),
            password: c.password.clone(),
        });
        let client = Arc::new(ProtectClient::new(config.url.clone(), credentials, transport)?);

        let backend = Arc::new(ProtectBackend::new(Arc::clone(&client)));
        let cache = BootstrapCache::new(backend.clone(), config.sync.bootstrap_ttl);
        let stream = Arc::new(ProtectStream::new(
            client,
            cache.clone(),
            config.sync.handshake_timeout,
        ));

        Ok(Self::with_parts(config, cache, backend, stream))
    }

    /// Assemble a controller from explicit backends.
    pub fn with_parts(
        config: ControllerConfig,
        cache: BootstrapCache,
        devices: Arc<dyn DeviceSource>,
        stream: Arc<dyn StreamConnector>,
    ) -> Self {
        let sync = config.sync;
        let (update_tx, _) = broadcast::channel(UPDATE_CHANNEL_SIZE);

        Self {
            inner: Arc::new(ControllerInner {
                devices: DeviceRefresher::new(devices, cache.clone(), sync.device_retry_delay),
                reconnector: Reconnector::new(stream, sync.reconnect),
                coalescer: EventCoalescer::new(sync.event_debounce, sync.event_max_wait),
                cache,
                update_tx,
                active: Mutex::new(None),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &BootstrapCache {
        &self.inner.cache
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Load the initial bootstrap and start background work.
    ///
    /// Auth and configuration failures surface here; nothing is retried.
    /// Calling `connect` while connected is a no-op, except that an
    /// update stream which gave up is started again.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let mut active = self.inner.active.lock().await;
        if let Some(session) = active.as_ref() {
            if let (ConnectionState::GivenUp, Some(frames)) =
                (self.inner.reconnector.state(), &session.frames)
            {
                info!("restarting update stream");
                self.inner.reconnector.connect(frames.clone()).await;
            }
            return Ok(());
        }

        let config = &self.inner.config;
        let init_timeout = config.init_timeout;
        let bootstrap = tokio::time::timeout(init_timeout, self.inner.cache.get())
            .await
            .map_err(|_| CoreError::Timeout {
                timeout_secs: init_timeout.as_secs(),
            })??;
        info!(
            records = bootstrap.total_records(),
            nvr = ?bootstrap.nvr().and_then(|n| n.name.clone()),
            "initial bootstrap loaded"
        );

        let cancel = CancellationToken::new();
        let mut handles = vec![tokio::spawn(refresh_task(
            self.inner.cache.clone(),
            config.sync.refresh_interval,
            cancel.clone(),
        ))];

        let frames = if config.websocket_enabled {
            let (tx, rx) = mpsc::channel(FRAME_CHANNEL_SIZE);
            let pipeline = Pipeline {
                cache: self.inner.cache.clone(),
                coalescer: self.inner.coalescer.clone(),
                updates: self.inner.update_tx.clone(),
            };
            handles.push(tokio::spawn(pipeline.run(rx, cancel.clone())));
            handles.push(tokio::spawn(resync_on_reconnect(
                self.inner.cache.clone(),
                self.inner.reconnector.events(),
                cancel.clone(),
            )));
            self.inner.reconnector.connect(tx.clone()).await;
            Some(tx)
        } else {
            debug!("update stream disabled");
            None
        };

        *active = Some(ActiveSession {
            cancel,
            frames,
            handles,
        });
        Ok(())
    }

    /// Stop background work, close the update stream, cancel pending
    /// retries and drop undelivered events. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let active = self.inner.active.lock().await.take();
        self.inner.reconnector.disconnect().await;

        if let Some(session) = active {
            session.cancel.cancel();
            for handle in session.handles {
                let _ = handle.await;
            }
        }

        self.inner.coalescer.shutdown();
        self.inner.devices.cancel_all();
        debug!("disconnected");
    }

    // ── Bootstrap access ─────────────────────────────────────────

    /// Fresh bootstrap, fetching if the cached one expired.
    pub async fn get_bootstrap(&self) -> Result<Arc<Bootstrap>, CoreError> {
        self.inner.cache.get().await
    }

    /// Cached bootstrap, however old, without fetching.
    pub fn get_cached_bootstrap(&self) -> Option<Arc<Bootstrap>> {
        self.inner.cache.get_cached()
    }

    /// Fresh bootstrap if obtainable, else the last good one.
    pub async fn get_or_stale(&self) -> Result<Arc<Bootstrap>, CoreError> {
        self.inner.cache.get_or_stale().await
    }

    pub async fn force_refresh(&self) -> Result<Arc<Bootstrap>, CoreError> {
        self.inner.cache.force().await
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Coalesced detection events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Coalesced<EventUpdate>>> {
        self.inner.coalescer.subscribe()
    }

    /// Coalesced detection events as a `Stream`.
    pub fn events(&self) -> EventStream<EventUpdate> {
        EventStream::new(self.inner.coalescer.subscribe())
    }

    /// Every decoded update, uncoalesced, after it was applied.
    pub fn updates(&self) -> broadcast::Receiver<Arc<UpdateMessage>> {
        self.inner.update_tx.subscribe()
    }

    /// Call `callback` for each coalesced event until the controller is
    /// dropped or the returned handle is aborted.
    pub fn on_event<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(Arc<Coalesced<EventUpdate>>) + Send + 'static,
    {
        forward(self.subscribe(), callback)
    }

    /// Call `callback` for each update-stream lifecycle event.
    pub fn on_connection_event<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(ConnectionEvent) + Send + 'static,
    {
        forward(self.inner.reconnector.events(), callback)
    }

    /// Split form of [`on_connection_event`](Self::on_connection_event).
    ///
    /// `on_closed` receives the close code and reason; `on_error` also
    /// receives the give-up notice.
    pub fn on_connection_state_change<O, C, E>(&self, on_open: O, on_closed: C, on_error: E) -> JoinHandle<()>
    where
        O: Fn() + Send + 'static,
        C: Fn(u16, &str) + Send + 'static,
        E: Fn(&str) + Send + 'static,
    {
        self.on_connection_event(move |event| match event {
            ConnectionEvent::Opened { .. } => on_open(),
            ConnectionEvent::Closed { code, reason } => on_closed(code, &reason),
            ConnectionEvent::Error(message) => on_error(&message),
            ConnectionEvent::GivenUp { attempts } => {
                on_error(&format!("gave up after {attempts} reconnect attempts"));
            }
        })
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.reconnector.state_receiver()
    }

    // ── Devices ──────────────────────────────────────────────────

    /// Re-fetch one device into the cached bootstrap, retrying once
    /// after a delay if the NVR cannot be reached.
    pub async fn refresh_device(
        &self,
        model_type: ModelType,
        id: impl Into<String>,
    ) -> Result<DeviceRefresh, CoreError> {
        if !model_type.is_device() {
            return Err(CoreError::Config {
                message: format!("{model_type} is not a device type"),
            });
        }
        self.inner.devices.refresh(model_type, id.into()).await
    }

    /// Change settings on one device, e.g. `{"isMicEnabled": false}`.
    ///
    /// The record the NVR answers with replaces the cached one.
    pub async fn update_device(
        &self,
        model_type: ModelType,
        id: impl Into<String>,
        patch: Value,
    ) -> Result<Record, CoreError> {
        if !model_type.is_device() && model_type != ModelType::Nvr {
            return Err(CoreError::Config {
                message: format!("{model_type} settings cannot be changed"),
            });
        }
        if !patch.is_object() {
            return Err(CoreError::Config {
                message: "device settings must be a JSON object".into(),
            });
        }
        self.inner.devices.patch(model_type, id.into(), patch).await
    }

    pub async fn reboot_device(&self, model_type: ModelType, id: &str) -> Result<(), CoreError> {
        if !model_type.is_device() {
            return Err(CoreError::Config {
                message: format!("{model_type} is not a device type"),
            });
        }
        self.command(model_type, id, DeviceCommand::Reboot).await
    }

    pub async fn lock_doorlock(&self, id: &str) -> Result<(), CoreError> {
        self.command(ModelType::Doorlock, id, DeviceCommand::LockDoor).await
    }

    pub async fn unlock_doorlock(&self, id: &str) -> Result<(), CoreError> {
        self.command(ModelType::Doorlock, id, DeviceCommand::UnlockDoor).await
    }

    /// Force a floodlight on, or hand it back to its motion schedule.
    pub async fn set_light(&self, id: &str, on: bool) -> Result<Record, CoreError> {
        self.update_device(ModelType::Light, id, json!({ "isLightForceEnabled": on }))
            .await
    }

    pub async fn play_chime(
        &self,
        id: &str,
        volume: Option<u8>,
        repeat_times: Option<u8>,
    ) -> Result<(), CoreError> {
        if volume.is_some_and(|v| v > 100) {
            return Err(CoreError::Config {
                message: "chime volume must be between 0 and 100".into(),
            });
        }
        let command = DeviceCommand::PlayChime { volume, repeat_times };
        self.command(ModelType::Chime, id, command).await
    }

    /// Current JPEG frame from a camera.
    pub async fn camera_snapshot(&self, id: &str) -> Result<Vec<u8>, CoreError> {
        self.inner.devices.source().camera_snapshot(id).await
    }

    async fn command(&self, model_type: ModelType, id: &str, command: DeviceCommand) -> Result<(), CoreError> {
        self.inner
            .devices
            .source()
            .send_command(model_type, id, command)
            .await?;
        info!(%model_type, id, ?command, "device command accepted");
        Ok(())
    }

    pub fn device_reachability(&self, id: &str) -> Option<Reachability> {
        self.inner.devices.reachability(id)
    }

    pub fn reachability_changes(&self) -> broadcast::Receiver<(String, Reachability)> {
        self.inner.devices.subscribe()
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Decodes frames, applies them, and feeds events to the coalescer.
struct Pipeline {
    cache: BootstrapCache,
    coalescer: EventCoalescer<EventUpdate>,
    updates: broadcast::Sender<Arc<UpdateMessage>>,
}

impl Pipeline {
    async fn run(self, mut frames: mpsc::Receiver<RawFrame>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                frame = frames.recv() => match frame {
                    Some(frame) => self.handle(&frame),
                    None => break,
                },
            }
        }
        debug!("update pipeline stopped");
    }

    fn handle(&self, raw: &RawFrame) {
        let msg = match frame::decode(raw)
            .map_err(CoreError::from)
            .and_then(UpdateMessage::try_from)
        {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "dropping undecodable update frame");
                return;
            }
        };

        match self.cache.apply_incremental(&msg) {
            Ok(outcome) => trace!(model = %msg.model_type, id = %msg.id, ?outcome, "update applied"),
            Err(e) => {
                warn!(model = %msg.model_type, id = %msg.id, error = %e, "dropping malformed update");
                return;
            }
        }

        if msg.model_type == ModelType::Event {
            let event = self
                .cache
                .get_cached()
                .and_then(|b| b.events.get(&msg.id));
            self.coalescer.submit(
                msg.id.clone(),
                EventUpdate {
                    action: msg.action,
                    id: msg.id.clone(),
                    event,
                    payload: msg.payload.clone(),
                },
            );
        }

        let _ = self.updates.send(Arc::new(msg));
    }
}

/// Every re-open of the update stream may have missed updates; resync
/// the bootstrap when one happens.
async fn resync_on_reconnect(
    cache: BootstrapCache,
    mut events: broadcast::Receiver<ConnectionEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(ConnectionEvent::Opened { resumed: true }) => {
                info!("update stream reconnected, refreshing bootstrap");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = cache.force() => {
                        if let Err(e) = result {
                            warn!(error = %e, "bootstrap refresh after reconnect failed");
                        }
                    }
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "connection events lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn forward<T, F>(mut rx: broadcast::Receiver<T>, callback: F) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: Fn(T) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(item) => callback(item),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "subscriber lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}
