#![allow(clippy::unwrap_used)]
// End-to-end tests for `Controller`: HTTP paths against wiremock, the
// update stream against a scripted connector.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use uprotect_api::{RawFrame, SessionEvent};
use uprotect_core::{
    AuthCredentials, Bootstrap, BootstrapCache, BootstrapSource, ConnectionState, Controller,
    ControllerConfig, CoreError, DeviceRefresh, DeviceSource, ModelType, Reachability,
    StreamConnector, StreamSession, UpdateAction,
};

// ── HTTP helpers ────────────────────────────────────────────────────

fn http_config(server: &MockServer) -> ControllerConfig {
    let mut config = ControllerConfig::new(
        Url::parse(&server.uri()).unwrap(),
        Some(AuthCredentials {
            username: "admin".into(),
            password: SecretString::from("hunter2".to_string()),
        }),
    );
    config.websocket_enabled = false;
    config
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "TOKEN=abc; Path=/")
                .insert_header("x-csrf-token", "csrf-1"),
        )
        .mount(server)
        .await;
}

fn bootstrap_body() -> Value {
    json!({
        "authUserId": "u-1",
        "lastUpdateId": "cursor-1",
        "nvr": { "id": "nvr-1", "name": "Home NVR" },
        "cameras": [{ "id": "c-1", "name": "Door", "state": "CONNECTED" }],
        "sensors": [{ "id": "s-1", "name": "Window" }]
    })
}

// ── HTTP tests ──────────────────────────────────────────────────────

#[tokio::test]
async fn connect_loads_bootstrap_once() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/bootstrap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bootstrap_body()))
        .expect(1)
        .mount(&server)
        .await;

    let controller = Controller::new(http_config(&server)).unwrap();
    controller.connect().await.unwrap();

    let bootstrap = controller.get_bootstrap().await.unwrap();
    assert_eq!(bootstrap.cameras.len(), 1);
    assert_eq!(bootstrap.nvr().unwrap().name.as_deref(), Some("Home NVR"));
    assert_eq!(bootstrap.last_update_id().as_deref(), Some("cursor-1"));

    controller.disconnect().await;
    controller.disconnect().await;
}

#[tokio::test]
async fn bad_credentials_fail_connect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let controller = Controller::new(http_config(&server)).unwrap();
    let err = controller.connect().await.unwrap_err();

    assert!(err.is_auth(), "expected auth failure, got {err:?}");
    assert!(controller.get_cached_bootstrap().is_none());
}

#[tokio::test]
async fn refresh_device_updates_and_removes() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/bootstrap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bootstrap_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/cameras/c-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "c-1", "name": "Front Door", "state": "DISCONNECTED"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/sensors/s-1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let controller = Controller::new(http_config(&server)).unwrap();
    controller.connect().await.unwrap();

    let updated = controller.refresh_device(ModelType::Camera, "c-1").await.unwrap();
    assert!(matches!(updated, DeviceRefresh::Updated(_)));
    let cam = controller.get_cached_bootstrap().unwrap().cameras.get("c-1").unwrap();
    assert_eq!(cam.info.name.as_deref(), Some("Front Door"));
    assert!(!cam.info.is_online());
    assert_eq!(controller.device_reachability("c-1"), Some(Reachability::Reachable));

    let removed = controller.refresh_device(ModelType::Sensor, "s-1").await.unwrap();
    assert_eq!(removed, DeviceRefresh::Removed);
    assert!(controller.get_cached_bootstrap().unwrap().sensors.is_empty());
    assert_eq!(controller.device_reachability("s-1"), Some(Reachability::Gone));

    let err = controller.refresh_device(ModelType::Event, "e-1").await.unwrap_err();
    assert!(matches!(err, CoreError::Config { .. }));

    controller.disconnect().await;
}

#[tokio::test]
async fn stale_bootstrap_is_served_when_nvr_goes_away() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/bootstrap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bootstrap_body()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/bootstrap"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let controller = Controller::new(http_config(&server)).unwrap();
    controller.connect().await.unwrap();

    assert!(controller.force_refresh().await.is_err());
    let stale = controller.get_or_stale().await.unwrap();
    assert_eq!(stale.cameras.len(), 1);

    controller.disconnect().await;
}

// ── Device control ──────────────────────────────────────────────────

async fn mount_bootstrap(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/bootstrap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bootstrap_body()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn update_device_folds_response_into_cache() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_bootstrap(&server).await;
    Mock::given(method("PATCH"))
        .and(path("/proxy/protect/api/cameras/c-1"))
        .and(header("x-csrf-token", "csrf-1"))
        .and(body_json(json!({ "name": "Back Door" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "c-1", "name": "Back Door", "state": "CONNECTED"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let controller = Controller::new(http_config(&server)).unwrap();
    controller.connect().await.unwrap();
    let mut updates = controller.updates();

    let record = controller
        .update_device(ModelType::Camera, "c-1", json!({ "name": "Back Door" }))
        .await
        .unwrap();
    assert_eq!(record.id(), "c-1");

    let cam = controller.get_cached_bootstrap().unwrap().cameras.get("c-1").unwrap();
    assert_eq!(cam.info.name.as_deref(), Some("Back Door"));
    assert_eq!(controller.device_reachability("c-1"), Some(Reachability::Reachable));
    // Folding a response is not a stream update.
    assert!(updates.try_recv().is_err());

    controller.disconnect().await;
}

#[tokio::test]
async fn update_device_rejects_non_object_and_non_device() {
    let server = MockServer::start().await;
    let controller = Controller::new(http_config(&server)).unwrap();

    let err = controller
        .update_device(ModelType::Camera, "c-1", json!(["name"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Config { .. }));

    let err = controller
        .update_device(ModelType::Event, "e-1", json!({ "score": 1 }))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Config { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn set_light_patches_force_flag() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("PATCH"))
        .and(path("/proxy/protect/api/lights/l-1"))
        .and(body_json(json!({ "isLightForceEnabled": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "l-1", "isLightOn": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let controller = Controller::new(http_config(&server)).unwrap();
    let record = controller.set_light("l-1", false).await.unwrap();
    assert_eq!(record.model_type(), ModelType::Light);
}

#[tokio::test]
async fn commands_hit_their_endpoints_with_csrf() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    for endpoint in [
        "/proxy/protect/api/cameras/c-1/reboot",
        "/proxy/protect/api/doorlocks/d-1/open",
        "/proxy/protect/api/doorlocks/d-1/close",
        "/proxy/protect/api/chimes/ch-1/play-speaker",
    ] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .and(header("x-csrf-token", "csrf-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
    }

    let controller = Controller::new(http_config(&server)).unwrap();
    controller.reboot_device(ModelType::Camera, "c-1").await.unwrap();
    controller.unlock_doorlock("d-1").await.unwrap();
    controller.lock_doorlock("d-1").await.unwrap();
    controller.play_chime("ch-1", Some(60), Some(2)).await.unwrap();

    let err = controller.play_chime("ch-1", Some(101), None).await.unwrap_err();
    assert!(matches!(err, CoreError::Config { .. }));
    let err = controller.reboot_device(ModelType::Liveview, "lv-1").await.unwrap_err();
    assert!(matches!(err, CoreError::Config { .. }));
}

#[tokio::test]
async fn failed_command_surfaces_api_error() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/proxy/protect/api/doorlocks/d-1/open"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let controller = Controller::new(http_config(&server)).unwrap();
    let err = controller.unlock_doorlock("d-1").await.unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
}

#[tokio::test]
async fn camera_snapshot_returns_jpeg() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/cameras/c-1/snapshot"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
        .mount(&server)
        .await;

    let controller = Controller::new(http_config(&server)).unwrap();
    assert_eq!(controller.camera_snapshot("c-1").await.unwrap(), vec![0xFF, 0xD8, 0xFF]);
}

#[tokio::test]
async fn sources_without_control_report_config_error() {
    let (controller, _) = scripted(Vec::new());
    let err = controller.lock_doorlock("d-1").await.unwrap_err();
    assert!(matches!(err, CoreError::Config { .. }));
}

// ── Scripted stream ─────────────────────────────────────────────────

struct CountingSource {
    fetches: AtomicUsize,
}

impl BootstrapSource for CountingSource {
    fn fetch_bootstrap(&self) -> BoxFuture<'_, Result<Bootstrap, CoreError>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        async { Ok(Bootstrap::from_raw(serde_json::from_value(bootstrap_body()).unwrap())) }.boxed()
    }
}

struct NoDevices;

impl DeviceSource for NoDevices {
    fn fetch_device<'a>(&'a self, _: ModelType, _: &'a str) -> BoxFuture<'a, Result<Value, CoreError>> {
        async { Err(CoreError::Disconnected) }.boxed()
    }
}

/// Every device fetch fails as if the console stopped answering.
struct UnreachableDevices {
    calls: AtomicUsize,
}

impl DeviceSource for UnreachableDevices {
    fn fetch_device<'a>(&'a self, _: ModelType, _: &'a str) -> BoxFuture<'a, Result<Value, CoreError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        async {
            Err(CoreError::ConnectionFailed {
                reason: "connection refused".into(),
            })
        }
        .boxed()
    }
}

struct ScriptedSession {
    events: VecDeque<SessionEvent>,
    hold_open: bool,
}

impl StreamSession for ScriptedSession {
    fn next_event(&mut self) -> BoxFuture<'_, Option<SessionEvent>> {
        async move {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }
            if self.hold_open {
                std::future::pending::<()>().await;
            }
            None
        }
        .boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        async {}.boxed()
    }
}

/// Each connect plays the next script; the last one stays open.
struct ScriptedConnector {
    sessions: Mutex<VecDeque<Vec<SessionEvent>>>,
}

impl StreamConnector for ScriptedConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn StreamSession>, CoreError>> {
        let mut sessions = self.sessions.lock().unwrap();
        let events = sessions.pop_front().unwrap_or_default();
        let hold_open = sessions.is_empty();
        let session: Box<dyn StreamSession> = Box::new(ScriptedSession {
            events: events.into(),
            hold_open,
        });
        async move { Ok(session) }.boxed()
    }
}

fn event_frame(action: &str, data: &Value) -> SessionEvent {
    SessionEvent::Message(RawFrame::Text(
        json!({
            "action": action,
            "modelKey": "event",
            "id": "e-1",
            "newUpdateId": format!("cursor-{action}"),
            "data": data,
        })
        .to_string(),
    ))
}

fn scripted(sessions: Vec<Vec<SessionEvent>>) -> (Controller, Arc<CountingSource>) {
    let config = ControllerConfig::new(Url::parse("https://nvr.invalid").unwrap(), None);
    scripted_with(config, Arc::new(NoDevices), sessions)
}

fn scripted_with(
    config: ControllerConfig,
    devices: Arc<dyn DeviceSource>,
    sessions: Vec<Vec<SessionEvent>>,
) -> (Controller, Arc<CountingSource>) {
    let source = Arc::new(CountingSource {
        fetches: AtomicUsize::new(0),
    });
    let cache = BootstrapCache::new(source.clone(), config.sync.bootstrap_ttl);
    let connector = Arc::new(ScriptedConnector {
        sessions: Mutex::new(sessions.into()),
    });
    (Controller::with_parts(config, cache, devices, connector), source)
}

#[tokio::test(start_paused = true)]
async fn stream_updates_are_coalesced_into_one_event() {
    let (controller, _) = scripted(vec![vec![
        event_frame("add", &json!({ "id": "e-1", "type": "ring", "score": 0 })),
        event_frame("update", &json!({ "score": 50 })),
        event_frame("update", &json!({ "score": 100 })),
    ]]);
    let mut events = controller.subscribe();
    let mut updates = controller.updates();

    controller.connect().await.unwrap();

    let delivered = events.recv().await.unwrap();
    assert_eq!(delivered.key, "e-1");
    assert_eq!(delivered.merged, 3);
    assert_eq!(delivered.value.action, UpdateAction::Update);
    assert_eq!(delivered.value.event.as_ref().unwrap().score, Some(100));

    for _ in 0..3 {
        assert_eq!(updates.recv().await.unwrap().model_type, ModelType::Event);
    }
    let bootstrap = controller.get_cached_bootstrap().unwrap();
    assert_eq!(bootstrap.last_update_id().as_deref(), Some("cursor-update"));

    controller.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_triggers_bootstrap_refresh() {
    let (controller, source) = scripted(vec![
        vec![SessionEvent::Closed {
            code: 1011,
            reason: "restarting".into(),
        }],
        vec![],
    ]);
    let mut state = controller.connection_state();
    let opens = Arc::new(AtomicUsize::new(0));
    let closes = Arc::new(Mutex::new(Vec::new()));
    let _observer = controller.on_connection_state_change(
        {
            let opens = Arc::clone(&opens);
            move || {
                opens.fetch_add(1, Ordering::SeqCst);
            }
        },
        {
            let closes = Arc::clone(&closes);
            move |code, _reason: &str| closes.lock().unwrap().push(code)
        },
        |_error: &str| {},
    );

    controller.connect().await.unwrap();
    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

    // Closed, one second of backoff, then the second session opens.
    tokio::time::sleep(Duration::from_secs(2)).await;
    state.wait_for(|s| *s == ConnectionState::Connected).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    assert_eq!(opens.load(Ordering::SeqCst), 2);
    assert_eq!(*closes.lock().unwrap(), vec![1011]);
    controller.disconnect().await;
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_drops_pending_events() {
    let (controller, _) = scripted(vec![vec![event_frame(
        "add",
        &json!({ "id": "e-1", "type": "motion" }),
    )]]);
    let mut events = controller.subscribe();
    let mut updates = controller.updates();

    controller.connect().await.unwrap();
    updates.recv().await.unwrap();
    controller.disconnect().await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn disconnect_stops_device_retries_and_periodic_refresh() {
    let mut config = ControllerConfig::new(Url::parse("https://nvr.invalid").unwrap(), None);
    config.websocket_enabled = false;
    config.sync.refresh_interval = Duration::from_secs(60);
    let devices = Arc::new(UnreachableDevices {
        calls: AtomicUsize::new(0),
    });
    let (controller, source) = scripted_with(config, devices.clone(), Vec::new());

    controller.connect().await.unwrap();
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(source.fetches.load(Ordering::SeqCst), 2, "periodic refresh ran");

    let first = controller.refresh_device(ModelType::Camera, "c-1").await.unwrap();
    assert_eq!(first, DeviceRefresh::RetryScheduled);
    assert_eq!(controller.device_reachability("c-1"), Some(Reachability::Unreachable));

    // The retry fires after ten seconds, fails again and re-arms itself.
    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert_eq!(devices.calls.load(Ordering::SeqCst), 2);

    controller.disconnect().await;
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(devices.calls.load(Ordering::SeqCst), 2, "no device fetch after disconnect");
    assert_eq!(source.fetches.load(Ordering::SeqCst), 2, "no bootstrap refresh after disconnect");
}
