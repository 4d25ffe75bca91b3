#![allow(clippy::unwrap_used)]
// Integration tests for `ProtectClient` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use uprotect_api::{Credentials, Error, ProtectClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

fn credentials() -> Credentials {
    Credentials {
        username: "admin".into(),
        password: SecretString::from("hunter2".to_string()),
    }
}

async fn setup() -> (MockServer, ProtectClient) {
    let server = MockServer::start().await;
    let client = ProtectClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        Some(credentials()),
        TransportConfig::default(),
    );
    (server, client)
}

fn login_ok() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("set-cookie", "TOKEN=session-abc; Path=/; HttpOnly")
        .insert_header("x-csrf-token", "csrf-1")
        .set_body_json(json!({ "id": "u-1" }))
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_partial_json(json!({ "username": "admin", "rememberMe": true })))
        .respond_with(login_ok())
        .mount(server)
        .await;
}

// ── Authentication tests ────────────────────────────────────────────

#[tokio::test]
async fn test_login_captures_cookie_and_csrf() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    let session = client.login().await.unwrap();

    assert_eq!(session.cookie(), "TOKEN=session-abc");
    assert_eq!(session.csrf_token(), "csrf-1");
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn test_login_failure() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let result = client.login().await;

    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_login_without_csrf_is_rejected() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "TOKEN=abc; Path=/"))
        .mount(&server)
        .await;

    let result = client.login().await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
}

#[tokio::test]
async fn test_login_without_credentials() {
    let server = MockServer::start().await;
    let client = ProtectClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        None,
        TransportConfig::default(),
    );

    let result = client.fetch_bootstrap().await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
}

// ── Bootstrap tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_bootstrap_logs_in_and_replays_session() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/bootstrap"))
        .and(header("cookie", "TOKEN=session-abc"))
        .and(header("x-csrf-token", "csrf-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "authUserId": "u-1",
            "accessKey": "key",
            "lastUpdateId": "cursor-1",
            "nvr": { "id": "nvr-1", "modelKey": "nvr", "name": "Home NVR" },
            "cameras": [{ "id": "c-1", "modelKey": "camera", "name": "Door" }],
            "lights": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let raw = client.fetch_bootstrap().await.unwrap();

    assert_eq!(raw.last_update_id.as_deref(), Some("cursor-1"));
    assert_eq!(raw.collection("cameras").len(), 1);
    assert_eq!(raw.nvr.unwrap()["name"], "Home NVR");
}

#[tokio::test]
async fn test_unauthorized_clears_session() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/bootstrap"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client.fetch_bootstrap().await;

    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
    assert!(!client.is_authenticated(), "401 should drop the session");
}

#[tokio::test]
async fn test_forbidden_clears_session() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/cameras/c-1"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let result = client.fetch_device("cameras", "c-1").await;
    assert!(result.unwrap_err().is_auth_expired());
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_csrf_rotation_is_tracked() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/cameras/c-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-csrf-token", "csrf-2")
                .set_body_json(json!({ "id": "c-1" })),
        )
        .mount(&server)
        .await;

    client.fetch_device("cameras", "c-1").await.unwrap();
    assert_eq!(client.session().unwrap().csrf_token(), "csrf-2");
}

// ── Device tests ────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_device() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/lights/l-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "l-1",
            "modelKey": "light",
            "isLightOn": true
        })))
        .mount(&server)
        .await;

    let light = client.fetch_device("lights", "l-1").await.unwrap();
    assert_eq!(light["isLightOn"], true);
}

#[tokio::test]
async fn test_fetch_device_not_found() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/sensors/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = client.fetch_device("sensors", "gone").await;

    assert!(
        matches!(result, Err(Error::NotFound { .. })),
        "expected NotFound, got: {result:?}"
    );
    assert!(client.is_authenticated(), "404 must not drop the session");
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/bootstrap"))
        .respond_with(ResponseTemplate::new(503).set_body_string("starting up"))
        .mount(&server)
        .await;

    let err = client.fetch_bootstrap().await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_invalid_json_is_deserialization_error() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/bootstrap"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client.fetch_bootstrap().await.unwrap_err();
    assert!(matches!(err, Error::Deserialization { ref body, .. } if body == "<html>"));
}

// ── Device control tests ────────────────────────────────────────────

#[tokio::test]
async fn test_patch_device_sends_csrf_and_returns_record() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("PATCH"))
        .and(path("/proxy/protect/api/lights/l-1"))
        .and(header("x-csrf-token", "csrf-1"))
        .and(header("cookie", "TOKEN=session-abc"))
        .and(body_partial_json(json!({ "isLightForceEnabled": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "l-1",
            "isLightForceEnabled": true,
            "isLightOn": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let light = client
        .patch_device("lights", "l-1", &json!({ "isLightForceEnabled": true }))
        .await
        .unwrap();
    assert_eq!(light["isLightOn"], true);
}

#[tokio::test]
async fn test_patch_rejected_by_nvr_is_api_error() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("PATCH"))
        .and(path("/proxy/protect/api/cameras/c-1"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid recording mode"))
        .mount(&server)
        .await;

    let err = client
        .patch_device("cameras", "c-1", &json!({ "recordingSettings": { "mode": "sometimes" } }))
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Api { status: 400, ref message } if message == "invalid recording mode"),
        "got: {err:?}"
    );
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_reboot_posts_with_empty_response() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/proxy/protect/api/cameras/c-1/reboot"))
        .and(header("x-csrf-token", "csrf-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.reboot_device("cameras", "c-1").await.unwrap();
}

#[tokio::test]
async fn test_doorlock_lock_and_unlock() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    for action in ["open", "close"] {
        Mock::given(method("POST"))
            .and(path(format!("/proxy/protect/api/doorlocks/d-1/{action}")))
            .and(header("x-csrf-token", "csrf-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }

    client.unlock_doorlock("d-1").await.unwrap();
    client.lock_doorlock("d-1").await.unwrap();
}

#[tokio::test]
async fn test_play_chime_sends_only_given_fields() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/proxy/protect/api/chimes/ch-1/play-speaker"))
        .and(body_partial_json(json!({ "volume": 80 })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.play_chime("ch-1", Some(80), None).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let play = requests
        .iter()
        .find(|r| r.url.path().ends_with("/play-speaker"))
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&play.body).unwrap();
    assert_eq!(body, json!({ "volume": 80 }));
}

#[tokio::test]
async fn test_camera_snapshot_returns_raw_bytes() {
    let (server, client) = setup().await;
    mount_login(&server).await;

    let jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    Mock::given(method("GET"))
        .and(path("/proxy/protect/api/cameras/c-1/snapshot"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(jpeg.clone()),
        )
        .mount(&server)
        .await;

    assert_eq!(client.camera_snapshot("c-1").await.unwrap(), jpeg);
}
