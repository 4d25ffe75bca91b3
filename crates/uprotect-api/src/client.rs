// Protect private API HTTP client
//
// Wraps `reqwest::Client` with session handling (login, cookie + CSRF
// replay, invalidation on 401/403), Protect URL construction, and
// response classification. Payloads are returned as raw JSON; decoding
// into typed records happens one layer up so a single bad record never
// fails a whole response.

use std::sync::{PoisonError, RwLock};

use reqwest::header::COOKIE;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::session::{self, CSRF_HEADER, Session};
use crate::transport::TransportConfig;

const LOGIN_PATH: &str = "/api/auth/login";
const API_PREFIX: &str = "/proxy/protect/api/";
const UPDATES_PATH: &str = "/proxy/protect/ws/updates";

/// Bodies longer than this are truncated in error messages.
const ERROR_BODY_LIMIT: usize = 512;

/// Username + password for a local console account.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

// ── RawBootstrap ─────────────────────────────────────────────────────

/// The `/bootstrap` response with per-type collections left undecoded.
///
/// Device collections arrive as JSON arrays of records carrying an `id`;
/// every collection key the NVR sends is kept in `collections`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBootstrap {
    #[serde(default)]
    pub auth_user_id: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub last_update_id: Option<String>,
    #[serde(default)]
    pub nvr: Option<Value>,
    #[serde(flatten)]
    pub collections: Map<String, Value>,
}

impl RawBootstrap {
    /// Records of one collection (e.g. `"cameras"`), or an empty slice.
    pub fn collection(&self, key: &str) -> &[Value] {
        self.collections
            .get(key)
            .and_then(Value::as_array)
            .map_or(&[], Vec::as_slice)
    }
}

// ── ProtectClient ────────────────────────────────────────────────────

/// HTTP client for the Protect private API.
///
/// Holds at most one [`Session`]. Every request first ensures a session
/// (logging in when none is held); an auth rejection clears it so the
/// next request authenticates afresh.
pub struct ProtectClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Option<Credentials>,
    transport: TransportConfig,
    session: RwLock<Option<Session>>,
}

impl ProtectClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` is the console root, e.g. `https://192.168.1.1`.
    pub fn new(
        base_url: Url,
        credentials: Option<Credentials>,
        transport: TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, credentials, transport))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        credentials: Option<Credentials>,
        transport: TransportConfig,
    ) -> Self {
        Self {
            http,
            base_url,
            credentials,
            transport,
            session: RwLock::new(None),
        }
    }

    /// The console base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    // ── Session ──────────────────────────────────────────────────────

    /// The current session, if any.
    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `true` when both the session cookie and CSRF token are held.
    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    /// Drop the current session; the next request logs in again.
    pub fn clear_session(&self) {
        let had = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if had {
            debug!("session cleared");
        }
    }

    /// Authenticate with username/password.
    ///
    /// On success the session cookie and CSRF token are stored and
    /// replayed on subsequent requests.
    pub async fn login(&self) -> Result<Session, Error> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| Error::Authentication {
                message: "no credentials configured".into(),
            })?;

        let url = self.base_url.join(LOGIN_PATH)?;
        debug!("logging in at {}", url);

        let body = json!({
            "username": creds.username,
            "password": creds.password.expose_secret(),
            "rememberMe": true,
        });

        let resp = self.http.post(url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("login failed (HTTP {status}): {}", truncate(&body)),
            });
        }

        let session = Session::from_headers(resp.headers()).ok_or_else(|| Error::Authentication {
            message: "login response carried no session cookie or CSRF token".into(),
        })?;

        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        debug!("login successful");
        Ok(session)
    }

    /// Return the held session, logging in first if there is none.
    pub async fn ensure_session(&self) -> Result<Session, Error> {
        match self.session() {
            Some(session) => Ok(session),
            None => self.login().await,
        }
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/proxy/protect/api/{path}`
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(API_PREFIX)?.join(path)?)
    }

    /// Update-stream URL (`https→wss`, `http→ws`), resuming from `cursor`.
    pub fn websocket_url(&self, cursor: Option<&str>) -> Result<Url, Error> {
        let mut url = self.base_url.join(UPDATES_PATH)?;
        let scheme = if url.scheme() == "http" { "ws" } else { "wss" };
        url.set_scheme(scheme).map_err(|()| {
            Error::WebSocketConnect(format!("cannot derive websocket URL from {}", self.base_url))
        })?;
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair("lastUpdateId", cursor);
        }
        Ok(url)
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Fetch the full-state snapshot.
    pub async fn fetch_bootstrap(&self) -> Result<RawBootstrap, Error> {
        let value = self.get_json("bootstrap").await?;
        serde_json::from_value(value).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })
    }

    /// Fetch a single record, e.g. `fetch_device("cameras", id)`.
    pub async fn fetch_device(&self, collection: &str, id: &str) -> Result<Value, Error> {
        self.get_json(&format!("{collection}/{id}")).await
    }

    /// Change settings on one record; the NVR answers with the full
    /// updated record.
    pub async fn patch_device(&self, collection: &str, id: &str, body: &Value) -> Result<Value, Error> {
        let resp = self
            .send(Method::PATCH, &format!("{collection}/{id}"), Some(body))
            .await?;
        decode_json(resp).await
    }

    /// `POST {collection}/{id}/reboot`
    pub async fn reboot_device(&self, collection: &str, id: &str) -> Result<(), Error> {
        self.post_action(&format!("{collection}/{id}/reboot"), None).await
    }

    /// Release the bolt.
    pub async fn unlock_doorlock(&self, id: &str) -> Result<(), Error> {
        self.post_action(&format!("doorlocks/{id}/open"), None).await
    }

    pub async fn lock_doorlock(&self, id: &str) -> Result<(), Error> {
        self.post_action(&format!("doorlocks/{id}/close"), None).await
    }

    /// Ring a chime's speaker. Unset fields use the chime's own settings.
    pub async fn play_chime(&self, id: &str, volume: Option<u8>, repeat_times: Option<u8>) -> Result<(), Error> {
        let mut body = Map::new();
        if let Some(volume) = volume {
            body.insert("volume".into(), volume.into());
        }
        if let Some(repeat_times) = repeat_times {
            body.insert("repeatTimes".into(), repeat_times.into());
        }
        let body = (!body.is_empty()).then(|| Value::Object(body));
        self.post_action(&format!("chimes/{id}/play-speaker"), body.as_ref())
            .await
    }

    /// Current JPEG frame from a camera.
    pub async fn camera_snapshot(&self, id: &str) -> Result<Vec<u8>, Error> {
        let resp = self
            .send(Method::GET, &format!("cameras/{id}/snapshot"), None)
            .await?;
        Ok(resp.bytes().await?.to_vec())
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get_json(&self, path: &str) -> Result<Value, Error> {
        let resp = self.send(Method::GET, path, None).await?;
        decode_json(resp).await
    }

    /// Fire a command endpoint; any response body is ignored.
    async fn post_action(&self, path: &str, body: Option<&Value>) -> Result<(), Error> {
        self.send(Method::POST, path, body).await?;
        Ok(())
    }

    /// Send an authenticated request and classify the response status.
    ///
    /// Every request carries the session cookie and the CSRF token; the
    /// console rejects mutating requests without the latter.
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<reqwest::Response, Error> {
        let session = self.ensure_session().await?;
        let url = self.api_url(path)?;
        debug!("{} {}", method, url);

        let mut req = self
            .http
            .request(method, url.clone())
            .header(COOKIE, session.cookie())
            .header(CSRF_HEADER, session.csrf_token());
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;

        self.check_status(&url, resp).await
    }

    async fn check_status(&self, url: &Url, resp: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = resp.status();
        self.refresh_csrf(resp.headers());

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.clear_session();
            return Err(Error::Authentication {
                message: format!("NVR rejected session (HTTP {status})"),
            });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                resource: url.path().to_owned(),
            });
        }

        if !status.is_success() {
            let body = resp.text().await?;
            return Err(Error::Api {
                status: status.as_u16(),
                message: truncate(&body).to_owned(),
            });
        }

        Ok(resp)
    }

    /// Consoles rotate the CSRF token; keep whichever came last.
    fn refresh_csrf(&self, headers: &reqwest::header::HeaderMap) {
        let Some(token) = session::csrf_token(headers) else {
            return;
        };
        if let Some(session) = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            session.set_csrf_token(token);
        }
    }
}

async fn decode_json(resp: reqwest::Response) -> Result<Value, Error> {
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
