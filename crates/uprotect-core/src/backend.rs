// ── Backend seams ──
//
// The engine talks to the NVR through these traits so the cache, the
// reconnector and the device refresher can be driven by fakes in tests.
// `ProtectBackend` is the production implementation over `ProtectClient`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};
use uprotect_api::{ProtectClient, SessionEvent, WsSession};

use crate::error::CoreError;
use crate::model::ModelType;
use crate::store::{Bootstrap, BootstrapCache};

/// Fetches a complete snapshot.
pub trait BootstrapSource: Send + Sync + 'static {
    fn fetch_bootstrap(&self) -> BoxFuture<'_, Result<Bootstrap, CoreError>>;
}

/// A one-shot command sent to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    Reboot,
    LockDoor,
    UnlockDoor,
    PlayChime {
        volume: Option<u8>,
        repeat_times: Option<u8>,
    },
}

/// Reads and commands single records by type and id. `NotFound` on a
/// fetch means the record is gone.
///
/// Only `fetch_device` is required; sources that cannot control devices
/// answer the other calls with `CoreError::Config`.
pub trait DeviceSource: Send + Sync + 'static {
    fn fetch_device<'a>(
        &'a self,
        model_type: ModelType,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Value, CoreError>>;

    /// Apply a partial settings change; returns the full updated record.
    fn patch_device<'a>(
        &'a self,
        model_type: ModelType,
        id: &'a str,
        _body: &'a Value,
    ) -> BoxFuture<'a, Result<Value, CoreError>> {
        async move { Err(unsupported(model_type, id)) }.boxed()
    }

    fn send_command<'a>(
        &'a self,
        model_type: ModelType,
        id: &'a str,
        _command: DeviceCommand,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        async move { Err(unsupported(model_type, id)) }.boxed()
    }

    /// JPEG bytes of a camera's current frame.
    fn camera_snapshot<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Vec<u8>, CoreError>> {
        async move { Err(unsupported(ModelType::Camera, id)) }.boxed()
    }
}

fn unsupported(model_type: ModelType, id: &str) -> CoreError {
    CoreError::Config {
        message: format!("this source cannot control {model_type} '{id}'"),
    }
}

fn collection(model_type: ModelType) -> Result<&'static str, CoreError> {
    model_type.collection_key().ok_or_else(|| CoreError::Config {
        message: format!("{model_type} records cannot be addressed individually"),
    })
}

/// Opens update-stream sessions.
pub trait StreamConnector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn StreamSession>, CoreError>>;
}

/// One live update-stream session.
pub trait StreamSession: Send {
    /// Next frame or lifecycle event; `None` once the session is over.
    fn next_event(&mut self) -> BoxFuture<'_, Option<SessionEvent>>;

    /// Close the session. Safe to call more than once.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

// ── Production backend ──────────────────────────────────────────────

/// `ProtectClient`-backed implementation of the bootstrap and device seams.
#[derive(Clone)]
pub struct ProtectBackend {
    client: Arc<ProtectClient>,
}

impl ProtectBackend {
    pub fn new(client: Arc<ProtectClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<ProtectClient> {
        &self.client
    }
}

impl BootstrapSource for ProtectBackend {
    fn fetch_bootstrap(&self) -> BoxFuture<'_, Result<Bootstrap, CoreError>> {
        async move {
            let raw = self.client.fetch_bootstrap().await?;
            Ok(Bootstrap::from_raw(raw))
        }
        .boxed()
    }
}

impl DeviceSource for ProtectBackend {
    fn fetch_device<'a>(
        &'a self,
        model_type: ModelType,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Value, CoreError>> {
        async move { Ok(self.client.fetch_device(collection(model_type)?, id).await?) }.boxed()
    }

    fn patch_device<'a>(
        &'a self,
        model_type: ModelType,
        id: &'a str,
        body: &'a Value,
    ) -> BoxFuture<'a, Result<Value, CoreError>> {
        async move { Ok(self.client.patch_device(collection(model_type)?, id, body).await?) }.boxed()
    }

    fn send_command<'a>(
        &'a self,
        model_type: ModelType,
        id: &'a str,
        command: DeviceCommand,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        async move {
            debug!(%model_type, id, ?command, "sending device command");
            match command {
                DeviceCommand::Reboot => self.client.reboot_device(collection(model_type)?, id).await?,
                DeviceCommand::LockDoor => self.client.lock_doorlock(id).await?,
                DeviceCommand::UnlockDoor => self.client.unlock_doorlock(id).await?,
                DeviceCommand::PlayChime { volume, repeat_times } => {
                    self.client.play_chime(id, volume, repeat_times).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    fn camera_snapshot<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Vec<u8>, CoreError>> {
        async move { Ok(self.client.camera_snapshot(id).await?) }.boxed()
    }
}

/// Opens websocket sessions, resuming from the cached bootstrap's cursor.
#[derive(Clone)]
pub struct ProtectStream {
    client: Arc<ProtectClient>,
    cache: BootstrapCache,
    handshake_timeout: Duration,
}

impl ProtectStream {
    pub fn new(client: Arc<ProtectClient>, cache: BootstrapCache, handshake_timeout: Duration) -> Self {
        Self {
            client,
            cache,
            handshake_timeout,
        }
    }

    async fn open(&self) -> Result<WsSession, CoreError> {
        let cursor = self.cache.get_cached().and_then(|b| b.last_update_id());
        let url = self.client.websocket_url(cursor.as_deref())?;
        let session = self.client.ensure_session().await?;

        match WsSession::open(&url, session.cookie(), self.client.transport(), self.handshake_timeout).await {
            Err(e) if e.is_auth_expired() => {
                // Stale cookie: log in once more and retry the upgrade.
                debug!(error = %e, "update stream rejected session, re-authenticating");
                self.client.clear_session();
                let session = self.client.login().await?;
                Ok(WsSession::open(
                    &url,
                    session.cookie(),
                    self.client.transport(),
                    self.handshake_timeout,
                )
                .await?)
            }
            Err(e) => {
                warn!(error = %e, "update stream handshake failed");
                Err(e.into())
            }
            Ok(ws) => Ok(ws),
        }
    }
}

impl StreamConnector for ProtectStream {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn StreamSession>, CoreError>> {
        async move {
            let ws = self.open().await?;
            Ok(Box::new(ws) as Box<dyn StreamSession>)
        }
        .boxed()
    }
}

impl StreamSession for WsSession {
    fn next_event(&mut self) -> BoxFuture<'_, Option<SessionEvent>> {
        WsSession::next_event(self).boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        WsSession::close(self).boxed()
    }
}
