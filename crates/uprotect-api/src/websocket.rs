//! Update-stream websocket session.
//!
//! A [`WsSession`] is one live connection to the NVR's update endpoint.
//! It only moves frames: decoding lives in [`frame`](crate::frame) and
//! reconnection policy lives in `uprotect-core`.
//!
//! # Example
//!
//! ```rust,ignore
//! use uprotect_api::{ProtectClient, SessionEvent, WsSession};
//!
//! let session = client.ensure_session().await?;
//! let url = client.websocket_url(None)?;
//! let mut ws = WsSession::open(&url, session.cookie(), client.transport(), timeout).await?;
//!
//! while let Some(event) = ws.next_event().await {
//!     match event {
//!         SessionEvent::Message(frame) => println!("{frame:?}"),
//!         SessionEvent::Closed { code, reason } => println!("closed {code}: {reason}"),
//!         SessionEvent::Error(e) => eprintln!("{e}"),
//!     }
//! }
//! ```

use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;
use crate::frame::RawFrame;
use crate::transport::TransportConfig;

/// Close code reported when the stream ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported for a close frame without a payload.
const NO_STATUS: u16 = 1005;

/// What a live session can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Message(RawFrame),
    Closed { code: u16, reason: String },
    Error(String),
}

/// A single websocket connection to `/proxy/protect/ws/updates`.
pub struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl WsSession {
    /// Perform the upgrade handshake, bounded by `handshake_timeout`.
    ///
    /// `cookie` is sent as the `Cookie` header of the upgrade request.
    pub async fn open(
        url: &Url,
        cookie: &str,
        transport: &TransportConfig,
        handshake_timeout: Duration,
    ) -> Result<Self, Error> {
        tracing::info!(url = %url, "Connecting to update stream");

        let uri: tungstenite::http::Uri = url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

        let request = ClientRequestBuilder::new(uri).with_header("Cookie", cookie);
        let connector = transport.websocket_tls()?.map(Connector::Rustls);

        let handshake =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector);

        let (stream, response) = tokio::time::timeout(handshake_timeout, handshake)
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: handshake_timeout.as_secs(),
            })?
            .map_err(classify_handshake_error)?;

        tracing::info!(status = %response.status(), "Update stream connected");
        Ok(Self {
            stream,
            closed: false,
        })
    }

    /// Wait for the next frame or lifecycle event.
    ///
    /// Returns `None` once the session has reported its closure (or was
    /// closed locally); a session reports `Closed`/`Error` exactly once.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        if self.closed {
            return None;
        }

        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Binary(bytes))) => {
                    return Some(SessionEvent::Message(RawFrame::Binary(bytes)));
                }
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Some(SessionEvent::Message(RawFrame::Text(text.to_string())));
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    self.closed = true;
                    let (code, reason) = frame.map_or_else(
                        || (NO_STATUS, String::new()),
                        |cf| (u16::from(cf.code), cf.reason.to_string()),
                    );
                    tracing::info!(code, reason = %reason, "Update stream close frame received");
                    return Some(SessionEvent::Closed { code, reason });
                }
                Some(Ok(_)) => {
                    // Ping/Pong/raw frames; tungstenite answers pings itself
                    tracing::trace!("update stream control frame");
                }
                Some(Err(e)) => {
                    self.closed = true;
                    return Some(SessionEvent::Error(e.to_string()));
                }
                None => {
                    self.closed = true;
                    tracing::info!("Update stream ended");
                    return Some(SessionEvent::Closed {
                        code: ABNORMAL_CLOSURE,
                        reason: "stream ended".into(),
                    });
                }
            }
        }
    }

    /// Close the session. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "error while closing update stream");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Map handshake failures: 401/403 on upgrade means the session is stale.
fn classify_handshake_error(err: tungstenite::Error) -> Error {
    if let tungstenite::Error::Http(resp) = &err {
        let status = resp.status();
        if status == tungstenite::http::StatusCode::UNAUTHORIZED
            || status == tungstenite::http::StatusCode::FORBIDDEN
        {
            return Error::Authentication {
                message: format!("update stream rejected session (HTTP {status})"),
            };
        }
    }
    Error::WebSocketConnect(err.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn other_handshake_failures_are_transient() {
        let err = classify_handshake_error(tungstenite::Error::ConnectionClosed);
        assert!(matches!(err, Error::WebSocketConnect(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn open_times_out_or_fails_against_closed_port() {
        let url = Url::parse("ws://127.0.0.1:9/proxy/protect/ws/updates").unwrap();
        let transport = TransportConfig::default();
        let result = WsSession::open(&url, "TOKEN=x", &transport, Duration::from_millis(500)).await;
        assert!(result.is_err());
    }
}
