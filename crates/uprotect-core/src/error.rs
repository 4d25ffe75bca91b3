// ── Core error types ──
//
// Errors surfaced by the sync engine. Transport failures are folded into
// the recovery categories the engine acts on: transient failures are
// retried, auth and configuration failures are surfaced, malformed
// payloads are logged and dropped. `CoreError` is `Clone` because a
// single bootstrap fetch result is shared by every caller waiting on it.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach NVR: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Not connected to the NVR")]
    Disconnected,

    #[error("Update stream gave up after {attempts} reconnect attempts")]
    GivenUp { attempts: u32 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Malformed {context} payload: {message}")]
    MalformedPayload { context: String, message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("NVR API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Worth retrying: the NVR may come back on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::Disconnected => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Credentials were rejected.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }

    /// The record no longer exists on the NVR.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn malformed(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::MalformedPayload {
            context: context.into(),
            message: err.to_string(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<uprotect_api::Error> for CoreError {
    fn from(err: uprotect_api::Error) -> Self {
        match err {
            uprotect_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            uprotect_api::Error::SessionExpired => CoreError::AuthenticationFailed {
                message: "Session expired -- re-authentication required".into(),
            },
            uprotect_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_builder() {
                    CoreError::Config {
                        message: e.to_string(),
                    }
                } else {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                }
            }
            uprotect_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            uprotect_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            uprotect_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            uprotect_api::Error::Api { status, message } => CoreError::Api { status, message },
            uprotect_api::Error::NotFound { resource } => CoreError::NotFound { resource },
            uprotect_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            uprotect_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            uprotect_api::Error::Deserialization { message, body: _ } => {
                CoreError::malformed("response", message)
            }
            uprotect_api::Error::MalformedFrame(message) => {
                CoreError::malformed("update frame", message)
            }
        }
    }
}
