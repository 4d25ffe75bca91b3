use thiserror::Error;

/// Top-level error type for the `uprotect-api` crate.
///
/// Covers every failure mode of the transport boundary: session auth,
/// HTTP, the update websocket, and frame decoding. `uprotect-core` folds
/// these into its four recovery categories.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login failed, or the NVR rejected the session (401/403).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// No session is held and none can be established without credentials.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, reset, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request or handshake timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Protect API ─────────────────────────────────────────────────
    /// Non-success HTTP status other than auth or not-found.
    #[error("Protect API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The requested resource does not exist on the NVR.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// An update frame could not be decoded.
    #[error("Malformed update frame: {0}")]
    MalformedFrame(String),
}

impl Error {
    /// Returns `true` if this error indicates auth has expired
    /// and re-authentication might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::SessionExpired)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status >= 500,
            Self::Timeout { .. } | Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::NotFound { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the error came from a payload that failed to decode.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Deserialization { .. } | Self::MalformedFrame(_))
    }
}
