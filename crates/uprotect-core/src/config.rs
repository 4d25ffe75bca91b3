// ── Runtime connection configuration ──
//
// These types describe *how* to connect to a Protect NVR and how the sync
// engine paces itself. They carry credential data and tuning, but never
// touch disk. The CLI constructs a `ControllerConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// Local console account used for cookie auth.
#[derive(Debug, Clone)]
pub struct AuthCredentials {
    pub username: String,
    pub password: SecretString,
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs). Default for local consoles.
    #[default]
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for uprotect_api::TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => Self::System,
            TlsVerification::CustomCa(path) => Self::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => Self::DangerAcceptInvalid,
        }
    }
}

// ── Engine tuning ───────────────────────────────────────────────────

/// Exponential reconnect backoff for the update stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Attempts after which the reconnector gives up for good.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based):
    /// `min(initial * 2^(attempt-1), max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 10,
        }
    }
}

/// Pacing of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// How long a fetched bootstrap counts as fresh.
    pub bootstrap_ttl: Duration,
    /// Period of the background bootstrap refresh.
    pub refresh_interval: Duration,
    /// Quiet time after the last event update before it is delivered.
    pub event_debounce: Duration,
    /// Longest an event can be held back by a continuous burst.
    pub event_max_wait: Duration,
    /// Delay before re-fetching a device whose refresh failed.
    pub device_retry_delay: Duration,
    /// Bound on the websocket upgrade handshake.
    pub handshake_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bootstrap_ttl: Duration::from_secs(15 * 60),
            refresh_interval: Duration::from_secs(15 * 60),
            event_debounce: Duration::from_millis(500),
            event_max_wait: Duration::from_millis(2000),
            device_retry_delay: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Configuration for connecting to a single NVR.
///
/// Built by the CLI, passed to `Controller` -- core never reads config files.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Console URL (e.g., `https://192.168.1.1`).
    pub url: Url,
    pub credentials: Option<AuthCredentials>,
    pub tls: TlsVerification,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Bound on the initial login + bootstrap in `Controller::connect`.
    pub init_timeout: Duration,
    /// Open the update stream on connect.
    pub websocket_enabled: bool,
    pub sync: SyncConfig,
}

impl ControllerConfig {
    pub fn new(url: Url, credentials: Option<AuthCredentials>) -> Self {
        Self {
            url,
            credentials,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            init_timeout: Duration::from_secs(30),
            websocket_enabled: true,
            sync: SyncConfig::default(),
        }
    }
}
