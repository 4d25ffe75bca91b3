//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use uprotect_config::ConfigError;
use uprotect_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to the NVR: {reason}")]
    #[diagnostic(
        code(uprotect::connection_failed),
        help(
            "Check that the console is running and reachable.\n\
             Self-signed certificate? Try again with --insecure (-k)."
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Update stream gave up after {attempts} reconnect attempts")]
    #[diagnostic(
        code(uprotect::stream_given_up),
        help("The NVR stopped accepting stream connections. Check it is online and run the command again.")
    )]
    StreamGivenUp { attempts: u32 },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(uprotect::auth_failed),
        help(
            "Verify the username and password of a local console account.\n\
             Run: uprotect config set-password --profile <name>"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(uprotect::no_credentials),
        help(
            "Configure credentials with: uprotect config init\n\
             Or set UPROTECT_USERNAME and UPROTECT_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource} not found")]
    #[diagnostic(
        code(uprotect::not_found),
        help("Run: uprotect bootstrap to see the devices the NVR knows about")
    )]
    NotFound { resource: String },

    // ── API ──────────────────────────────────────────────────────────

    #[error("NVR returned HTTP {status}: {message}")]
    #[diagnostic(code(uprotect::api_error))]
    ApiError { status: u16, message: String },

    #[error("Unexpected response: {message}")]
    #[diagnostic(code(uprotect::malformed))]
    Malformed { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(uprotect::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(uprotect::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: uprotect config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(uprotect::no_config),
        help(
            "Create one with: uprotect config init\n\
             Or pass --controller and --username.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(uprotect::config))]
    Config(Box<figment::Error>),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(uprotect::timeout),
        help("Increase timeout with --timeout or check NVR responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    #[diagnostic(code(uprotect::json))]
    Json(#[from] serde_json::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::StreamGivenUp { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },

            CoreError::Disconnected => CliError::ConnectionFailed {
                reason: "connection to the NVR was lost".into(),
            },

            CoreError::GivenUp { attempts } => CliError::StreamGivenUp { attempts },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::NotFound { resource } => CliError::NotFound { resource },

            CoreError::Api { status, message } => CliError::ApiError { status, message },

            CoreError::MalformedPayload { context, message } => CliError::Malformed {
                message: format!("{context}: {message}"),
            },

            CoreError::Config { message } => CliError::Validation {
                field: "configuration".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Malformed { message },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Serialization(e) => CliError::Validation {
                field: "config".into(),
                reason: e.to_string(),
            },
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}
