//! Clap derive structures for the `uprotect` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.
//! Also compiled by build.rs for man pages, so only clap may be used here.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// uprotect -- watch, inspect and control a UniFi Protect NVR
#[derive(Debug, Parser)]
#[command(
    name = "uprotect",
    version,
    about = "Inspect and control a UniFi Protect NVR and stream its events",
    long_about = "Keeps a live copy of a UniFi Protect NVR's bootstrap state in sync \
        over the realtime update stream and prints coalesced detection events.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// NVR profile to use
    #[arg(long, short = 'p', env = "UPROTECT_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Console URL (overrides profile)
    #[arg(long, short = 'c', env = "UPROTECT_CONTROLLER", global = true)]
    pub controller: Option<String>,

    /// Console username (overrides profile)
    #[arg(long, short = 'u', env = "UPROTECT_USERNAME", global = true)]
    pub username: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "UPROTECT_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "UPROTECT_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "UPROTECT_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

/// Device kinds that can be addressed individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceKind {
    Camera,
    Light,
    Sensor,
    Doorlock,
    Chime,
    Bridge,
    Viewer,
    #[value(name = "aiport")]
    AiPort,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the full NVR state and summarize it
    #[command(alias = "bs")]
    Bootstrap(BootstrapArgs),

    /// Fetch one device and fold it into the cached state
    #[command(alias = "dev")]
    Device(DeviceArgs),

    /// Stream coalesced events until interrupted
    Watch(WatchArgs),

    /// Change settings on a device or send it a command
    #[command(alias = "ctl")]
    Control(ControlArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  BOOTSTRAP / DEVICE / WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct BootstrapArgs {
    /// Print the full typed snapshot as JSON (same as `-o json`)
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DeviceArgs {
    /// Device type
    pub kind: DeviceKind,

    /// Device ID
    pub id: String,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Event types to show (comma-separated, e.g. "motion,ring")
    #[arg(long, value_delimiter = ',')]
    pub types: Option<Vec<String>>,

    /// Also print every applied state update
    #[arg(long)]
    pub updates: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONTROL
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ControlArgs {
    #[command(subcommand)]
    pub command: ControlCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

#[derive(Debug, Subcommand)]
pub enum ControlCommand {
    /// Apply a JSON settings patch to a device
    Patch {
        /// Device type
        kind: DeviceKind,
        /// Device ID
        id: String,
        /// Settings to change, e.g. '{"isMicEnabled": false}'
        json: String,
    },

    /// Reboot a device
    Reboot {
        /// Device type
        kind: DeviceKind,
        /// Device ID
        id: String,
    },

    /// Lock a door lock
    Lock {
        /// Door lock ID
        id: String,
    },

    /// Unlock a door lock
    Unlock {
        /// Door lock ID
        id: String,
    },

    /// Force a floodlight on, or return it to its schedule
    Light {
        /// Light ID
        id: String,
        state: Switch,
    },

    /// Play a chime's speaker
    Chime {
        /// Chime ID
        id: String,

        /// Volume (0-100)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        volume: Option<u8>,

        /// Number of repeats
        #[arg(long)]
        repeat: Option<u8>,
    },

    /// Save a camera's current frame as JPEG
    Snapshot {
        /// Camera ID
        id: String,

        /// Output file (stdout if omitted)
        #[arg(long, short = 'f')]
        file: Option<std::path::PathBuf>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current configuration (secrets masked)
    Show,

    /// Print the config file location
    Path,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store the active profile's password in the system keyring
    SetPassword,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
