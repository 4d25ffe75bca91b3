// uprotect-core: State synchronization and event coalescing for UniFi Protect.

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod retry;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backend::{
    BootstrapSource, DeviceCommand, DeviceSource, ProtectBackend, ProtectStream, StreamConnector, StreamSession,
};
pub use config::{AuthCredentials, ControllerConfig, ReconnectPolicy, SyncConfig, TlsVerification};
pub use controller::{Controller, EventUpdate};
pub use error::CoreError;
pub use retry::{DeviceRefresh, DeviceRefresher, Reachability, RetryScheduler};
pub use store::{ApplyOutcome, Bootstrap, BootstrapCache, BootstrapSnapshot, RecordCollection};
pub use stream::{
    Coalesced, ConnectionEvent, ConnectionState, EventCoalescer, EventStream, Reconnector,
    UpdateAction, UpdateMessage,
};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    AiPort, Bridge, Camera, Chime, DeviceInfo, Doorlock, Event, Group, Light, Liveview, ModelType,
    Nvr, Record, Sensor, User, Viewer,
};
