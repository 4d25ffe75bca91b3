// ── Protect domain model ──
//
// Typed records for every stored model type, plus the `ModelType`
// discriminator and the `Record` dispatch table that decodes payloads.

pub mod device;
pub mod event;
pub mod model_type;
pub mod record;
pub mod system;

// ── Re-exports ──────────────────────────────────────────────────────

pub use device::{AiPort, Bridge, Camera, Chime, DeviceInfo, Doorlock, Light, Sensor, Viewer};
pub use event::Event;
pub use model_type::ModelType;
pub use record::{Record, merge_patch};
pub use system::{Group, Liveview, Nvr, User};
