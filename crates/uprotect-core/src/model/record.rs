// ── Record dispatch ──
//
// One table maps a `ModelType` to the record shape its payloads decode
// into. Everything that turns raw JSON into typed records (bootstrap
// construction, incremental apply, device refresh) goes through here.

use serde::Serialize;
use serde_json::Value;

use super::device::{AiPort, Bridge, Camera, Chime, DeviceInfo, Doorlock, Light, Sensor, Viewer};
use super::event::Event;
use super::model_type::ModelType;
use super::system::{Group, Liveview, Nvr, User};

/// A decoded record of any stored type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Camera(Camera),
    Light(Light),
    Sensor(Sensor),
    Doorlock(Doorlock),
    Chime(Chime),
    Bridge(Bridge),
    Viewer(Viewer),
    AiPort(AiPort),
    Liveview(Liveview),
    Nvr(Nvr),
    Event(Event),
    User(User),
    Group(Group),
}

impl Record {
    /// Decode `payload` into the record shape for `model_type`.
    ///
    /// Returns `Ok(None)` for types that have no record shape.
    pub fn decode(model_type: ModelType, payload: Value) -> Result<Option<Self>, serde_json::Error> {
        let record = match model_type {
            ModelType::Camera => Self::Camera(serde_json::from_value(payload)?),
            ModelType::Light => Self::Light(serde_json::from_value(payload)?),
            ModelType::Sensor => Self::Sensor(serde_json::from_value(payload)?),
            ModelType::Doorlock => Self::Doorlock(serde_json::from_value(payload)?),
            ModelType::Chime => Self::Chime(serde_json::from_value(payload)?),
            ModelType::Bridge => Self::Bridge(serde_json::from_value(payload)?),
            ModelType::Viewer => Self::Viewer(serde_json::from_value(payload)?),
            ModelType::AiPort => Self::AiPort(serde_json::from_value(payload)?),
            ModelType::Liveview => Self::Liveview(serde_json::from_value(payload)?),
            ModelType::Nvr => Self::Nvr(serde_json::from_value(payload)?),
            ModelType::Event => Self::Event(serde_json::from_value(payload)?),
            ModelType::User => Self::User(serde_json::from_value(payload)?),
            ModelType::Group => Self::Group(serde_json::from_value(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(record))
    }

    pub fn model_type(&self) -> ModelType {
        match self {
            Self::Camera(_) => ModelType::Camera,
            Self::Light(_) => ModelType::Light,
            Self::Sensor(_) => ModelType::Sensor,
            Self::Doorlock(_) => ModelType::Doorlock,
            Self::Chime(_) => ModelType::Chime,
            Self::Bridge(_) => ModelType::Bridge,
            Self::Viewer(_) => ModelType::Viewer,
            Self::AiPort(_) => ModelType::AiPort,
            Self::Liveview(_) => ModelType::Liveview,
            Self::Nvr(_) => ModelType::Nvr,
            Self::Event(_) => ModelType::Event,
            Self::User(_) => ModelType::User,
            Self::Group(_) => ModelType::Group,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Camera(r) => &r.info.id,
            Self::Light(r) => &r.info.id,
            Self::Sensor(r) => &r.info.id,
            Self::Doorlock(r) => &r.info.id,
            Self::Chime(r) => &r.info.id,
            Self::Bridge(r) => &r.info.id,
            Self::Viewer(r) => &r.info.id,
            Self::AiPort(r) => &r.info.id,
            Self::Liveview(r) => &r.id,
            Self::Nvr(r) => &r.id,
            Self::Event(r) => &r.id,
            Self::User(r) => &r.id,
            Self::Group(r) => &r.id,
        }
    }

    /// Common device fields, for the eight device types.
    pub fn device_info(&self) -> Option<&DeviceInfo> {
        match self {
            Self::Camera(r) => Some(&r.info),
            Self::Light(r) => Some(&r.info),
            Self::Sensor(r) => Some(&r.info),
            Self::Doorlock(r) => Some(&r.info),
            Self::Chime(r) => Some(&r.info),
            Self::Bridge(r) => Some(&r.info),
            Self::Viewer(r) => Some(&r.info),
            Self::AiPort(r) => Some(&r.info),
            Self::Liveview(_) | Self::Nvr(_) | Self::Event(_) | Self::User(_) | Self::Group(_) => None,
        }
    }

    /// Key the record under `id`.
    ///
    /// Update frames name the record in their header and often omit `id`
    /// from the (partial) data object; the header wins.
    pub fn with_id(mut self, id: &str) -> Self {
        let slot = match &mut self {
            Self::Camera(r) => &mut r.info.id,
            Self::Light(r) => &mut r.info.id,
            Self::Sensor(r) => &mut r.info.id,
            Self::Doorlock(r) => &mut r.info.id,
            Self::Chime(r) => &mut r.info.id,
            Self::Bridge(r) => &mut r.info.id,
            Self::Viewer(r) => &mut r.info.id,
            Self::AiPort(r) => &mut r.info.id,
            Self::Liveview(r) => &mut r.id,
            Self::Nvr(r) => &mut r.id,
            Self::Event(r) => &mut r.id,
            Self::User(r) => &mut r.id,
            Self::Group(r) => &mut r.id,
        };
        if slot.as_str() != id {
            id.clone_into(slot);
        }
        self
    }
}

/// Overlay `patch` onto `base`, recursing into nested objects.
///
/// Keys present in `patch` win; keys only in `base` survive. Applying
/// the same patch twice yields the same document.
pub fn merge_patch(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_patch(existing, value);
                    }
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}
