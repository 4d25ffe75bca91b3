// ── Protect device records ──
//
// Each record decodes only the fields the engine and CLI read; every
// other key the NVR sends is kept in `extra` so a record re-serializes
// without loss. All fields are optional because update frames carry
// partial objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields shared by every adoptable Protect device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(default)]
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub hardware: Option<String>,
    pub mac: Option<String>,
    pub host: Option<String>,
    /// `CONNECTED`, `DISCONNECTED`, `CONNECTING`, ...
    pub state: Option<String>,
    pub firmware_version: Option<String>,
    pub is_connected: Option<bool>,
    pub is_adopted: Option<bool>,
    pub market_name: Option<String>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub up_since: Option<DateTime<Utc>>,
}

impl DeviceInfo {
    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Online according to the NVR (`state == CONNECTED` wins over the flag).
    pub fn is_online(&self) -> bool {
        match self.state.as_deref() {
            Some(state) => state.eq_ignore_ascii_case("connected"),
            None => self.is_connected.unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Camera {
    #[serde(flatten)]
    pub info: DeviceInfo,
    pub is_motion_detected: Option<bool>,
    pub is_smart_detected: Option<bool>,
    pub is_recording: Option<bool>,
    pub is_dark: Option<bool>,
    pub recording_settings: Option<Value>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_motion: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_ring: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Light {
    #[serde(flatten)]
    pub info: DeviceInfo,
    pub is_light_on: Option<bool>,
    pub is_pir_motion_detected: Option<bool>,
    pub camera: Option<String>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_motion: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sensor {
    #[serde(flatten)]
    pub info: DeviceInfo,
    pub is_opened: Option<bool>,
    pub is_motion_detected: Option<bool>,
    pub mount_type: Option<String>,
    pub stats: Option<Value>,
    pub battery_status: Option<Value>,
    pub camera: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doorlock {
    #[serde(flatten)]
    pub info: DeviceInfo,
    /// `OPEN`, `CLOSED`, `OPENING`, `CLOSING`, ...
    pub lock_status: Option<String>,
    pub auto_close_time_ms: Option<u64>,
    pub camera: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chime {
    #[serde(flatten)]
    pub info: DeviceInfo,
    pub volume: Option<u8>,
    #[serde(default)]
    pub camera_ids: Vec<String>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_ring: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bridge {
    #[serde(flatten)]
    pub info: DeviceInfo,
    pub platform: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    #[serde(flatten)]
    pub info: DeviceInfo,
    pub liveview: Option<String>,
    pub stream_limit: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPort {
    #[serde(flatten)]
    pub info: DeviceInfo,
    pub paired_cameras: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
