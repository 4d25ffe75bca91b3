// ── NVR, account and layout records ──

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The NVR itself; held as a singleton in the bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nvr {
    #[serde(default)]
    pub id: String,
    pub name: Option<String>,
    pub mac: Option<String>,
    pub host: Option<String>,
    pub version: Option<String>,
    pub firmware_version: Option<String>,
    pub timezone: Option<String>,
    pub is_recording_disabled: Option<bool>,
    pub storage_stats: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: String,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(default)]
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub group_type: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Liveview {
    #[serde(default)]
    pub id: String,
    pub name: Option<String>,
    pub is_default: Option<bool>,
    pub layout: Option<u32>,
    pub owner: Option<String>,
    #[serde(default)]
    pub slots: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
