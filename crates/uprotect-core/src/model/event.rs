// ── Detection events ──
//
// Events are the noisiest model on the update stream: a single motion
// detection produces an `add` followed by a run of `update`s as scores
// and thumbnails settle, which is why the controller coalesces them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: String,
    /// `motion`, `ring`, `smartDetectZone`, `sensorOpened`, ...
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end: Option<DateTime<Utc>>,
    pub score: Option<u8>,
    pub camera: Option<String>,
    #[serde(default)]
    pub smart_detect_types: Vec<String>,
    pub thumbnail: Option<String>,
    pub heatmap: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    /// An event without an `end` timestamp is still in progress.
    pub fn is_ongoing(&self) -> bool {
        self.start.is_some() && self.end.is_none()
    }
}
