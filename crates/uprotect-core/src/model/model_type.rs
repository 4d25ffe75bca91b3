// ── Model type discriminator ──
//
// The NVR tags every record and every update frame with a `modelKey`.
// Keys the engine stores are "mapped"; the rest are recognised so logs
// stay readable, but their updates are ignored. Anything else parses as
// `Unknown`.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
#[serde(rename_all = "camelCase")]
pub enum ModelType {
    // Stored
    Camera,
    Light,
    Sensor,
    Doorlock,
    Chime,
    Bridge,
    Viewer,
    #[strum(serialize = "aiport")]
    #[serde(rename = "aiport")]
    AiPort,
    Liveview,
    Nvr,
    Event,
    User,
    Group,

    // Recognised, not stored
    Schedule,
    RecordingSchedule,
    Ringtone,
    Keyring,
    UlpUser,
    CloudIdentity,
    UserLocation,
    DeviceGroup,

    Unknown,
}

impl ModelType {
    /// Parse a `modelKey`, case-insensitively. Unrecognised keys map to
    /// [`ModelType::Unknown`].
    pub fn from_key(key: &str) -> Self {
        key.parse().unwrap_or(Self::Unknown)
    }

    /// Key of the bootstrap array holding records of this type, and the
    /// path segment used to fetch a single record.
    ///
    /// `None` for the NVR singleton and for types the engine does not store.
    pub fn collection_key(self) -> Option<&'static str> {
        let key = match self {
            Self::Camera => "cameras",
            Self::Light => "lights",
            Self::Sensor => "sensors",
            Self::Doorlock => "doorlocks",
            Self::Chime => "chimes",
            Self::Bridge => "bridges",
            Self::Viewer => "viewers",
            Self::AiPort => "aiports",
            Self::Liveview => "liveviews",
            Self::Event => "events",
            Self::User => "users",
            Self::Group => "groups",
            _ => return None,
        };
        Some(key)
    }

    /// `true` for types held as exactly one record (the NVR itself).
    pub fn is_singleton(self) -> bool {
        self == Self::Nvr
    }

    /// `true` when updates for this type are applied to the bootstrap.
    pub fn is_mapped(self) -> bool {
        self.is_singleton() || self.collection_key().is_some()
    }

    /// `true` for physical devices whose state can be re-fetched.
    pub fn is_device(self) -> bool {
        matches!(
            self,
            Self::Camera
                | Self::Light
                | Self::Sensor
                | Self::Doorlock
                | Self::Chime
                | Self::Bridge
                | Self::Viewer
                | Self::AiPort
        )
    }

    /// Every type backed by a bootstrap collection.
    pub fn collections() -> impl Iterator<Item = Self> {
        Self::iter().filter(|t| t.collection_key().is_some())
    }
}
