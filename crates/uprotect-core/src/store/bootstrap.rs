// ── Bootstrap snapshot ──
//
// The full NVR state: one record collection per stored model type, the
// NVR singleton, and the update-stream cursor. A `Bootstrap` is shared
// behind an `Arc`; incremental updates mutate it in place through the
// collections' interior mutability, and a refresh swaps in a new one.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use uprotect_api::RawBootstrap;

use super::collection::RecordCollection;
use crate::model::{
    AiPort, Bridge, Camera, Chime, Doorlock, Event, Group, Light, Liveview, ModelType, Nvr,
    Record, Sensor, User, Viewer,
};

/// Live NVR state.
pub struct Bootstrap {
    pub cameras: RecordCollection<Camera>,
    pub lights: RecordCollection<Light>,
    pub sensors: RecordCollection<Sensor>,
    pub doorlocks: RecordCollection<Doorlock>,
    pub chimes: RecordCollection<Chime>,
    pub bridges: RecordCollection<Bridge>,
    pub viewers: RecordCollection<Viewer>,
    pub aiports: RecordCollection<AiPort>,
    pub liveviews: RecordCollection<Liveview>,
    pub events: RecordCollection<Event>,
    pub users: RecordCollection<User>,
    pub groups: RecordCollection<Group>,

    nvr: ArcSwapOption<Nvr>,
    last_update_id: ArcSwapOption<String>,
    auth_user_id: Option<String>,
    access_key: Option<String>,
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self {
            cameras: RecordCollection::new(),
            lights: RecordCollection::new(),
            sensors: RecordCollection::new(),
            doorlocks: RecordCollection::new(),
            chimes: RecordCollection::new(),
            bridges: RecordCollection::new(),
            viewers: RecordCollection::new(),
            aiports: RecordCollection::new(),
            liveviews: RecordCollection::new(),
            events: RecordCollection::new(),
            users: RecordCollection::new(),
            groups: RecordCollection::new(),
            nvr: ArcSwapOption::empty(),
            last_update_id: ArcSwapOption::empty(),
            auth_user_id: None,
            access_key: None,
        }
    }
}

impl std::fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrap")
            .field("last_update_id", &self.last_update_id())
            .field("records", &self.total_records())
            .finish_non_exhaustive()
    }
}

impl Bootstrap {
    /// Build typed state from a raw `/bootstrap` response.
    ///
    /// A record that fails to decode is logged and skipped; it never
    /// fails the whole snapshot.
    pub fn from_raw(raw: RawBootstrap) -> Self {
        let RawBootstrap {
            auth_user_id,
            access_key,
            last_update_id,
            nvr,
            mut collections,
        } = raw;

        let bootstrap = Self {
            auth_user_id,
            access_key,
            ..Self::default()
        };

        if let Some(cursor) = last_update_id {
            bootstrap.set_last_update_id(cursor);
        }

        match nvr.map(serde_json::from_value::<Nvr>) {
            Some(Ok(nvr)) => {
                bootstrap.set_nvr(nvr);
            }
            Some(Err(e)) => warn!(error = %e, "skipping undecodable NVR record"),
            None => debug!("bootstrap carried no NVR record"),
        }

        for model_type in ModelType::collections() {
            let Some(key) = model_type.collection_key() else {
                continue;
            };
            let Some(Value::Array(items)) = collections.remove(key) else {
                continue;
            };
            for item in items {
                let id = item.get("id").and_then(Value::as_str).unwrap_or("?").to_owned();
                match Record::decode(model_type, item) {
                    Ok(Some(record)) if !record.id().is_empty() => {
                        bootstrap.upsert(record);
                    }
                    Ok(_) => debug!(model = %model_type, "skipping bootstrap record without id"),
                    Err(e) => warn!(
                        model = %model_type,
                        id = %id,
                        error = %e,
                        "skipping undecodable bootstrap record"
                    ),
                }
            }
        }

        debug!(
            records = bootstrap.total_records(),
            cursor = ?bootstrap.last_update_id(),
            "bootstrap decoded"
        );
        bootstrap
    }

    // ── Scalars ──────────────────────────────────────────────────────

    pub fn nvr(&self) -> Option<Arc<Nvr>> {
        self.nvr.load_full()
    }

    /// Replace the NVR singleton wholesale.
    pub(crate) fn set_nvr(&self, nvr: Nvr) -> bool {
        if self.nvr.load().as_deref() == Some(&nvr) {
            return false;
        }
        self.nvr.store(Some(Arc::new(nvr)));
        true
    }

    /// Cursor the update stream resumes from.
    pub fn last_update_id(&self) -> Option<String> {
        self.last_update_id.load().as_deref().cloned()
    }

    pub(crate) fn set_last_update_id(&self, cursor: String) {
        self.last_update_id.store(Some(Arc::new(cursor)));
    }

    pub fn auth_user_id(&self) -> Option<&str> {
        self.auth_user_id.as_deref()
    }

    pub fn access_key(&self) -> Option<&str> {
        self.access_key.as_deref()
    }

    // ── Typed dispatch ───────────────────────────────────────────────

    /// Insert or overwrite a record under its id. Returns `true` if the
    /// stored state changed.
    pub(crate) fn upsert(&self, record: Record) -> bool {
        let id = record.id().to_owned();
        match record {
            Record::Camera(r) => self.cameras.upsert(id, r),
            Record::Light(r) => self.lights.upsert(id, r),
            Record::Sensor(r) => self.sensors.upsert(id, r),
            Record::Doorlock(r) => self.doorlocks.upsert(id, r),
            Record::Chime(r) => self.chimes.upsert(id, r),
            Record::Bridge(r) => self.bridges.upsert(id, r),
            Record::Viewer(r) => self.viewers.upsert(id, r),
            Record::AiPort(r) => self.aiports.upsert(id, r),
            Record::Liveview(r) => self.liveviews.upsert(id, r),
            Record::Event(r) => self.events.upsert(id, r),
            Record::User(r) => self.users.upsert(id, r),
            Record::Group(r) => self.groups.upsert(id, r),
            Record::Nvr(r) => self.set_nvr(r),
        }
    }

    /// Remove a record. Returns `true` if it existed.
    pub(crate) fn remove(&self, model_type: ModelType, id: &str) -> bool {
        match model_type {
            ModelType::Camera => self.cameras.remove(id).is_some(),
            ModelType::Light => self.lights.remove(id).is_some(),
            ModelType::Sensor => self.sensors.remove(id).is_some(),
            ModelType::Doorlock => self.doorlocks.remove(id).is_some(),
            ModelType::Chime => self.chimes.remove(id).is_some(),
            ModelType::Bridge => self.bridges.remove(id).is_some(),
            ModelType::Viewer => self.viewers.remove(id).is_some(),
            ModelType::AiPort => self.aiports.remove(id).is_some(),
            ModelType::Liveview => self.liveviews.remove(id).is_some(),
            ModelType::Event => self.events.remove(id).is_some(),
            ModelType::User => self.users.remove(id).is_some(),
            ModelType::Group => self.groups.remove(id).is_some(),
            _ => false,
        }
    }

    /// Look up any stored record.
    pub fn record(&self, model_type: ModelType, id: &str) -> Option<Record> {
        fn owned<T: Clone>(r: Option<Arc<T>>) -> Option<T> {
            r.map(|r| T::clone(&r))
        }
        match model_type {
            ModelType::Camera => owned(self.cameras.get(id)).map(Record::Camera),
            ModelType::Light => owned(self.lights.get(id)).map(Record::Light),
            ModelType::Sensor => owned(self.sensors.get(id)).map(Record::Sensor),
            ModelType::Doorlock => owned(self.doorlocks.get(id)).map(Record::Doorlock),
            ModelType::Chime => owned(self.chimes.get(id)).map(Record::Chime),
            ModelType::Bridge => owned(self.bridges.get(id)).map(Record::Bridge),
            ModelType::Viewer => owned(self.viewers.get(id)).map(Record::Viewer),
            ModelType::AiPort => owned(self.aiports.get(id)).map(Record::AiPort),
            ModelType::Liveview => owned(self.liveviews.get(id)).map(Record::Liveview),
            ModelType::Event => owned(self.events.get(id)).map(Record::Event),
            ModelType::User => owned(self.users.get(id)).map(Record::User),
            ModelType::Group => owned(self.groups.get(id)).map(Record::Group),
            ModelType::Nvr => owned(self.nvr()).filter(|n| n.id == id).map(Record::Nvr),
            _ => None,
        }
    }

    /// Record count per stored collection.
    pub fn counts(&self) -> BTreeMap<ModelType, usize> {
        ModelType::collections()
            .map(|t| (t, self.len_of(t)))
            .collect()
    }

    pub fn total_records(&self) -> usize {
        ModelType::collections().map(|t| self.len_of(t)).sum()
    }

    fn len_of(&self, model_type: ModelType) -> usize {
        match model_type {
            ModelType::Camera => self.cameras.len(),
            ModelType::Light => self.lights.len(),
            ModelType::Sensor => self.sensors.len(),
            ModelType::Doorlock => self.doorlocks.len(),
            ModelType::Chime => self.chimes.len(),
            ModelType::Bridge => self.bridges.len(),
            ModelType::Viewer => self.viewers.len(),
            ModelType::AiPort => self.aiports.len(),
            ModelType::Liveview => self.liveviews.len(),
            ModelType::Event => self.events.len(),
            ModelType::User => self.users.len(),
            ModelType::Group => self.groups.len(),
            _ => 0,
        }
    }

    /// Point-in-time copy of the whole state, comparable and serializable.
    pub fn snapshot(&self) -> BootstrapSnapshot {
        BootstrapSnapshot {
            auth_user_id: self.auth_user_id.clone(),
            last_update_id: self.last_update_id(),
            nvr: self.nvr(),
            cameras: self.cameras.to_sorted(),
            lights: self.lights.to_sorted(),
            sensors: self.sensors.to_sorted(),
            doorlocks: self.doorlocks.to_sorted(),
            chimes: self.chimes.to_sorted(),
            bridges: self.bridges.to_sorted(),
            viewers: self.viewers.to_sorted(),
            aiports: self.aiports.to_sorted(),
            liveviews: self.liveviews.to_sorted(),
            events: self.events.to_sorted(),
            users: self.users.to_sorted(),
            groups: self.groups.to_sorted(),
        }
    }
}

/// Immutable copy of a [`Bootstrap`]. The access key is never included.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapSnapshot {
    pub auth_user_id: Option<String>,
    pub last_update_id: Option<String>,
    pub nvr: Option<Arc<Nvr>>,
    pub cameras: BTreeMap<String, Arc<Camera>>,
    pub lights: BTreeMap<String, Arc<Light>>,
    pub sensors: BTreeMap<String, Arc<Sensor>>,
    pub doorlocks: BTreeMap<String, Arc<Doorlock>>,
    pub chimes: BTreeMap<String, Arc<Chime>>,
    pub bridges: BTreeMap<String, Arc<Bridge>>,
    pub viewers: BTreeMap<String, Arc<Viewer>>,
    pub aiports: BTreeMap<String, Arc<AiPort>>,
    pub liveviews: BTreeMap<String, Arc<Liveview>>,
    pub events: BTreeMap<String, Arc<Event>>,
    pub users: BTreeMap<String, Arc<User>>,
    pub groups: BTreeMap<String, Arc<Group>>,
}
