// ── Typed update messages ──

use serde::Serialize;
use serde_json::Value;
use strum::{Display, EnumString};
use uprotect_api::UpdateFrame;

use crate::error::CoreError;
use crate::model::ModelType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
    Add,
    Update,
    Remove,
}

/// One incremental change pushed by the NVR.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    pub action: UpdateAction,
    pub model_type: ModelType,
    pub id: String,
    /// Full record for `add`, changed fields for `update`, usually absent
    /// for `remove`.
    pub payload: Option<Value>,
    /// Stream cursor after this update.
    pub cursor: Option<String>,
}

impl UpdateMessage {
    pub fn new(action: UpdateAction, model_type: ModelType, id: impl Into<String>) -> Self {
        Self {
            action,
            model_type,
            id: id.into(),
            payload: None,
            cursor: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}

impl TryFrom<UpdateFrame> for UpdateMessage {
    type Error = CoreError;

    fn try_from(frame: UpdateFrame) -> Result<Self, Self::Error> {
        let action = frame
            .action
            .parse()
            .map_err(|_| CoreError::malformed("update frame", format!("unknown action `{}`", frame.action)))?;
        Ok(Self {
            action,
            model_type: ModelType::from_key(&frame.model_key),
            id: frame.id,
            payload: frame.data,
            cursor: frame.new_update_id,
        })
    }
}
