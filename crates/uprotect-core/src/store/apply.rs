// ── Incremental apply ──
//
// Folds one `UpdateMessage` into a live `Bootstrap`. Applying the same
// message twice leaves the same state as applying it once: `add`
// overwrites, `update` merges a patch, `remove` of a missing id is a
// no-op, and the cursor is last-write-wins.

use tracing::{debug, trace};

use super::bootstrap::Bootstrap;
use crate::error::CoreError;
use crate::model::{Record, merge_patch};
use crate::stream::{UpdateAction, UpdateMessage};

/// What applying a message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A record was inserted or overwritten.
    Upserted,
    /// The message matched stored state exactly.
    Unchanged,
    /// A record was removed.
    Removed,
    /// `remove` for an id that was not stored.
    Absent,
    /// `add`/`update` without a payload.
    NoPayload,
    /// The model type is not stored; only the cursor moved.
    Ignored,
    /// No bootstrap is held yet; nothing to apply to.
    NoSnapshot,
}

/// Apply `msg` to `bootstrap`.
///
/// The cursor advances even when the payload turns out to be malformed:
/// the message was consumed from the stream either way.
pub fn apply(bootstrap: &Bootstrap, msg: &UpdateMessage) -> Result<ApplyOutcome, CoreError> {
    if let Some(cursor) = &msg.cursor {
        bootstrap.set_last_update_id(cursor.clone());
    }

    if !msg.model_type.is_mapped() {
        debug!(model = %msg.model_type, id = %msg.id, "ignoring update for unstored model");
        return Ok(ApplyOutcome::Ignored);
    }

    if msg.model_type.is_singleton() {
        return apply_singleton(bootstrap, msg);
    }

    match msg.action {
        UpdateAction::Remove => {
            if bootstrap.remove(msg.model_type, &msg.id) {
                debug!(model = %msg.model_type, id = %msg.id, "record removed");
                Ok(ApplyOutcome::Removed)
            } else {
                Ok(ApplyOutcome::Absent)
            }
        }
        UpdateAction::Add | UpdateAction::Update => {
            let Some(payload) = msg.payload.clone() else {
                trace!(model = %msg.model_type, id = %msg.id, action = %msg.action, "update without payload");
                return Ok(ApplyOutcome::NoPayload);
            };
            let document = match (msg.action, bootstrap.record(msg.model_type, &msg.id)) {
                (UpdateAction::Update, Some(existing)) => {
                    let mut base = serde_json::to_value(&existing)
                        .map_err(|e| CoreError::Internal(format!("re-encoding {}: {e}", msg.model_type)))?;
                    merge_patch(&mut base, payload);
                    base
                }
                _ => payload,
            };
            let record = decode(msg, document)?;
            if bootstrap.upsert(record) {
                Ok(ApplyOutcome::Upserted)
            } else {
                Ok(ApplyOutcome::Unchanged)
            }
        }
    }
}

/// The NVR record is replaced wholesale whatever the action says.
fn apply_singleton(bootstrap: &Bootstrap, msg: &UpdateMessage) -> Result<ApplyOutcome, CoreError> {
    let Some(payload) = msg.payload.clone() else {
        return Ok(ApplyOutcome::NoPayload);
    };
    let record = decode(msg, payload)?;
    if bootstrap.upsert(record) {
        debug!(id = %msg.id, "NVR record replaced");
        Ok(ApplyOutcome::Upserted)
    } else {
        Ok(ApplyOutcome::Unchanged)
    }
}

fn decode(msg: &UpdateMessage, document: serde_json::Value) -> Result<Record, CoreError> {
    let context = || format!("{} {}", msg.model_type, msg.id);
    Record::decode(msg.model_type, document)
        .map_err(|e| CoreError::malformed(context(), e))?
        .map(|r| r.with_id(&msg.id))
        .ok_or_else(|| CoreError::malformed(context(), "model has no record shape"))
}
