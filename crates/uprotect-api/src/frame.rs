//! Update-stream frame decoding.
//!
//! The NVR pushes binary packets made of an *action frame* followed by an
//! optional *data frame*. Each frame is an 8-byte header followed by its
//! payload:
//!
//! | byte | field |
//! |------|-------|
//! | 0 | packet type (1 = action, 2 = data) |
//! | 1 | payload format (1 = JSON, 2 = UTF-8 string, 3 = raw bytes) |
//! | 2 | deflated flag |
//! | 3 | reserved |
//! | 4..8 | payload size, big-endian `u32` |
//!
//! Text frames carry the action fields directly with an optional `data` object.

use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;

const HEADER_LEN: usize = 8;

const FORMAT_JSON: u8 = 1;
const FORMAT_STRING: u8 = 2;
const FORMAT_BUFFER: u8 = 3;

/// A frame as received from the websocket, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    Binary(Bytes),
    Text(String),
}

/// A decoded update: the action header plus its optional data payload.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateFrame {
    /// `add`, `update`, `remove` (passed through verbatim).
    pub action: String,
    /// Model discriminator, e.g. `camera`, `event`, `nvr`.
    pub model_key: String,
    pub id: String,
    /// Stream cursor after this update, if the NVR sent one.
    pub new_update_id: Option<String>,
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionHeader {
    action: Option<String>,
    model_key: Option<String>,
    id: Option<String>,
    new_update_id: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl ActionHeader {
    fn into_frame(self, data: Option<Value>) -> Result<UpdateFrame, Error> {
        let missing = |field: &str| Error::MalformedFrame(format!("action frame missing `{field}`"));
        Ok(UpdateFrame {
            action: self.action.ok_or_else(|| missing("action"))?,
            model_key: self.model_key.ok_or_else(|| missing("modelKey"))?,
            id: self.id.ok_or_else(|| missing("id"))?,
            new_update_id: self.new_update_id,
            data: data.filter(|v| !v.is_null()),
        })
    }
}

/// Decode a raw frame into an [`UpdateFrame`].
pub fn decode(frame: &RawFrame) -> Result<UpdateFrame, Error> {
    match frame {
        RawFrame::Binary(bytes) => decode_binary(bytes),
        RawFrame::Text(text) => decode_text(text),
    }
}

fn decode_text(text: &str) -> Result<UpdateFrame, Error> {
    let mut header: ActionHeader = serde_json::from_str(text)
        .map_err(|e| Error::MalformedFrame(format!("text frame is not an action object: {e}")))?;
    let data = header.data.take();
    header.into_frame(data)
}

fn decode_binary(buf: &[u8]) -> Result<UpdateFrame, Error> {
    let (action_header, action_payload, rest) = split_frame(buf)?;
    if action_header.format != FORMAT_JSON {
        return Err(Error::MalformedFrame(format!(
            "action frame has payload format {}",
            action_header.format
        )));
    }
    let header: ActionHeader = serde_json::from_slice(action_payload)
        .map_err(|e| Error::MalformedFrame(format!("action payload: {e}")))?;

    let data = if rest.len() >= HEADER_LEN {
        let (data_header, data_payload, _) = split_frame(rest)?;
        decode_data(&data_header, data_payload)?
    } else {
        None
    };

    tracing::trace!(
        packet_type = action_header.packet_type,
        size = buf.len(),
        has_data = data.is_some(),
        "decoded binary update frame"
    );

    header.into_frame(data)
}

fn decode_data(header: &FrameHeader, payload: &[u8]) -> Result<Option<Value>, Error> {
    if payload.is_empty() {
        return Ok(None);
    }
    match header.format {
        FORMAT_JSON => serde_json::from_slice(payload)
            .map(Some)
            .map_err(|e| Error::MalformedFrame(format!("data payload: {e}"))),
        FORMAT_STRING => std::str::from_utf8(payload)
            .map(|s| Some(Value::String(s.to_owned())))
            .map_err(|e| Error::MalformedFrame(format!("data payload: {e}"))),
        FORMAT_BUFFER => Ok(None),
        other => Err(Error::MalformedFrame(format!(
            "unknown data payload format {other}"
        ))),
    }
}

// ── Frame header ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHeader {
    packet_type: u8,
    format: u8,
    deflated: bool,
    size: usize,
}

/// Split `buf` into `(header, payload, remainder)`.
fn split_frame(buf: &[u8]) -> Result<(FrameHeader, &[u8], &[u8]), Error> {
    let Some((head, body)) = buf.split_first_chunk::<HEADER_LEN>() else {
        return Err(Error::MalformedFrame(format!(
            "packet too small for header ({} bytes)",
            buf.len()
        )));
    };

    let [packet_type, format, deflated, _reserved, s0, s1, s2, s3] = *head;
    let size = usize::try_from(u32::from_be_bytes([s0, s1, s2, s3]))
        .map_err(|_| Error::MalformedFrame("payload size overflows usize".into()))?;

    let header = FrameHeader {
        packet_type,
        format,
        deflated: deflated != 0,
        size,
    };
    if header.deflated {
        return Err(Error::MalformedFrame(
            "deflated payloads are not supported".into(),
        ));
    }
    if body.len() < size {
        return Err(Error::MalformedFrame(format!(
            "payload truncated: header says {size} bytes, {} available",
            body.len()
        )));
    }

    let (payload, rest) = body.split_at(size);
    Ok((header, payload, rest))
}
