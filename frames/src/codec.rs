//! Protobuf encoding of [`Frame`].
//!
//! The envelope is a fixed protobuf message; the JSON payload travels as a
//! `google.protobuf.Value` tree. Protobuf has a single number kind, so integral
//! values are restored as JSON integers on decode to keep typed payloads
//! (`u32` positions, quiz ids) deserializable.

use prost::Message;
use prost_types::value::Kind;
use serde_json::{Map, Number, Value};

use crate::{Frame, Status};

/// Largest magnitude an `f64` holds without losing integer precision (2^53).
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Error returned by [`decode_frame`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The bytes are not a valid protobuf envelope.
    #[error("failed to decode protobuf frame: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The status integer does not map to a known [`Status`].
    #[error("invalid frame status: {0}")]
    InvalidStatus(i32),
}

/// Encode a frame into protobuf bytes.
#[must_use]
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let envelope = frame_to_envelope(frame);
    let mut out = Vec::with_capacity(envelope.encoded_len());
    // Writing into a growable Vec cannot run out of capacity.
    envelope.encode(&mut out).unwrap_or_default();
    out
}

/// Decode protobuf bytes into a frame.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed bytes and
/// [`CodecError::InvalidStatus`] for unknown status values.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, CodecError> {
    Envelope::decode(bytes)?.into_frame()
}

impl Status {
    fn wire(self) -> WireStatus {
        match self {
            Self::Request => WireStatus::Request,
            Self::Event => WireStatus::Event,
            Self::Done => WireStatus::Done,
            Self::Error => WireStatus::Error,
            Self::Cancel => WireStatus::Cancel,
        }
    }

    pub(crate) fn from_wire(raw: i32) -> Result<Self, CodecError> {
        let status = match WireStatus::try_from(raw) {
            Ok(WireStatus::Request) => Self::Request,
            Ok(WireStatus::Event) => Self::Event,
            Ok(WireStatus::Done) => Self::Done,
            Ok(WireStatus::Error) => Self::Error,
            Ok(WireStatus::Cancel) => Self::Cancel,
            Err(_) => return Err(CodecError::InvalidStatus(raw)),
        };
        Ok(status)
    }
}

/// Not a `From` impl: the derived `from()` getter for field 5 would shadow it.
pub(crate) fn frame_to_envelope(frame: &Frame) -> Envelope {
    Envelope {
        id: frame.id.clone(),
        parent_id: frame.parent_id.clone(),
        ts: frame.ts,
        room: frame.room.clone(),
        from: frame.from.clone(),
        syscall: frame.syscall.clone(),
        status: frame.status.wire() as i32,
        data: Some(to_proto(&frame.data)),
    }
}

impl Envelope {
    fn into_frame(self) -> Result<Frame, CodecError> {
        let status = Status::from_wire(self.status)?;
        let data = match self.data {
            Some(value) => from_proto(&value),
            None => Value::Object(Map::new()),
        };
        Ok(Frame {
            id: self.id,
            parent_id: self.parent_id,
            ts: self.ts,
            room: self.room,
            from: self.from,
            syscall: self.syscall,
            status,
            data,
        })
    }
}

pub(crate) fn to_proto(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => Kind::NullValue(prost_types::NullValue::NullValue as i32),
        Value::Bool(flag) => Kind::BoolValue(*flag),
        Value::Number(number) => Kind::NumberValue(number.as_f64().unwrap_or(0.0)),
        Value::String(text) => Kind::StringValue(text.clone()),
        Value::Array(items) => Kind::ListValue(prost_types::ListValue { values: items.iter().map(to_proto).collect() }),
        Value::Object(fields) => Kind::StructValue(prost_types::Struct {
            fields: fields.iter().map(|(key, item)| (key.clone(), to_proto(item))).collect(),
        }),
    };
    prost_types::Value { kind: Some(kind) }
}

fn from_proto(value: &prost_types::Value) -> Value {
    match &value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(flag)) => Value::Bool(*flag),
        Some(Kind::NumberValue(number)) => number_to_json(*number),
        Some(Kind::StringValue(text)) => Value::String(text.clone()),
        Some(Kind::ListValue(list)) => Value::Array(list.values.iter().map(from_proto).collect()),
        Some(Kind::StructValue(object)) => {
            Value::Object(object.fields.iter().map(|(key, item)| (key.clone(), from_proto(item))).collect())
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn number_to_json(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() <= MAX_EXACT_INTEGER {
        return Value::Number(Number::from(number as i64));
    }
    Number::from_f64(number).map_or(Value::Null, Value::Number)
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct Envelope {
    #[prost(string, tag = "1")]
    pub(crate) id: String,
    #[prost(string, optional, tag = "2")]
    pub(crate) parent_id: Option<String>,
    #[prost(int64, tag = "3")]
    pub(crate) ts: i64,
    #[prost(string, optional, tag = "4")]
    pub(crate) room: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub(crate) from: Option<String>,
    #[prost(string, tag = "6")]
    pub(crate) syscall: String,
    #[prost(enumeration = "WireStatus", tag = "7")]
    pub(crate) status: i32,
    #[prost(message, optional, tag = "8")]
    pub(crate) data: Option<prost_types::Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub(crate) enum WireStatus {
    Request = 0,
    Done = 1,
    Error = 2,
    Cancel = 3,
    Event = 4,
}
