//! Message validation and the reading → signal transformation.
//!
//! Both functions are pure: no I/O, no logging, safe to call concurrently.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::contract::{Message, NewSignal, RawReading};
use crate::error::{MalformedReason, TransformError};

/// Parse a raw delivery body into a typed [`Message`].
///
/// The body must be a JSON object with exactly one non-empty key whose value has the
/// `{ data: [...], time: <integer> }` shape.
pub fn parse_message(payload: &[u8]) -> Result<Message, MalformedReason> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| MalformedReason::InvalidJson(e.to_string()))?;

    let Value::Object(map) = value else {
        return Err(MalformedReason::NotAnObject);
    };

    match map.len() {
        0 => return Err(MalformedReason::MissingDeviceId),
        1 => {}
        n => return Err(MalformedReason::MultipleDeviceIds(n)),
    }

    let (device_id, raw) = map
        .into_iter()
        .next()
        .ok_or(MalformedReason::MissingDeviceId)?;

    if device_id.is_empty() {
        return Err(MalformedReason::EmptyDeviceId);
    }

    let reading: RawReading =
        serde_json::from_value(raw).map_err(|e| MalformedReason::InvalidReading {
            device_id: device_id.clone(),
            detail: e.to_string(),
        })?;

    Ok(Message { device_id, reading })
}

/// Derive the persisted-signal candidate from a message.
pub fn transform(message: &Message) -> Result<NewSignal, TransformError> {
    if message.device_id.is_empty() {
        return Err(MalformedReason::EmptyDeviceId.into());
    }

    let reading = &message.reading;
    let time = DateTime::<Utc>::from_timestamp_millis(reading.time).ok_or_else(|| {
        MalformedReason::TimeOutOfRange {
            device_id: message.device_id.clone(),
            time: reading.time,
        }
    })?;

    let data_volume = canonical_encode(reading)?.len();

    Ok(NewSignal {
        device_id: message.device_id.clone(),
        time,
        data_length: reading.data.len() as i64,
        data_volume: data_volume as i64,
    })
}

/// Deterministic JSON encoding of a reading: `data` then `time`, object keys sorted at every
/// depth. The whole reading is measured, `time` included.
pub fn canonical_encode(reading: &RawReading) -> Result<Vec<u8>, serde_json::Error> {
    let canonical = RawReading {
        data: reading.data.iter().map(canonicalize).collect(),
        time: reading.time,
    };
    serde_json::to_vec(&canonical)
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Value::Object(
                keys.into_iter()
                    .map(|key| (key.clone(), canonicalize(&map[key])))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
