//! JSON codec that survives byte arrays inside credential material.
//!
//! Byte fields serialize as `{"type":"Buffer","data":"<base64>"}`. On the
//! way back in, `data` may be either a base64 string or an array of
//! integers — both shapes occur in stores written by older sessions.
//!
//! Typed structs opt in per field with `#[serde(with = "codec::buffer")]`;
//! payloads of unknown shape go through the [`Value`]-level helpers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

const BUFFER_TAG: &str = "Buffer";

#[derive(Serialize, Deserialize)]
struct BufferRepr {
    #[serde(rename = "type")]
    kind: String,
    data: BufferData,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BufferData {
    Base64(String),
    Bytes(Vec<u8>),
}

fn to_repr(bytes: &[u8]) -> BufferRepr {
    BufferRepr {
        kind: BUFFER_TAG.to_string(),
        data: BufferData::Base64(STANDARD.encode(bytes)),
    }
}

fn from_repr(repr: BufferRepr) -> std::result::Result<Vec<u8>, String> {
    if repr.kind != BUFFER_TAG {
        return Err(format!("expected a Buffer object, got type {:?}", repr.kind));
    }
    match repr.data {
        BufferData::Base64(s) => STANDARD.decode(s.as_bytes()).map_err(|e| e.to_string()),
        BufferData::Bytes(bytes) => Ok(bytes),
    }
}

/// `#[serde(with = "...")]` module for `Vec<u8>` fields.
pub mod buffer {
    use super::*;

    pub fn serialize<S: serde::Serializer>(
        bytes: &Vec<u8>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        to_repr(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Vec<u8>, D::Error> {
        let repr = BufferRepr::deserialize(deserializer)?;
        from_repr(repr).map_err(D::Error::custom)
    }
}

/// `#[serde(with = "...")]` module for `Option<Vec<u8>>` fields.
pub mod buffer_opt {
    use super::*;

    pub fn serialize<S: serde::Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => to_repr(bytes).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<Vec<u8>>, D::Error> {
        let repr = Option::<BufferRepr>::deserialize(deserializer)?;
        repr.map(|r| from_repr(r).map_err(D::Error::custom))
            .transpose()
    }
}

/// Serialize through the codec. Byte fields must carry the `with`
/// attribute; everything else follows standard JSON rules.
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

pub fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}

/// Build the Buffer object form of a byte slice.
pub fn encode_bytes(bytes: &[u8]) -> Value {
    serde_json::to_value(to_repr(bytes)).unwrap_or(Value::Null)
}

/// Extract bytes from a value if it is a Buffer object, in either `data`
/// form.
pub fn decode_bytes(value: &Value) -> Option<Vec<u8>> {
    let repr: BufferRepr = serde_json::from_value(value.clone()).ok()?;
    from_repr(repr).ok()
}

/// Walk an arbitrary value tree and rewrite every Buffer object into the
/// canonical base64 form. Leaves everything else untouched.
pub fn normalize_value(value: &mut Value) {
    if let Some(bytes) = decode_bytes(value) {
        *value = encode_bytes(&bytes);
        return;
    }
    match value {
        Value::Object(map) => {
            for nested in map.values_mut() {
                normalize_value(nested);
            }
        }
        Value::Array(items) => {
            for nested in items.iter_mut() {
                normalize_value(nested);
            }
        }
        _ => {}
    }
}
