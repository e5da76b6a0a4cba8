//! Field codec: wire JSON to tagged [`Value`] trees and back.
//!
//! Two marker field names carry non-JSON scalars over the wire. A field named
//! [`DATA_MARKER`] holds a base64 string decoding to raw bytes; a field named
//! [`ID_MARKER`] holds a 24-hex string decoding to an [`ObjectId`] (this is
//! also the identifier key of a store reference pointer). Conversion applies
//! at every nesting depth (a marker inside an array of mappings converts at
//! every occurrence), and the markers are interpreted only here: everything
//! past this boundary dispatches on the [`Value`] tag.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use satchel_types::{Document, Fault, FaultKind, FaultResult, ObjectId, Value};

/// Marker key for binary payload fields (base64 on the wire).
pub const DATA_MARKER: &str = "dk:data";

/// Marker key for identifier fields (24-hex on the wire).
pub const ID_MARKER: &str = "$id";

/// Decode a wire JSON value into a tagged [`Value`] tree.
///
/// Absent markers are not an error; malformed text under a marker key is
/// `InvalidParameters`.
pub fn decode(json: &serde_json::Value) -> FaultResult<Value> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => Ok(decode_number(n)),
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        serde_json::Value::Array(items) => {
            let decoded: FaultResult<Vec<Value>> = items.iter().map(decode).collect();
            Ok(Value::Array(decoded?))
        }
        serde_json::Value::Object(map) => Ok(Value::Map(decode_object(map)?)),
    }
}

/// Decode a wire JSON object into a [`Document`].
pub fn decode_object(map: &serde_json::Map<String, serde_json::Value>) -> FaultResult<Document> {
    let mut document = Document::new();
    for (key, value) in map {
        let decoded = match (key.as_str(), value) {
            (DATA_MARKER, serde_json::Value::String(text)) => {
                let bytes = BASE64.decode(text).map_err(|e| {
                    Fault::with_detail(
                        FaultKind::InvalidParameters,
                        format!("bad base64 in '{DATA_MARKER}': {e}"),
                    )
                })?;
                Value::Bytes(bytes)
            }
            (ID_MARKER, serde_json::Value::String(text)) => Value::Id(ObjectId::from_hex(text)?),
            (DATA_MARKER | ID_MARKER, other) => {
                return Err(Fault::with_detail(
                    FaultKind::InvalidParameters,
                    format!("marker field '{key}' must be a string, got {other}"),
                ));
            }
            (_, other) => decode(other)?,
        };
        document.insert(key.clone(), decoded);
    }
    Ok(document)
}

fn decode_number(n: &serde_json::Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Int(i)
    } else {
        Value::Float(n.as_f64().unwrap_or(0.0))
    }
}

/// Encode a [`Value`] tree back to wire JSON.
///
/// `Bytes` re-encode to base64 and `Id` to its hex string, the only wire
/// forms either ever takes; native representations never leave the server.
pub fn encode(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::from(*n),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(bytes) => serde_json::Value::String(BASE64.encode(bytes)),
        Value::Id(id) => serde_json::Value::String(id.to_hex()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(encode).collect()),
        Value::Map(map) => serde_json::Value::Object(encode_object(map)),
    }
}

/// Encode a [`Document`] back to a wire JSON object.
pub fn encode_object(document: &Document) -> serde_json::Map<String, serde_json::Value> {
    document
        .iter()
        .map(|(key, value)| (key.clone(), encode(value)))
        .collect()
}
