//! Compressed MessagePack bodies
//!
//! JSON operations may be carried as zlib-compressed MessagePack. The encoder
//! only uses the compressed form when it is strictly smaller than the JSON
//! text; decoders detect it by attempting to inflate.

use crate::errors::{AppError, AppResult};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rmpv::Value as MsgValue;
use serde_json::{Map, Number, Value};
use std::io::{Read, Write};

/// Body bytes for `value`: compressed MessagePack if smaller, otherwise JSON
pub fn smallest_body(value: &Value) -> AppResult<Vec<u8>> {
    let json = serde_json::to_vec(value)?;
    let compressed = compress(value)?;
    if compressed.len() < json.len() {
        Ok(compressed)
    } else {
        Ok(json)
    }
}

/// MessagePack-encode then zlib-compress a JSON value
pub fn compress(value: &Value) -> AppResult<Vec<u8>> {
    let mut packed = Vec::new();
    rmpv::encode::write_value(&mut packed, &json_to_msgpack(value))
        .map_err(|e| AppError::InvalidData(format!("MessagePack encoding failed: {}", e)))?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&packed)?;
    Ok(encoder.finish()?)
}

/// Inflate and decode a compressed MessagePack body, `None` if it is not one
pub fn decompress(body: &[u8]) -> Option<Value> {
    let mut packed = Vec::new();
    ZlibDecoder::new(body).read_to_end(&mut packed).ok()?;

    let mut cursor = packed.as_slice();
    let value = rmpv::decode::read_value(&mut cursor).ok()?;
    if !cursor.is_empty() {
        return None;
    }
    msgpack_to_json(value)
}

fn json_to_msgpack(value: &Value) -> MsgValue {
    match value {
        Value::Null => MsgValue::Nil,
        Value::Bool(b) => MsgValue::Boolean(*b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                MsgValue::from(u)
            } else if let Some(i) = n.as_i64() {
                MsgValue::from(i)
            } else {
                MsgValue::from(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => MsgValue::from(s.as_str()),
        Value::Array(items) => MsgValue::Array(items.iter().map(json_to_msgpack).collect()),
        Value::Object(map) => MsgValue::Map(
            map.iter()
                .map(|(k, v)| (MsgValue::from(k.as_str()), json_to_msgpack(v)))
                .collect(),
        ),
    }
}

fn msgpack_to_json(value: MsgValue) -> Option<Value> {
    Some(match value {
        MsgValue::Nil => Value::Null,
        MsgValue::Boolean(b) => Value::Bool(b),
        MsgValue::Integer(i) => {
            if let Some(u) = i.as_u64() {
                Value::from(u)
            } else {
                Value::from(i.as_i64()?)
            }
        }
        MsgValue::F32(f) => Value::Number(Number::from_f64(f as f64)?),
        MsgValue::F64(f) => Value::Number(Number::from_f64(f)?),
        MsgValue::String(s) => Value::String(s.into_str()?),
        MsgValue::Binary(bytes) => Value::String(hex::encode(bytes)),
        MsgValue::Array(items) => Value::Array(
            items
                .into_iter()
                .map(msgpack_to_json)
                .collect::<Option<Vec<_>>>()?,
        ),
        MsgValue::Map(entries) => {
            let mut map = Map::new();
            for (k, v) in entries {
                let key = match k {
                    MsgValue::String(s) => s.into_str()?,
                    other => other.to_string(),
                };
                map.insert(key, msgpack_to_json(v)?);
            }
            Value::Object(map)
        }
        MsgValue::Ext(_, _) => return None,
    })
}
