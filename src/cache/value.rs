//! Cache Value Module
//!
//! Closed set of payload kinds the cache stores, with the size heuristic and
//! the byte encoding used for compression.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Size assumed for a value whose JSON encoding fails.
const FALLBACK_SIZE: u64 = 100;

// == Cache Value ==
/// Opaque cached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CacheValue {
    Text(String),
    Bytes(#[serde(with = "hex::serde")] Vec<u8>),
    Int(i64),
    /// Non-finite values are stored as `"NaN"`, `"inf"` or `"-inf"`
    Float(#[serde(with = "float_repr")] f64),
    Bool(bool),
    /// Structured data such as version metadata or audit results
    Json(serde_json::Value),
}

impl CacheValue {
    /// Wraps any serializable value as structured JSON.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        Ok(CacheValue::Json(serde_json::to_value(value)?))
    }

    /// Decodes a structured value back into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let json = match self {
            CacheValue::Json(v) => v.clone(),
            other => other.as_json_scalar(),
        };
        Ok(serde_json::from_value(json)?)
    }

    /// Short name of the variant, matching the serialized tag.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheValue::Text(_) => "text",
            CacheValue::Bytes(_) => "bytes",
            CacheValue::Int(_) => "int",
            CacheValue::Float(_) => "float",
            CacheValue::Bool(_) => "bool",
            CacheValue::Json(_) => "json",
        }
    }

    // == Size Heuristic ==
    /// Estimated in-memory size in bytes.
    ///
    /// Text and bytes count their length, scalars use fixed widths and
    /// structured values use the length of their JSON encoding.
    pub fn estimated_size(&self) -> u64 {
        match self {
            CacheValue::Text(s) => s.len() as u64,
            CacheValue::Bytes(b) => b.len() as u64,
            CacheValue::Int(_) | CacheValue::Float(_) => 8,
            CacheValue::Bool(_) => 1,
            CacheValue::Json(v) => serde_json::to_vec(v)
                .map(|b| b.len() as u64)
                .unwrap_or(FALLBACK_SIZE),
        }
    }

    // == Byte Encoding ==
    /// Encodes the value for compression: text and bytes raw, the rest as JSON.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            CacheValue::Text(s) => Ok(s.as_bytes().to_vec()),
            CacheValue::Bytes(b) => Ok(b.clone()),
            CacheValue::Int(i) => Ok(serde_json::to_vec(i)?),
            CacheValue::Float(f) => Ok(f.to_string().into_bytes()),
            CacheValue::Bool(b) => Ok(serde_json::to_vec(b)?),
            CacheValue::Json(v) => Ok(serde_json::to_vec(v)?),
        }
    }

    /// Inverse of [`CacheValue::to_bytes`] given the original kind.
    pub fn from_bytes(kind: &str, bytes: Vec<u8>) -> Result<Self> {
        let value = match kind {
            "text" => CacheValue::Text(
                String::from_utf8(bytes).map_err(|e| CacheError::Compression(e.to_string()))?,
            ),
            "bytes" => CacheValue::Bytes(bytes),
            "int" => CacheValue::Int(serde_json::from_slice(&bytes)?),
            "float" => CacheValue::Float(
                std::str::from_utf8(&bytes)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| CacheError::Compression("invalid float payload".into()))?,
            ),
            "bool" => CacheValue::Bool(serde_json::from_slice(&bytes)?),
            "json" => CacheValue::Json(serde_json::from_slice(&bytes)?),
            other => {
                return Err(CacheError::Compression(format!(
                    "unknown value kind: {}",
                    other
                )))
            }
        };
        Ok(value)
    }

    fn as_json_scalar(&self) -> serde_json::Value {
        match self {
            CacheValue::Text(s) => serde_json::Value::from(s.as_str()),
            CacheValue::Bytes(b) => serde_json::Value::from(b.clone()),
            CacheValue::Int(i) => serde_json::Value::from(*i),
            CacheValue::Float(f) => serde_json::Value::from(*f),
            CacheValue::Bool(b) => serde_json::Value::from(*b),
            CacheValue::Json(v) => v.clone(),
        }
    }
}

// == Float Encoding ==
/// JSON has no NaN or infinity, so those travel as strings.
mod float_repr {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(&value.to_string())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(s) => s
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("invalid float: {}", s))),
        }
    }
}

impl From<String> for CacheValue {
    fn from(s: String) -> Self {
        CacheValue::Text(s)
    }
}

impl From<&str> for CacheValue {
    fn from(s: &str) -> Self {
        CacheValue::Text(s.to_string())
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(b: Vec<u8>) -> Self {
        CacheValue::Bytes(b)
    }
}

impl From<i64> for CacheValue {
    fn from(i: i64) -> Self {
        CacheValue::Int(i)
    }
}

impl From<f64> for CacheValue {
    fn from(f: f64) -> Self {
        CacheValue::Float(f)
    }
}

impl From<bool> for CacheValue {
    fn from(b: bool) -> Self {
        CacheValue::Bool(b)
    }
}

impl From<serde_json::Value> for CacheValue {
    fn from(v: serde_json::Value) -> Self {
        CacheValue::Json(v)
    }
}
