//! Tagged value union and predicate kinds
//!
//! `Value` is the store-level representation of a single posting. Each value
//! carries exactly one variant; the binary variants (`VFloat`, `DateTime`,
//! `Geo`) use fixed little-endian encodings so that they survive the trip
//! through the engine unchanged.

use std::fmt;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::{RecgraphError, Result};

/// Encoded length of a `DateTime` value: seconds, nanos, offset
const DATETIME_LEN: usize = 8 + 4 + 4;

// ============================================================================
// Predicate kinds
// ============================================================================

/// Value kind of a predicate, fixed at schema time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredicateKind {
    String,
    Int,
    Uid,
    Bool,
    Float,
    Binary,
    DateTime,
    Geo,
    VFloat,
    Default,
}

impl PredicateKind {
    /// Name used in DQL schema files
    pub fn schema_name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Uid => "uid",
            Self::Bool => "bool",
            Self::Float => "float",
            Self::Binary => "binary",
            Self::DateTime => "datetime",
            Self::Geo => "geo",
            Self::VFloat => "float32vector",
            Self::Default => "default",
        }
    }

    /// Parse a DQL schema type name
    pub fn from_schema_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" | "password" => Self::String,
            "int" => Self::Int,
            "uid" => Self::Uid,
            "bool" => Self::Bool,
            "float" => Self::Float,
            "binary" => Self::Binary,
            "datetime" | "dateTime" => Self::DateTime,
            "geo" => Self::Geo,
            "float32vector" | "vfloat" => Self::VFloat,
            "default" => Self::Default,
            _ => return None,
        })
    }

    /// Kinds whose filter literals must be quoted in DQL
    pub fn is_quoted(self) -> bool {
        matches!(
            self,
            Self::String | Self::Default | Self::DateTime | Self::Geo | Self::Binary
        )
    }
}

impl fmt::Display for PredicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema_name())
    }
}

// ============================================================================
// Value union
// ============================================================================

/// A single value as stored by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum Value {
    Str(String),
    Int(i64),
    Uid(u64),
    Bool(bool),
    Double(f64),
    /// Little-endian packed `f32` array
    VFloat(Vec<u8>),
    Bytes(Vec<u8>),
    /// Binary datetime, see [`encode_datetime`]
    DateTime(Vec<u8>),
    /// WKB geometry, see [`crate::geo`]
    Geo(Vec<u8>),
    /// Stringified fallback, converted by the engine to the predicate's kind
    Default(String),
}

impl Value {
    /// Kind this value carries natively
    pub fn kind(&self) -> PredicateKind {
        match self {
            Self::Str(_) => PredicateKind::String,
            Self::Int(_) => PredicateKind::Int,
            Self::Uid(_) => PredicateKind::Uid,
            Self::Bool(_) => PredicateKind::Bool,
            Self::Double(_) => PredicateKind::Float,
            Self::VFloat(_) => PredicateKind::VFloat,
            Self::Bytes(_) => PredicateKind::Binary,
            Self::DateTime(_) => PredicateKind::DateTime,
            Self::Geo(_) => PredicateKind::Geo,
            Self::Default(_) => PredicateKind::Default,
        }
    }

    /// Convert this value to the given kind, the way the engine coerces
    /// values written to a typed predicate.
    pub fn convert(self, kind: PredicateKind) -> Result<Value> {
        if self.kind() == kind || kind == PredicateKind::Default {
            return Ok(self);
        }

        let mismatch = |v: &Value| {
            RecgraphError::Codec(format!("cannot convert {} value to {kind}", v.kind()))
        };

        match (self, kind) {
            (Value::Default(s) | Value::Str(s), PredicateKind::String) => Ok(Value::Str(s)),
            (Value::Default(s) | Value::Str(s), PredicateKind::Int) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| RecgraphError::Codec(format!("cannot parse {s:?} as int"))),
            (Value::Default(s) | Value::Str(s), PredicateKind::Float) => s
                .trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| RecgraphError::Codec(format!("cannot parse {s:?} as float"))),
            (Value::Default(s) | Value::Str(s), PredicateKind::Bool) => match s.trim() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                other => Err(RecgraphError::Codec(format!("cannot parse {other:?} as bool"))),
            },
            (Value::Default(s) | Value::Str(s), PredicateKind::DateTime) => {
                let parsed = parse_datetime(&s)?;
                Ok(Value::DateTime(encode_datetime(&parsed)))
            }
            (Value::Default(s) | Value::Str(s), PredicateKind::VFloat) => {
                let floats: Vec<f32> = serde_json::from_str(s.trim())
                    .map_err(|e| RecgraphError::Codec(format!("cannot parse {s:?} as vector: {e}")))?;
                Ok(Value::VFloat(pack_f32(&floats)))
            }
            (Value::Default(s) | Value::Str(s), PredicateKind::Geo) => {
                let json: serde_json::Value = serde_json::from_str(s.trim())
                    .map_err(|e| RecgraphError::Geo(format!("invalid geojson {s:?}: {e}")))?;
                crate::geo::geojson_to_wkb(&json)?
                    .map(Value::Geo)
                    .ok_or_else(|| RecgraphError::Geo(format!("empty geometry {s:?}")))
            }
            (Value::Default(s) | Value::Str(s), PredicateKind::Uid) => {
                crate::parse_uid(&s).map(Value::Uid)
            }
            (Value::Int(i), PredicateKind::Float) => Ok(Value::Double(i as f64)),
            (Value::Int(i), PredicateKind::String) => Ok(Value::Str(i.to_string())),
            (Value::Int(i), PredicateKind::Bool) => Ok(Value::Bool(i != 0)),
            (Value::Double(f), PredicateKind::Int) if f.fract() == 0.0 => Ok(Value::Int(f as i64)),
            (Value::Double(f), PredicateKind::String) => Ok(Value::Str(f.to_string())),
            (Value::Bool(b), PredicateKind::String) => Ok(Value::Str(b.to_string())),
            (Value::Bytes(b), PredicateKind::String) => String::from_utf8(b)
                .map(Value::Str)
                .map_err(|e| RecgraphError::Codec(e.to_string())),
            (Value::Str(s), PredicateKind::Binary) => Ok(Value::Bytes(s.into_bytes())),
            (other, _) => Err(mismatch(&other)),
        }
    }

    /// Whether this value is the zero value of its kind
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Str(s) | Self::Default(s) => s.is_empty(),
            Self::Int(i) => *i == 0,
            Self::Uid(u) => *u == 0,
            Self::Bool(b) => !b,
            Self::Double(f) => *f == 0.0,
            Self::VFloat(b) | Self::Bytes(b) | Self::DateTime(b) | Self::Geo(b) => b.is_empty(),
        }
    }
}

// ============================================================================
// Float vectors
// ============================================================================

/// Pack an `f32` slice into little-endian bytes
pub fn pack_f32(values: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 4);
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

/// Unpack little-endian bytes into an `f32` vector
pub fn unpack_f32(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(RecgraphError::Codec(format!(
            "float vector byte length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

// ============================================================================
// Datetimes
// ============================================================================

/// Binary datetime encoding: i64 unix seconds, u32 nanos, i32 UTC offset seconds
pub fn encode_datetime(dt: &DateTime<FixedOffset>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(DATETIME_LEN);
    // Writes into a Vec cannot fail
    let _ = buf.write_i64::<LittleEndian>(dt.timestamp());
    let _ = buf.write_u32::<LittleEndian>(dt.timestamp_subsec_nanos());
    let _ = buf.write_i32::<LittleEndian>(dt.offset().local_minus_utc());
    buf
}

/// Parse RFC 3339, falling back to the shorter forms found in RDF dumps:
/// `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD` and `YYYY` (all taken as UTC)
pub fn parse_datetime(text: &str) -> Result<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt);
    }
    let utc = FixedOffset::east_opt(0)
        .ok_or_else(|| RecgraphError::Codec("invalid utc offset".to_string()))?;
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .or_else(|| {
            text.parse::<i32>()
                .ok()
                .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| RecgraphError::Codec(format!("cannot parse {text:?} as datetime")))?;
    Ok(utc.from_utc_datetime(&naive))
}

/// Decode a datetime written by [`encode_datetime`]
pub fn decode_datetime(bytes: &[u8]) -> Result<DateTime<FixedOffset>> {
    if bytes.len() != DATETIME_LEN {
        return Err(RecgraphError::Codec(format!(
            "datetime encoding must be {DATETIME_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    let mut cur = Cursor::new(bytes);
    let secs = cur.read_i64::<LittleEndian>()?;
    let nanos = cur.read_u32::<LittleEndian>()?;
    let offset = cur.read_i32::<LittleEndian>()?;

    let tz = FixedOffset::east_opt(offset)
        .ok_or_else(|| RecgraphError::Codec(format!("invalid utc offset {offset}")))?;
    tz.timestamp_opt(secs, nanos)
        .single()
        .ok_or_else(|| RecgraphError::Codec(format!("invalid timestamp {secs}.{nanos}")))
}

// ============================================================================
// Tests
// ============================================================================
