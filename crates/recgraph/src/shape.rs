//! Result reshaping
//!
//! The engine answers with dotted keys (`"User.name"`), hex uids and base64
//! binaries. A record's serde shape expects plain tag names and native
//! numbers, so each returned object is rebuilt field by field before being
//! handed to `serde_json::from_value`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use recgraph_core::{parse_uid, RecgraphError, Result, TYPE_PREDICATE};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as Json};

use crate::record::Shape;
use crate::schema::{TypeDescriptor, GID_FIELD};

/// Levels of records inlined in one object, the root included
pub const MAX_DEPTH: usize = 2;

/// Decode one engine object into `T`, returning its gid
///
/// The object must carry the descriptor's type in `dgraph.type`.
pub fn decode_one<T: DeserializeOwned>(
    descriptor: &TypeDescriptor,
    object: &Json,
) -> Result<(u64, T)> {
    let object = object.as_object().ok_or(RecgraphError::NoObjectFound)?;
    if !has_type(object, Some(descriptor.name())) {
        return Err(RecgraphError::NoObjectFound);
    }

    let reshaped = reshape(descriptor, object, 1)?;
    let gid = reshaped.get(GID_FIELD).and_then(Json::as_u64).unwrap_or(0);
    let value = serde_json::from_value(Json::Object(reshaped))?;
    Ok((gid, value))
}

/// Decode every object of an engine result block
pub fn decode_many<T: DeserializeOwned>(
    descriptor: &TypeDescriptor,
    objects: &[Json],
) -> Result<(Vec<u64>, Vec<T>)> {
    let mut gids = Vec::with_capacity(objects.len());
    let mut values = Vec::with_capacity(objects.len());
    for object in objects {
        let (gid, value) = decode_one(descriptor, object)?;
        gids.push(gid);
        values.push(value);
    }
    Ok((gids, values))
}

/// Whether `dgraph.type` is non-empty, and names `expected` when given
fn has_type(object: &Map<String, Json>, expected: Option<&str>) -> bool {
    let names: Vec<&str> = match object.get(TYPE_PREDICATE) {
        Some(Json::Array(types)) => types.iter().filter_map(Json::as_str).collect(),
        Some(Json::String(t)) => vec![t.as_str()],
        _ => Vec::new(),
    };
    match expected {
        Some(name) => names.contains(&name),
        None => !names.is_empty(),
    }
}

fn reshape(
    descriptor: &TypeDescriptor,
    object: &Map<String, Json>,
    depth: usize,
) -> Result<Map<String, Json>> {
    let mut out = Map::new();

    for field in descriptor.fields() {
        let key = if field.is_gid || field.reverse.is_some() {
            field.serial.as_str()
        } else {
            field.predicate.as_str()
        };
        let Some(raw) = object.get(key) else {
            continue;
        };

        let value = match field.shape {
            Shape::Record(meta) => {
                if depth >= MAX_DEPTH {
                    continue;
                }
                let child = TypeDescriptor::derive(&meta())?;
                nested(&child, raw, depth + 1)?
            }
            Shape::RecordList(meta) => {
                if depth >= MAX_DEPTH {
                    continue;
                }
                let child = TypeDescriptor::derive(&meta())?;
                let items = match raw {
                    Json::Array(items) => items.as_slice(),
                    single => std::slice::from_ref(single),
                };
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(value) = nested(&child, item, depth + 1)? {
                        list.push(value);
                    }
                }
                Some(Json::Array(list))
            }
            shape => scalar(shape, raw)?,
        };

        if let Some(value) = value {
            out.insert(field.serial.clone(), value);
        }
    }

    Ok(out)
}

fn nested(descriptor: &TypeDescriptor, raw: &Json, depth: usize) -> Result<Option<Json>> {
    let Some(object) = raw.as_object() else {
        return Ok(None);
    };
    if !has_type(object, None) {
        return Ok(None);
    }
    Ok(Some(Json::Object(reshape(descriptor, object, depth)?)))
}

fn uid_of(raw: &Json) -> Result<Option<u64>> {
    Ok(match raw {
        Json::String(s) => Some(parse_uid(s)?),
        Json::Number(n) => n.as_u64(),
        Json::Object(map) => map.get(GID_FIELD).map(uid_of).transpose()?.flatten(),
        Json::Array(items) => items.first().map(uid_of).transpose()?.flatten(),
        _ => None,
    })
}

fn scalar(shape: Shape, raw: &Json) -> Result<Option<Json>> {
    Ok(match shape {
        Shape::Uid => uid_of(raw)?.map(Json::from),
        Shape::Uint => match raw {
            Json::String(s) => Some(Json::from(s.trim().parse::<u64>().map_err(|_| {
                RecgraphError::Codec(format!("invalid unsigned value {s:?}"))
            })?)),
            other => Some(other.clone()),
        },
        Shape::Bytes => match raw {
            Json::String(s) => {
                let bytes = STANDARD
                    .decode(s)
                    .map_err(|e| RecgraphError::Codec(format!("invalid base64: {e}")))?;
                Some(Json::from(bytes))
            }
            other => Some(other.clone()),
        },
        _ => Some(raw.clone()),
    })
}
