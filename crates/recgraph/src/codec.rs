//! Field value codec
//!
//! Maps a field's serde JSON value to the engine's tagged [`Value`], guided by
//! the field's declared [`Shape`]. Zero values (`""`, `0`, `false`, empty
//! vectors, empty geometries, the Unix epoch, `null`) encode to `None` and are
//! never written.

use chrono::DateTime;
use recgraph_core::geo::{encode_point, encode_polygon};
use recgraph_core::value::{encode_datetime, pack_f32};
use recgraph_core::{Point, Polygon, PredicateKind, RecgraphError, Result, Value};
use serde_json::Value as Json;

use crate::record::Shape;

/// Predicate kind a field shape is stored as
pub fn kind_of(shape: Shape) -> Result<PredicateKind> {
    Ok(match shape {
        Shape::String => PredicateKind::String,
        Shape::Bool => PredicateKind::Bool,
        Shape::Int | Shape::Uint => PredicateKind::Int,
        Shape::Uid | Shape::Record(_) | Shape::RecordList(_) => PredicateKind::Uid,
        Shape::Float => PredicateKind::Float,
        Shape::F32Vec | Shape::F64Vec => PredicateKind::VFloat,
        Shape::Bytes => PredicateKind::Binary,
        Shape::Time => PredicateKind::DateTime,
        Shape::Point | Shape::Polygon => PredicateKind::Geo,
        Shape::Unsupported(name) => return Err(RecgraphError::UnsupportedType(name.to_string())),
    })
}

fn expected(shape: Shape, json: &Json) -> RecgraphError {
    RecgraphError::Codec(format!("expected {} value, got {json}", shape.name()))
}

/// Encode one scalar field, `None` for zero values
pub fn encode(shape: Shape, json: &Json) -> Result<Option<Value>> {
    if json.is_null() {
        return Ok(None);
    }

    let value = match shape {
        Shape::String => {
            let s = json.as_str().ok_or_else(|| expected(shape, json))?;
            (!s.is_empty()).then(|| Value::Str(s.to_string()))
        }
        Shape::Bool => {
            let b = json.as_bool().ok_or_else(|| expected(shape, json))?;
            b.then_some(Value::Bool(true))
        }
        Shape::Int => {
            let i = json.as_i64().ok_or_else(|| expected(shape, json))?;
            (i != 0).then_some(Value::Int(i))
        }
        Shape::Uid => {
            let u = json.as_u64().ok_or_else(|| expected(shape, json))?;
            (u != 0).then_some(Value::Uid(u))
        }
        Shape::Uint => {
            let u = json.as_u64().ok_or_else(|| expected(shape, json))?;
            (u != 0).then(|| Value::Default(u.to_string()))
        }
        Shape::Float => {
            let f = json.as_f64().ok_or_else(|| expected(shape, json))?;
            (f != 0.0).then_some(Value::Double(f))
        }
        Shape::F32Vec | Shape::F64Vec => {
            let floats = float_array(shape, json)?;
            (!floats.is_empty()).then(|| Value::VFloat(pack_f32(&floats)))
        }
        Shape::Bytes => {
            let bytes: Vec<u8> = serde_json::from_value(json.clone())?;
            (!bytes.is_empty()).then_some(Value::Bytes(bytes))
        }
        Shape::Time => {
            let text = json.as_str().ok_or_else(|| expected(shape, json))?;
            let dt = DateTime::parse_from_rfc3339(text)
                .map_err(|e| RecgraphError::Codec(format!("invalid datetime {text:?}: {e}")))?;
            let zero = dt.timestamp() == 0 && dt.timestamp_subsec_nanos() == 0;
            (!zero).then(|| Value::DateTime(encode_datetime(&dt)))
        }
        Shape::Point => {
            let point: Point = serde_json::from_value(json.clone())
                .map_err(|e| RecgraphError::Geo(e.to_string()))?;
            encode_point(&point)?.map(Value::Geo)
        }
        Shape::Polygon => {
            let polygon: Polygon = serde_json::from_value(json.clone())
                .map_err(|e| RecgraphError::Geo(e.to_string()))?;
            encode_polygon(&polygon)?.map(Value::Geo)
        }
        Shape::Record(_) | Shape::RecordList(_) => {
            return Err(RecgraphError::Codec(
                "record fields are written as edges".to_string(),
            ))
        }
        Shape::Unsupported(name) => return Err(RecgraphError::UnsupportedType(name.to_string())),
    };
    Ok(value)
}

/// Each element narrowed to `f32`
fn float_array(shape: Shape, json: &Json) -> Result<Vec<f32>> {
    json.as_array()
        .ok_or_else(|| expected(shape, json))?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32).ok_or_else(|| expected(shape, v)))
        .collect()
}

/// Literal used to look a value up through an `eq` filter
pub fn filter_literal(value: &Value) -> Option<String> {
    Some(match value {
        Value::Str(s) | Value::Default(s) => recgraph_query::quote(s),
        Value::Int(i) => i.to_string(),
        Value::Uid(u) => u.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Double(f) => f.to_string(),
        Value::DateTime(bytes) => {
            let dt = recgraph_core::value::decode_datetime(bytes).ok()?;
            recgraph_query::quote(&dt.to_rfc3339())
        }
        Value::VFloat(_) | Value::Bytes(_) | Value::Geo(_) => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use recgraph_core::value::{decode_datetime, unpack_f32};
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(encode(Shape::String, &json!("A")).unwrap(), Some(Value::Str("A".into())));
        assert_eq!(encode(Shape::Int, &json!(10)).unwrap(), Some(Value::Int(10)));
        assert_eq!(encode(Shape::Uid, &json!(7)).unwrap(), Some(Value::Uid(7)));
        assert_eq!(encode(Shape::Bool, &json!(true)).unwrap(), Some(Value::Bool(true)));
        assert_eq!(encode(Shape::Float, &json!(1.5)).unwrap(), Some(Value::Double(1.5)));
    }

    #[test]
    fn test_zero_values_are_absent() {
        assert_eq!(encode(Shape::String, &json!("")).unwrap(), None);
        assert_eq!(encode(Shape::Int, &json!(0)).unwrap(), None);
        assert_eq!(encode(Shape::Bool, &json!(false)).unwrap(), None);
        assert_eq!(encode(Shape::F32Vec, &json!([])).unwrap(), None);
        assert_eq!(encode(Shape::Point, &json!({"coordinates": []})).unwrap(), None);
        assert_eq!(encode(Shape::Time, &json!("1970-01-01T00:00:00Z")).unwrap(), None);
        assert_eq!(encode(Shape::String, &Json::Null).unwrap(), None);
    }

    #[test]
    fn test_uint_is_stringified_default() {
        assert_eq!(
            encode(Shape::Uint, &json!(42)).unwrap(),
            Some(Value::Default("42".into()))
        );
        assert_eq!(kind_of(Shape::Uint).unwrap(), PredicateKind::Int);
    }

    #[test]
    fn test_f64_vector_is_narrowed() {
        let Some(Value::VFloat(bytes)) = encode(Shape::F64Vec, &json!([0.1, 0.2])).unwrap() else {
            panic!("expected vector");
        };
        assert_eq!(unpack_f32(&bytes).unwrap(), vec![0.1f32, 0.2f32]);
    }

    #[test]
    fn test_time_keeps_offset() {
        let Some(Value::DateTime(bytes)) =
            encode(Shape::Time, &json!("2024-03-01T10:00:00+02:00")).unwrap()
        else {
            panic!("expected datetime");
        };
        let dt = decode_datetime(&bytes).unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 7200);
        assert_eq!(dt.to_rfc3339(), "2024-03-01T10:00:00+02:00");
    }

    #[test]
    fn test_point_is_wkb() {
        let Some(Value::Geo(wkb)) =
            encode(Shape::Point, &json!({"coordinates": [-122.082506, 37.4249518]})).unwrap()
        else {
            panic!("expected geo");
        };
        assert_eq!(wkb.len(), 21);
        assert_eq!(wkb[0], 1);
    }

    #[test]
    fn test_unsupported_and_mismatch() {
        let err = encode(Shape::Unsupported("HashMap"), &json!({})).unwrap_err();
        assert_eq!(err.to_string(), "unsupported type: HashMap");
        assert!(kind_of(Shape::Unsupported("HashMap")).is_err());
        assert!(encode(Shape::Int, &json!("ten")).is_err());
    }

    #[test]
    fn test_filter_literal() {
        assert_eq!(filter_literal(&Value::Str("1\"2".into())).unwrap(), r#""1\"2""#);
        assert_eq!(filter_literal(&Value::Int(5)).unwrap(), "5");
        assert_eq!(filter_literal(&Value::VFloat(vec![])), None);
    }

    proptest! {
        #[test]
        fn test_nonzero_ints_always_encode(i in any::<i64>().prop_filter("non-zero", |i| *i != 0)) {
            prop_assert_eq!(encode(Shape::Int, &json!(i)).unwrap(), Some(Value::Int(i)));
        }

        #[test]
        fn test_f32_vectors_pack_exactly(v in proptest::collection::vec(-1.0e6f32..1.0e6, 1..16)) {
            let json = serde_json::to_value(&v).unwrap();
            let Some(Value::VFloat(bytes)) = encode(Shape::F32Vec, &json).unwrap() else {
                panic!("expected vector");
            };
            prop_assert_eq!(unpack_f32(&bytes).unwrap(), v);
        }
    }
}
