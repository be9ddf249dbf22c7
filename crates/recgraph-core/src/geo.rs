//! Geospatial values
//!
//! Points and polygons are written to the engine as little-endian WKB
//! (ISO 2D: point = type 1, polygon = type 3) and read back as GeoJSON.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::{RecgraphError, Result};

const WKB_LITTLE_ENDIAN: u8 = 1;
const WKB_POINT: u32 = 1;
const WKB_POLYGON: u32 = 3;

/// GeoJSON-style point: `coordinates = [lon, lat]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

impl Point {
    /// Point at the given longitude / latitude
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            coordinates: vec![lon, lat],
        }
    }
}

/// GeoJSON-style polygon: a list of rings, each a list of `[lon, lat]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    #[serde(default)]
    pub coordinates: Vec<Vec<Vec<f64>>>,
}

impl Polygon {
    /// Polygon from its rings
    pub fn new(rings: Vec<Vec<[f64; 2]>>) -> Self {
        Self {
            coordinates: rings
                .into_iter()
                .map(|ring| ring.into_iter().map(|p| p.to_vec()).collect())
                .collect(),
        }
    }
}

/// WKB for a point, or `None` when the point is empty
pub fn encode_point(point: &Point) -> Result<Option<Vec<u8>>> {
    if point.coordinates.is_empty() {
        return Ok(None);
    }
    let (lon, lat) = lon_lat(&point.coordinates)?;

    let mut buf = Vec::with_capacity(21);
    buf.write_u8(WKB_LITTLE_ENDIAN)?;
    buf.write_u32::<LittleEndian>(WKB_POINT)?;
    buf.write_f64::<LittleEndian>(lon)?;
    buf.write_f64::<LittleEndian>(lat)?;
    Ok(Some(buf))
}

/// WKB for a polygon, or `None` when the polygon is empty
pub fn encode_polygon(polygon: &Polygon) -> Result<Option<Vec<u8>>> {
    if polygon.coordinates.is_empty() {
        return Ok(None);
    }

    let mut buf = Vec::new();
    buf.write_u8(WKB_LITTLE_ENDIAN)?;
    buf.write_u32::<LittleEndian>(WKB_POLYGON)?;
    buf.write_u32::<LittleEndian>(polygon.coordinates.len() as u32)?;
    for ring in &polygon.coordinates {
        buf.write_u32::<LittleEndian>(ring.len() as u32)?;
        for coord in ring {
            let (lon, lat) = lon_lat(coord)?;
            buf.write_f64::<LittleEndian>(lon)?;
            buf.write_f64::<LittleEndian>(lat)?;
        }
    }
    Ok(Some(buf))
}

/// Decode WKB into a GeoJSON object
pub fn wkb_to_geojson(bytes: &[u8]) -> Result<serde_json::Value> {
    let mut cur = Cursor::new(bytes);
    let order = cur.read_u8().map_err(geo_err)?;
    if order != WKB_LITTLE_ENDIAN {
        return Err(RecgraphError::Geo(format!("unsupported WKB byte order {order}")));
    }

    match cur.read_u32::<LittleEndian>().map_err(geo_err)? {
        WKB_POINT => {
            let lon = cur.read_f64::<LittleEndian>().map_err(geo_err)?;
            let lat = cur.read_f64::<LittleEndian>().map_err(geo_err)?;
            Ok(serde_json::json!({ "type": "Point", "coordinates": [lon, lat] }))
        }
        WKB_POLYGON => {
            let rings = cur.read_u32::<LittleEndian>().map_err(geo_err)?;
            let mut coordinates = Vec::with_capacity(rings as usize);
            for _ in 0..rings {
                let points = cur.read_u32::<LittleEndian>().map_err(geo_err)?;
                let mut ring = Vec::with_capacity(points as usize);
                for _ in 0..points {
                    let lon = cur.read_f64::<LittleEndian>().map_err(geo_err)?;
                    let lat = cur.read_f64::<LittleEndian>().map_err(geo_err)?;
                    ring.push(vec![lon, lat]);
                }
                coordinates.push(ring);
            }
            Ok(serde_json::json!({ "type": "Polygon", "coordinates": coordinates }))
        }
        other => Err(RecgraphError::Geo(format!("unsupported WKB geometry type {other}"))),
    }
}

/// Encode a GeoJSON object (as found in RDF literals) into WKB
pub fn geojson_to_wkb(value: &serde_json::Value) -> Result<Option<Vec<u8>>> {
    match value.get("type").and_then(|t| t.as_str()) {
        Some("Point") => {
            let point: Point = serde_json::from_value(value.clone())
                .map_err(|e| RecgraphError::Geo(e.to_string()))?;
            encode_point(&point)
        }
        Some("Polygon") => {
            let polygon: Polygon = serde_json::from_value(value.clone())
                .map_err(|e| RecgraphError::Geo(e.to_string()))?;
            encode_polygon(&polygon)
        }
        other => Err(RecgraphError::Geo(format!("unsupported geometry {other:?}"))),
    }
}

fn lon_lat(coord: &[f64]) -> Result<(f64, f64)> {
    match coord {
        [lon, lat] => Ok((*lon, *lat)),
        other => Err(RecgraphError::Geo(format!(
            "expected [lon, lat], got {} coordinates",
            other.len()
        ))),
    }
}

fn geo_err(e: std::io::Error) -> RecgraphError {
    RecgraphError::Geo(format!("truncated WKB: {e}"))
}
