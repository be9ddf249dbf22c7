//! Point and polygon fields

mod common;

use common::{open_engine, GeomStruct};
use recgraph::{Context, Point, Polygon, RecgraphError};

#[tokio::test]
async fn test_point_round_trip_is_bit_exact() {
    let (engine, _dir) = open_engine();
    let ctx = Context::background();

    let geom = GeomStruct {
        name: "HQ".to_string(),
        point: Point::new(-122.082506, 37.4249518),
        ..GeomStruct::default()
    };
    let (gid, _) = engine.create(&ctx, &geom).await.unwrap();
    let (_, got): (u64, GeomStruct) = engine.get(&ctx, gid).await.unwrap();

    assert_eq!(got.point.coordinates.len(), 2);
    assert_eq!(got.point.coordinates[0].to_bits(), (-122.082506f64).to_bits());
    assert_eq!(got.point.coordinates[1].to_bits(), 37.4249518f64.to_bits());
    assert!(got.area.coordinates.is_empty());
}

#[tokio::test]
async fn test_polygon_round_trip() {
    let (engine, _dir) = open_engine();
    let ctx = Context::background();

    let ring = vec![
        [-122.083506, 37.4259518],
        [-122.081506, 37.4259518],
        [-122.081506, 37.4239518],
        [-122.083506, 37.4239518],
        [-122.083506, 37.4259518],
    ];
    let geom = GeomStruct {
        name: "campus".to_string(),
        point: Point::new(-122.082506, 37.4249518),
        area: Polygon::new(vec![ring]),
        ..GeomStruct::default()
    };
    let (gid, _) = engine.create(&ctx, &geom).await.unwrap();
    let (_, got): (u64, GeomStruct) = engine.get(&ctx, gid).await.unwrap();
    assert_eq!(got, GeomStruct { gid, ..geom });
}

#[tokio::test]
async fn test_malformed_point_is_rejected() {
    let (engine, _dir) = open_engine();
    let ctx = Context::background();

    let geom = GeomStruct {
        name: "bad".to_string(),
        point: Point {
            coordinates: vec![1.0],
        },
        ..GeomStruct::default()
    };
    let err = engine.create(&ctx, &geom).await.unwrap_err();
    assert!(matches!(err, RecgraphError::Geo(_)));
}
