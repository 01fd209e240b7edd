use std::fs;
use std::path::Path;

use assert_matches::assert_matches;

use watershed_prep::app::normalize_outlets;
use watershed_prep::crs::{Crs, WGS84};
use watershed_prep::error::PrepError;
use watershed_prep::outlet::{read_outlets, to_canonical_string};
use watershed_prep::output::JsonOutput;

fn normalize(dir: &Path, name: &str, content: &str) -> Result<String, PrepError> {
    let input = dir.join(name);
    fs::write(&input, content).unwrap();
    let output = dir.join("out/outlets.csv");
    normalize_outlets(&input, &output, None, &JsonOutput)?;
    Ok(fs::read_to_string(output).unwrap())
}

#[test]
fn lon_lat_with_id_column() {
    let temp = tempfile::tempdir().unwrap();
    let out = normalize(temp.path(), "in.csv", "id,lon,lat\nA,10.0,20.0\nB,11.5,21.5\n").unwrap();
    assert_eq!(out, "id,lng,lat\nA,10.0,20.0\nB,11.5,21.5\n");
}

#[test]
fn x_y_without_id_uses_row_index() {
    let temp = tempfile::tempdir().unwrap();
    let out = normalize(temp.path(), "in.csv", "x,y\n5.0,6.0\n").unwrap();
    assert_eq!(out, "id,lng,lat\n0,5.0,6.0\n");
}

#[test]
fn every_recognized_pair_round_trips_coordinates() {
    let temp = tempfile::tempdir().unwrap();
    for (x, y) in [("lon", "lat"), ("lng", "lat"), ("x", "y"), ("longitude", "latitude")] {
        let content = format!("{x},{y}\n-122.25,47.5\n8.125,-3.75\n");
        let out = normalize(temp.path(), "in.csv", &content).unwrap();
        assert_eq!(out, "id,lng,lat\n0,-122.25,47.5\n1,8.125,-3.75\n", "pair {x}/{y}");
    }
}

#[test]
fn missing_coordinate_columns_is_schema_error() {
    let temp = tempfile::tempdir().unwrap();
    let err = normalize(temp.path(), "in.csv", "id,easting,northing\nA,1,2\n").unwrap_err();
    assert_matches!(err, PrepError::Schema { ref missing } if missing.len() == 7);
    assert!(!temp.path().join("out/outlets.csv").exists());
}

#[test]
fn unknown_extension_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let err = normalize(temp.path(), "in.xlsx", "whatever").unwrap_err();
    assert_matches!(err, PrepError::UnsupportedFormat(ref ext) if ext == "xlsx");
}

#[test]
fn optional_columns_pass_through_in_order() {
    let temp = tempfile::tempdir().unwrap();
    let content = "area,name,lat,lng,id,extra\n512.5,Thjorsa,64.1,-20.3,t1,x\n,Olfusa,63.9,-21.0,t2,y\n";
    let out = normalize(temp.path(), "in.csv", content).unwrap();
    assert_eq!(
        out,
        "id,lng,lat,name,area\nt1,-20.3,64.1,Thjorsa,512.5\nt2,-21.0,63.9,Olfusa,\n"
    );
}

#[test]
fn missing_area_markers_become_empty_cells() {
    let temp = tempfile::tempdir().unwrap();
    let content = "id,lon,lat,area\nA,10.0,20.0,NA\nB,11.0,21.0,NaN\nC,12.0,22.0,37.25\n";
    let out = normalize(temp.path(), "in.csv", content).unwrap();
    assert_eq!(
        out,
        "id,lng,lat,area\nA,10.0,20.0,\nB,11.0,21.0,\nC,12.0,22.0,37.25\n"
    );
}

#[test]
fn explicit_wgs84_round_trip_is_exact() {
    let temp = tempfile::tempdir().unwrap();
    let content = "id,lng,lat\nq,-19.123456789012,64.987654321098\n";
    let input = temp.path().join("in.csv");
    fs::write(&input, content).unwrap();
    let output = temp.path().join("outlets.csv");

    normalize_outlets(&input, &output, Some(WGS84), &JsonOutput).unwrap();
    assert_eq!(fs::read_to_string(&output).unwrap(), content);

    // normalizing the canonical output again changes nothing
    normalize_outlets(&output, &output, None, &JsonOutput).unwrap();
    assert_eq!(fs::read_to_string(&output).unwrap(), content);
}

#[test]
fn output_file_is_overwritten() {
    let temp = tempfile::tempdir().unwrap();
    let output = temp.path().join("out/outlets.csv");
    fs::create_dir_all(output.parent().unwrap()).unwrap();
    fs::write(&output, "stale contents that are much longer than the new table\n").unwrap();
    let out = normalize(temp.path(), "in.csv", "x,y\n1.5,2.5\n").unwrap();
    assert_eq!(out, "id,lng,lat\n0,1.5,2.5\n");
}

#[test]
fn geojson_points_with_properties() {
    let temp = tempfile::tempdir().unwrap();
    let content = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"id": 7, "name": "Ellidaar"},
             "geometry": {"type": "Point", "coordinates": [-21.85, 64.13]}},
            {"type": "Feature", "properties": {"id": "b"},
             "geometry": {"type": "Point", "coordinates": [-18.5, 65.75]}}
        ]
    }"#;
    let out = normalize(temp.path(), "in.geojson", content).unwrap();
    assert_eq!(out, "id,lng,lat,name\n7,-21.85,64.13,Ellidaar\nb,-18.5,65.75,\n");
}

#[test]
fn geojson_non_point_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let content = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {},
             "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}},
            {"type": "Feature", "properties": {},
             "geometry": {"type": "LineString", "coordinates": [[1.0, 2.0], [3.0, 4.0]]}}
        ]
    }"#;
    let err = normalize(temp.path(), "in.geojson", content).unwrap_err();
    assert_matches!(err, PrepError::NonPointGeometry { index: 1 });
}

#[test]
fn geojson_declared_crs_is_reprojected() {
    let temp = tempfile::tempdir().unwrap();
    let content = r#"{
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::3857"}},
        "features": [
            {"type": "Feature", "properties": {},
             "geometry": {"type": "Point", "coordinates": [1113194.9079327357, 0.0]}}
        ]
    }"#;
    let input = temp.path().join("in.geojson");
    fs::write(&input, content).unwrap();

    let mut collection = read_outlets(&input, None).unwrap();
    assert_eq!(collection.crs, Some(Crs::Epsg(3857)));
    watershed_prep::crs::normalize(&mut collection).unwrap();
    assert!((collection.outlets[0].lng - 10.0).abs() < 1e-6);
    assert!(collection.outlets[0].lat.abs() < 1e-6);

    let table = to_canonical_string(&collection).unwrap();
    assert!(table.starts_with("id,lng,lat\n0,"));
}
