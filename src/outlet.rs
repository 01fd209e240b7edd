//! Outlet files: reading CSV or GeoJSON sources and writing the canonical
//! `id,lng,lat[,name][,area]` table.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use geojson::{Feature, GeoJson, Value as GeoValue};
use serde_json::Value;
use tracing::debug;

use crate::crs::Crs;
use crate::error::PrepError;

/// Candidate coordinate columns, tried in order. The first pair whose two
/// columns both exist wins; any other coordinate-looking columns are ignored.
pub const COORDINATE_COLUMN_PAIRS: [(&str, &str); 4] = [
    ("lon", "lat"),
    ("lng", "lat"),
    ("x", "y"),
    ("longitude", "latitude"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Outlet {
    pub id: String,
    pub lng: f64,
    pub lat: f64,
    pub name: Option<String>,
    /// Carried through as written; only missing-value markers are blanked.
    pub area: Option<String>,
}

/// Outlets in source row order, with the source's declared CRS and which
/// optional columns it carried.
#[derive(Debug, Clone, PartialEq)]
pub struct OutletCollection {
    pub outlets: Vec<Outlet>,
    pub crs: Option<Crs>,
    pub has_name: bool,
    pub has_area: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    GeoJson,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self, PrepError> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "geojson" | "json" => Ok(SourceFormat::GeoJson),
            _ => Err(PrepError::UnsupportedFormat(ext)),
        }
    }
}

/// Reads an outlet file, dispatching on its extension.
///
/// `crs_override` declares the CRS of sources that carry none (CSV) and
/// replaces whatever a GeoJSON file declares.
pub fn read_outlets(path: &Path, crs_override: Option<Crs>) -> Result<OutletCollection, PrepError> {
    let mut collection = match SourceFormat::from_path(path)? {
        SourceFormat::Csv => {
            let file = fs::File::open(path)
                .map_err(|err| PrepError::Filesystem(format!("open {}: {err}", path.display())))?;
            read_csv(io::BufReader::new(file), path)?
        }
        SourceFormat::GeoJson => {
            let content = fs::read_to_string(path)
                .map_err(|err| PrepError::Filesystem(format!("read {}: {err}", path.display())))?;
            read_geojson_str(&content, path)?
        }
    };
    if crs_override.is_some() {
        collection.crs = crs_override;
    }
    debug!(
        path = %path.display(),
        outlets = collection.outlets.len(),
        crs = ?collection.crs,
        "read outlets"
    );
    Ok(collection)
}

/// Picks the coordinate columns out of a CSV header.
pub fn infer_geometry_columns(headers: &[&str]) -> Result<(usize, usize), PrepError> {
    let position = |name: &str| headers.iter().position(|header| *header == name);
    for (x_name, y_name) in COORDINATE_COLUMN_PAIRS {
        if let (Some(x), Some(y)) = (position(x_name), position(y_name)) {
            return Ok((x, y));
        }
    }

    let mut missing = Vec::new();
    for (x_name, y_name) in COORDINATE_COLUMN_PAIRS {
        for name in [x_name, y_name] {
            if position(name).is_none() && !missing.iter().any(|m: &String| m == name) {
                missing.push(name.to_string());
            }
        }
    }
    Err(PrepError::Schema { missing })
}

pub fn read_csv<R: io::Read>(reader: R, path: &Path) -> Result<OutletCollection, PrepError> {
    let csv_error = |err: csv::Error| PrepError::Csv {
        path: path.to_path_buf(),
        message: err.to_string(),
    };

    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let headers = csv_reader.headers().map_err(csv_error)?.clone();
    let names: Vec<&str> = headers.iter().collect();
    let (x_col, y_col) = infer_geometry_columns(&names)?;
    let column = |name: &str| names.iter().position(|header| *header == name);
    let id_col = column("id");
    let name_col = column("name");
    let area_col = column("area");

    let mut outlets = Vec::new();
    for (row, record) in csv_reader.records().enumerate() {
        let record = record.map_err(csv_error)?;
        let field = |index: usize| record.get(index).unwrap_or_default();

        let lng = parse_coordinate(field(x_col), row, names[x_col])?;
        let lat = parse_coordinate(field(y_col), row, names[y_col])?;
        let area = match area_col {
            Some(index) => passthrough_text(field(index)),
            None => None,
        };

        outlets.push(Outlet {
            id: id_col.map_or_else(|| row.to_string(), |index| field(index).to_string()),
            lng,
            lat,
            name: name_col.map(|index| field(index).to_string()),
            area,
        });
    }

    Ok(OutletCollection {
        outlets,
        crs: None,
        has_name: name_col.is_some(),
        has_area: area_col.is_some(),
    })
}

pub fn read_geojson_str(content: &str, path: &Path) -> Result<OutletCollection, PrepError> {
    let geojson_error = |message: String| PrepError::GeoJson {
        path: path.to_path_buf(),
        message,
    };

    let parsed = content
        .parse::<GeoJson>()
        .map_err(|err| geojson_error(err.to_string()))?;
    let (features, foreign_members) = match parsed {
        GeoJson::FeatureCollection(collection) => {
            (collection.features, collection.foreign_members)
        }
        GeoJson::Feature(feature) => {
            let foreign = feature.foreign_members.clone();
            (vec![feature], foreign)
        }
        GeoJson::Geometry(_) => {
            return Err(geojson_error(
                "expected a Feature or FeatureCollection".to_string(),
            ));
        }
    };

    let crs = foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
        .map(declared_crs)
        .transpose()?;

    let has_id = features.iter().any(|feature| feature.contains_property("id"));
    let has_name = features
        .iter()
        .any(|feature| feature.contains_property("name"));
    let has_area = features
        .iter()
        .any(|feature| feature.contains_property("area"));

    let mut outlets = Vec::with_capacity(features.len());
    for (index, feature) in features.iter().enumerate() {
        let (lng, lat) = point_of(feature, index)?;
        let id = if has_id {
            feature
                .property("id")
                .map(property_text)
                .unwrap_or_default()
        } else {
            index.to_string()
        };
        let area = match feature.property("area") {
            None | Some(Value::Null) => None,
            Some(other) => passthrough_text(&property_text(other)),
        };

        outlets.push(Outlet {
            id,
            lng,
            lat,
            name: has_name.then(|| {
                feature
                    .property("name")
                    .map(property_text)
                    .unwrap_or_default()
            }),
            area,
        });
    }

    Ok(OutletCollection {
        outlets,
        crs,
        has_name,
        has_area,
    })
}

fn point_of(feature: &Feature, index: usize) -> Result<(f64, f64), PrepError> {
    match feature.geometry.as_ref().map(|geometry| &geometry.value) {
        Some(GeoValue::Point(position)) if position.len() >= 2 => Ok((position[0], position[1])),
        _ => Err(PrepError::NonPointGeometry { index }),
    }
}

/// Legacy GeoJSON `crs` member: `{"type": "name", "properties": {"name": ...}}`.
fn declared_crs(member: &Value) -> Result<Crs, PrepError> {
    member
        .get("properties")
        .and_then(|properties| properties.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| PrepError::Crs(format!("unsupported crs member {member}")))?
        .parse()
}

fn property_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_coordinate(value: &str, row: usize, column: &str) -> Result<f64, PrepError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .ok_or_else(|| PrepError::InvalidCoordinate {
            row,
            column: column.to_string(),
            value: value.to_string(),
        })
}

/// Cell values read as missing, written back as an empty cell.
const MISSING_MARKERS: [&str; 12] = [
    "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "#N/A", "<NA>",
];

fn passthrough_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || MISSING_MARKERS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Shortest representation that parses back to the same value, always with
/// a fractional part (`10.0`, not `10`).
pub fn format_float(value: f64) -> String {
    let text = value.to_string();
    if text.contains(['.', 'e', 'E', 'N', 'i']) {
        text
    } else {
        format!("{text}.0")
    }
}

/// Serializes the canonical table. `name` and `area` appear only when the
/// source declared them.
pub fn write_canonical<W: Write>(writer: W, collection: &OutletCollection) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec!["id", "lng", "lat"];
    if collection.has_name {
        header.push("name");
    }
    if collection.has_area {
        header.push("area");
    }
    csv_writer.write_record(&header)?;

    for outlet in &collection.outlets {
        let mut row = vec![
            outlet.id.clone(),
            format_float(outlet.lng),
            format_float(outlet.lat),
        ];
        if collection.has_name {
            row.push(outlet.name.clone().unwrap_or_default());
        }
        if collection.has_area {
            row.push(outlet.area.clone().unwrap_or_default());
        }
        csv_writer.write_record(&row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn to_canonical_string(collection: &OutletCollection) -> Result<String, PrepError> {
    let mut buffer = Vec::new();
    write_canonical(&mut buffer, collection).map_err(|err| PrepError::Csv {
        path: "<string>".into(),
        message: err.to_string(),
    })?;
    String::from_utf8(buffer).map_err(|err| PrepError::Filesystem(err.to_string()))
}

/// Writes the canonical table to `path`, replacing any existing file. The
/// table is written to a sibling temp file first.
pub fn write_canonical_file(path: &Path, collection: &OutletCollection) -> Result<(), PrepError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| PrepError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".wsprep-outlets")
        .tempfile_in(parent)
        .map_err(|err| PrepError::Filesystem(err.to_string()))?;
    write_canonical(temp.as_file_mut(), collection).map_err(|err| PrepError::Csv {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    temp.persist(path)
        .map_err(|err| PrepError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Counts outlets per id, for callers that want to flag duplicate ids.
pub fn duplicate_ids(collection: &OutletCollection) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for outlet in &collection.outlets {
        *counts.entry(outlet.id.as_str()).or_default() += 1;
    }
    let mut duplicates: Vec<String> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, _)| id.to_string())
        .collect();
    duplicates.sort();
    duplicates
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn csv(content: &str) -> Result<OutletCollection, PrepError> {
        read_csv(content.as_bytes(), Path::new("test.csv"))
    }

    #[test]
    fn inference_order_prefers_lon_over_lng() {
        let headers = ["lng", "lon", "lat", "x", "y"];
        assert_eq!(infer_geometry_columns(&headers).unwrap(), (1, 2));
    }

    #[test]
    fn inference_reports_missing_columns() {
        let err = infer_geometry_columns(&["id", "lat", "easting"]).unwrap_err();
        assert_matches!(err, PrepError::Schema { ref missing }
            if missing.contains(&"lon".to_string()) && !missing.contains(&"lat".to_string()));
    }

    #[test]
    fn longitude_latitude_pair() {
        let data = csv("longitude,latitude,name\n-70.5,44.25,Kennebec\n").unwrap();
        assert_eq!(data.outlets[0].lng, -70.5);
        assert_eq!(data.outlets[0].lat, 44.25);
        assert_eq!(data.outlets[0].id, "0");
        assert!(data.has_name && !data.has_area);
    }

    #[test]
    fn bad_coordinate_is_reported() {
        let err = csv("x,y\n5.0,north\n").unwrap_err();
        assert_matches!(err, PrepError::InvalidCoordinate { row: 0, ref column, .. } if column == "y");
    }

    #[test]
    fn area_is_carried_as_text() {
        let data = csv("x,y,area\n1,2, 1.2e3 \n3,4,n/a\n5,6,approx 40\n").unwrap();
        let areas: Vec<_> = data.outlets.iter().map(|outlet| outlet.area.as_deref()).collect();
        assert_eq!(areas, vec![Some("1.2e3"), None, Some("approx 40")]);
    }

    #[test]
    fn float_formatting_keeps_fraction() {
        assert_eq!(format_float(10.0), "10.0");
        assert_eq!(format_float(11.5), "11.5");
        assert_eq!(format_float(-0.000125), "-0.000125");
        assert_eq!(format_float(-70.0), "-70.0");
    }

    #[test]
    fn duplicate_ids_are_listed() {
        let data = csv("id,x,y\nA,1,2\nB,1,2\nA,3,4\n").unwrap();
        assert_eq!(duplicate_ids(&data), vec!["A".to_string()]);
    }
}
