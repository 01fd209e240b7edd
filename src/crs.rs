//! Reprojection of outlet coordinates into EPSG:4326.

use std::fmt;
use std::str::FromStr;

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::error::PrepError;
use crate::outlet::OutletCollection;

pub const WGS84: Crs = Crs::Epsg(4326);

/// A declared coordinate reference system, identified by EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    Epsg(u16),
}

impl Crs {
    pub fn epsg(self) -> u16 {
        match self {
            Crs::Epsg(code) => code,
        }
    }

    pub fn is_wgs84(self) -> bool {
        self == WGS84
    }

    fn definition(self) -> Result<&'static str, PrepError> {
        crs_definitions::from_code(self.epsg())
            .map(|def| def.proj4)
            .ok_or_else(|| PrepError::Crs(format!("unknown CRS {self}")))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = PrepError;

    /// Accepts `EPSG:3857`, `3857`, the OGC URN forms
    /// (`urn:ogc:def:crs:EPSG::3857`) and CRS84, which is treated as
    /// EPSG:4326.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let upper = trimmed.to_ascii_uppercase();
        if upper.ends_with("CRS84") || upper.ends_with("CRS:84") {
            return Ok(WGS84);
        }
        let code = upper
            .rsplit(':')
            .next()
            .filter(|tail| !tail.is_empty())
            .ok_or_else(|| PrepError::Crs(format!("unrecognized CRS {value:?}")))?;
        if !(upper == code || upper.contains("EPSG")) {
            return Err(PrepError::Crs(format!("unrecognized CRS {value:?}")));
        }
        let code = code
            .parse::<u16>()
            .map_err(|_| PrepError::Crs(format!("unrecognized CRS {value:?}")))?;
        Ok(Crs::Epsg(code))
    }
}

/// Rewrites every outlet's coordinates into EPSG:4326.
///
/// No declared CRS means the coordinates are already WGS84 and nothing is
/// touched, as is the case when the source is already EPSG:4326.
pub fn normalize(collection: &mut OutletCollection) -> Result<(), PrepError> {
    let Some(source) = collection.crs else {
        collection.crs = Some(WGS84);
        return Ok(());
    };
    if source.is_wgs84() {
        return Ok(());
    }

    let definition = source.definition()?;
    let from = Proj::from_proj_string(definition)
        .map_err(|err| PrepError::Crs(format!("{source}: {err}")))?;
    let to = Proj::from_proj_string(WGS84.definition()?)
        .map_err(|err| PrepError::Crs(format!("{WGS84}: {err}")))?;
    let source_is_geographic = is_geographic(definition);

    for outlet in &mut collection.outlets {
        let mut point = if source_is_geographic {
            (outlet.lng.to_radians(), outlet.lat.to_radians(), 0.0)
        } else {
            (outlet.lng, outlet.lat, 0.0)
        };
        transform(&from, &to, &mut point).map_err(|err| {
            PrepError::Crs(format!("outlet {} could not be reprojected: {err}", outlet.id))
        })?;
        outlet.lng = point.0.to_degrees();
        outlet.lat = point.1.to_degrees();
    }
    collection.crs = Some(WGS84);
    Ok(())
}

fn is_geographic(proj4: &str) -> bool {
    proj4.contains("+proj=longlat") || proj4.contains("+proj=latlong")
}
