use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::PrepError;

/// Pfafstetter level-2 drainage regions, in the order the upstream datasets
/// enumerate them.
pub const ALL_REGION_CODES: [u8; 61] = [
    11, 12, 13, 14, 15, 16, 17, 18, //
    21, 22, 23, 24, 25, 26, 27, 28, 29, //
    31, 32, 33, 34, 35, 36, //
    41, 42, 43, 44, 45, 46, 47, 48, 49, //
    51, 52, 53, 54, 55, 56, 57, //
    61, 62, 63, 64, 65, 66, 67, //
    71, 72, 73, 74, 75, 76, 77, 78, //
    81, 82, 83, 84, 85, 86, //
    91,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RegionCode(u8);

impl RegionCode {
    pub fn new(code: u8) -> Result<Self, PrepError> {
        if ALL_REGION_CODES.contains(&code) {
            Ok(Self(code))
        } else {
            Err(PrepError::InvalidRegionCode(code.to_string()))
        }
    }

    pub fn all() -> impl Iterator<Item = RegionCode> {
        ALL_REGION_CODES.iter().map(|code| RegionCode(*code))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for RegionCode {
    type Error = PrepError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RegionCode> for u8 {
    fn from(code: RegionCode) -> Self {
        code.0
    }
}

impl FromStr for RegionCode {
    type Err = PrepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let code = trimmed
            .parse::<u8>()
            .map_err(|_| PrepError::InvalidRegionCode(value.to_string()))?;
        Self::new(code)
    }
}

/// What the caller asked for on the command line or in code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionSelector {
    All,
    Single(u8),
    List(Vec<u8>),
}

impl RegionSelector {
    /// Expands the selector into validated, deduplicated codes.
    ///
    /// Explicit codes keep the order they were given in; `All` yields the
    /// canonical enumeration. A single unknown code rejects the whole
    /// selection.
    pub fn resolve(&self) -> Result<Vec<RegionCode>, PrepError> {
        let raw: Vec<u8> = match self {
            RegionSelector::All => return Ok(RegionCode::all().collect()),
            RegionSelector::Single(code) => vec![*code],
            RegionSelector::List(codes) => codes.clone(),
        };

        let mut resolved = Vec::with_capacity(raw.len());
        for code in raw {
            let code = RegionCode::new(code)?;
            if !resolved.contains(&code) {
                resolved.push(code);
            }
        }
        Ok(resolved)
    }

    /// Builds a selector from CLI tokens such as `["all"]`, `["11", "12"]`
    /// or `["11,12"]`.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self, PrepError> {
        let mut codes = Vec::new();
        for arg in args {
            for token in arg.as_ref().split(',') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                if token.eq_ignore_ascii_case("all") {
                    return Ok(RegionSelector::All);
                }
                let code = token
                    .parse::<u8>()
                    .map_err(|_| PrepError::InvalidRegionCode(token.to_string()))?;
                codes.push(code);
            }
        }
        match codes.as_slice() {
            [] => Err(PrepError::InvalidRegionCode("<empty>".to_string())),
            [code] => Ok(RegionSelector::Single(*code)),
            _ => Ok(RegionSelector::List(codes)),
        }
    }
}

impl FromStr for RegionSelector {
    type Err = PrepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_args(&[value])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    FlowDirectionRaster,
    FlowAccumulationRaster,
    CatchmentVectorArchive,
    RiverVectorArchive,
    SimplifiedCatchmentArchive,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::FlowDirectionRaster => write!(f, "flow_direction_raster"),
            DatasetKind::FlowAccumulationRaster => write!(f, "flow_accumulation_raster"),
            DatasetKind::CatchmentVectorArchive => write!(f, "catchment_vector_archive"),
            DatasetKind::RiverVectorArchive => write!(f, "river_vector_archive"),
            DatasetKind::SimplifiedCatchmentArchive => write!(f, "simplified_catchment_archive"),
        }
    }
}

impl DatasetKind {
    /// Directory below the data root that holds this kind's files.
    pub fn canonical_directory(self) -> &'static str {
        match self {
            DatasetKind::FlowDirectionRaster => "raster/flowdir_basins",
            DatasetKind::FlowAccumulationRaster => "raster/accum_basins",
            DatasetKind::CatchmentVectorArchive => "shp/merit_catchments",
            DatasetKind::RiverVectorArchive => "shp/merit_rivers",
            DatasetKind::SimplifiedCatchmentArchive => "shp/catchments_simplified",
        }
    }

    pub fn is_archive(self) -> bool {
        !matches!(
            self,
            DatasetKind::FlowDirectionRaster | DatasetKind::FlowAccumulationRaster
        )
    }
}

/// One fetchable artifact, resolved for a region code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescriptor {
    pub kind: DatasetKind,
    pub code: RegionCode,
    pub remote_url: String,
    pub local_staging_name: String,
    pub canonical_directory: Utf8PathBuf,
    pub filename_glob_for_presence_check: String,
}

impl DatasetDescriptor {
    pub fn resolve(kind: DatasetKind, code: RegionCode, settings: &Settings) -> Self {
        let raster_url = settings.raster_url.trim_end_matches('/');
        let shape_url = settings.shape_url.trim_end_matches('/');
        let basins_zip = format!("pfaf_{code}_MERIT_Hydro_v07_Basins_v01.zip");

        let (remote_url, local_staging_name, glob) = match kind {
            DatasetKind::FlowDirectionRaster => (
                format!("{raster_url}/flow_dir_basins/flowdir{code}.tif"),
                format!("flowdir{code}.tif"),
                format!("flowdir{code}.tif"),
            ),
            DatasetKind::FlowAccumulationRaster => (
                format!("{raster_url}/accum_basins/accum{code}.tif"),
                format!("accum{code}.tif"),
                format!("accum{code}.tif"),
            ),
            DatasetKind::CatchmentVectorArchive => (
                format!("{shape_url}/{basins_zip}"),
                basins_zip,
                format!("cat_pfaf_{code}_*.shp"),
            ),
            DatasetKind::RiverVectorArchive => (
                format!("{shape_url}/{basins_zip}"),
                basins_zip,
                format!("riv_pfaf_{code}_*.shp"),
            ),
            DatasetKind::SimplifiedCatchmentArchive => (
                settings.lowres_url.clone(),
                "catchments_simplified.zip".to_string(),
                format!("*pfaf_{code}_*.shp"),
            ),
        };

        Self {
            kind,
            code,
            remote_url,
            local_staging_name,
            canonical_directory: Utf8PathBuf::from(kind.canonical_directory()),
            filename_glob_for_presence_check: glob,
        }
    }
}
