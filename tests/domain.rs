use assert_matches::assert_matches;

use watershed_prep::config::Settings;
use watershed_prep::domain::{
    ALL_REGION_CODES, DatasetDescriptor, DatasetKind, RegionCode, RegionSelector,
};
use watershed_prep::error::PrepError;

#[test]
fn all_resolves_to_canonical_order() {
    let codes = RegionSelector::All.resolve().unwrap();
    assert_eq!(codes.len(), 61);
    assert_eq!(codes.first().unwrap().value(), 11);
    assert_eq!(codes.last().unwrap().value(), 91);
    let values: Vec<u8> = codes.iter().map(|code| code.value()).collect();
    assert_eq!(values, ALL_REGION_CODES.to_vec());
}

#[test]
fn list_keeps_given_order_and_drops_duplicates() {
    let codes = RegionSelector::List(vec![42, 11, 42, 91]).resolve().unwrap();
    let values: Vec<u8> = codes.iter().map(|code| code.value()).collect();
    assert_eq!(values, vec![42, 11, 91]);
}

#[test]
fn unknown_code_is_fatal() {
    for bad in [0u8, 10, 19, 30, 37, 50, 58, 68, 79, 87, 90, 92] {
        let err = RegionSelector::Single(bad).resolve().unwrap_err();
        assert_matches!(err, PrepError::InvalidRegionCode(_), "code {bad}");
    }
    let err = RegionSelector::List(vec![11, 99]).resolve().unwrap_err();
    assert_matches!(err, PrepError::InvalidRegionCode(ref code) if code == "99");
}

#[test]
fn selector_from_cli_tokens() {
    assert_eq!("all".parse::<RegionSelector>().unwrap(), RegionSelector::All);
    assert_eq!(
        "11".parse::<RegionSelector>().unwrap(),
        RegionSelector::Single(11)
    );
    assert_eq!(
        RegionSelector::from_args(&["11,12", "13"]).unwrap(),
        RegionSelector::List(vec![11, 12, 13])
    );
    assert_matches!(
        "eleven".parse::<RegionSelector>(),
        Err(PrepError::InvalidRegionCode(_))
    );
    assert_matches!(
        RegionSelector::from_args::<&str>(&[]),
        Err(PrepError::InvalidRegionCode(_))
    );
}

#[test]
fn descriptors_follow_upstream_naming() {
    let settings = Settings::default();
    let code = RegionCode::new(11).unwrap();

    let accum = DatasetDescriptor::resolve(DatasetKind::FlowAccumulationRaster, code, &settings);
    assert_eq!(
        accum.remote_url,
        "https://mghydro.com/watersheds/rasters/accum_basins/accum11.tif"
    );
    assert_eq!(accum.local_staging_name, "accum11.tif");

    let rivers = DatasetDescriptor::resolve(DatasetKind::RiverVectorArchive, code, &settings);
    assert_eq!(
        rivers.remote_url,
        "https://merit.mmaelicke.de/pfaf_11_MERIT_Hydro_v07_Basins_v01.zip"
    );
    assert_eq!(rivers.filename_glob_for_presence_check, "riv_pfaf_11_*.shp");
    assert_eq!(rivers.canonical_directory, "shp/merit_rivers");

    let simplified =
        DatasetDescriptor::resolve(DatasetKind::SimplifiedCatchmentArchive, code, &settings);
    assert_eq!(
        simplified.remote_url,
        "https://mghydro.com/watersheds/share/catchments_simplified.zip"
    );
    assert_eq!(simplified.filename_glob_for_presence_check, "*pfaf_11_*.shp");
    assert!(simplified.kind.is_archive());
    assert!(!accum.kind.is_archive());
}

#[test]
fn region_code_serde_rejects_unknown() {
    let code: RegionCode = serde_json::from_str("45").unwrap();
    assert_eq!(code.value(), 45);
    assert!(serde_json::from_str::<RegionCode>("46").is_ok());
    assert!(serde_json::from_str::<RegionCode>("40").is_err());
}
