use assert_matches::assert_matches;

use watershed_prep::config::{Config, ConfigLoader, DEFAULT_SHAPE_URL};
use watershed_prep::error::PrepError;

#[test]
fn partial_config_overrides_defaults() {
    let config: Config = serde_json::from_str(
        r#"{"schema_version": 1, "base_path": "/srv/merit", "jobs": 4, "timeout_secs": 30}"#,
    )
    .unwrap();

    let settings = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(settings.base_path, "/srv/merit");
    assert_eq!(settings.jobs, 4);
    assert_eq!(settings.timeout().as_secs(), 30);
    assert_eq!(settings.shape_url, DEFAULT_SHAPE_URL);
    assert_eq!(settings.max_retries, 3);
}

#[test]
fn config_file_is_read() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("wsprep.json");
    std::fs::write(&path, r#"{"raster_url": "http://mirror.local/rasters"}"#).unwrap();

    let settings = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(settings.raster_url, "http://mirror.local/rasters");
}

#[test]
fn explicit_missing_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, PrepError::ConfigRead(_));
}

#[test]
fn unsupported_schema_version() {
    let config: Config = serde_json::from_str(r#"{"schema_version": 2}"#).unwrap();
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(PrepError::ConfigParse(_))
    );
}
