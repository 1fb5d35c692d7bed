use std::fs;

use trails_config::{ConfigLoader, LogFormat};

#[test]
fn loads_yaml_config_from_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("config.yml"),
        "database:\n  file: hoa.db\n  automigrate: false\nlog:\n  format: json\n",
    )
    .unwrap();

    let config = ConfigLoader::load_file(&dir.path().join("config.yml")).unwrap();
    assert_eq!(config.database.file, "hoa.db");
    assert!(!config.database.automigrate);
    assert_eq!(config.log.format, LogFormat::Json);
}

#[test]
fn loads_toml_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[gateway]\nhost = \"0.0.0.0\"\nport = 8080\n").unwrap();

    let config = ConfigLoader::load_file(&path).unwrap();
    assert_eq!(config.gateway.host, "0.0.0.0");
    assert_eq!(config.gateway.port, 8080);
    assert!(config.database.automigrate);
}

#[test]
fn unsupported_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.ini");
    fs::write(&path, "port=1").unwrap();

    let err = ConfigLoader::load_file(&path).unwrap_err();
    assert!(err.to_string().contains("unsupported config extension"));
}

#[test]
fn missing_config_dir_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let loader = ConfigLoader::with_dir(dir.path().join("absent"));
    let config = loader.load().unwrap();
    assert_eq!(config.database.file, "data.db");
}
