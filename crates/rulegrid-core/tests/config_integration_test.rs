use rulegrid_core::{
    ChannelRangeParser, ConfigError, ConfigManager, RuleGridConfig, RuleGridError,
};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_configuration() {
    let config = RuleGridConfig::default();
    assert!(ConfigManager::validate_config(&config).is_ok());
}

#[test]
fn test_create_and_reload_default_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");

    ConfigManager::create_default_config(&path).unwrap();
    assert!(path.exists());

    let manager = ConfigManager::load_from_path(&path).unwrap();
    assert_eq!(manager.config_path(), Some(path.as_path()));
    assert_eq!(manager.config().channels.max_channel_count, 128);
    assert_eq!(manager.config().logging.format, "pretty");
}

#[test]
fn test_config_file_drives_parser_bounds() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("rulegrid.toml");
    fs::write(
        &path,
        r#"
[channels]
max_channel_count = 8

[jobs]
poll_interval_ms = 250
"#,
    )
    .unwrap();

    let manager = ConfigManager::load_from_path(&path).unwrap();
    let parser = ChannelRangeParser::from_config(&manager.config().channels);
    assert_eq!(parser.parse("1-8").unwrap().len(), 8);
    assert!(matches!(
        parser.parse("1-9"),
        Err(RuleGridError::OutOfBounds { value: 9, max: 8 })
    ));
    assert_eq!(manager.config().jobs.poll_interval_ms, 250);
}

#[test]
fn test_invalid_config_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    fs::write(&path, "[logging]\nlevel = \"chatty\"\n").unwrap();

    match ConfigManager::load_from_path(&path) {
        Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("chatty")),
        other => panic!("expected validation error, got {:?}", other.err()),
    }
}

#[test]
fn test_missing_and_unparsable_files() {
    let temp_dir = TempDir::new().unwrap();
    assert!(matches!(
        ConfigManager::load_from_path(&temp_dir.path().join("absent.toml")),
        Err(ConfigError::NotFound(_))
    ));

    let path = temp_dir.path().join("broken.toml");
    fs::write(&path, "[channels\nmax_channel_count = ").unwrap();
    assert!(matches!(
        ConfigManager::load_from_path(&path),
        Err(ConfigError::ParseError(_))
    ));

    let err: RuleGridError = ConfigError::NotFound("x".into()).into();
    assert_eq!(err.kind(), rulegrid_core::ErrorKind::Config);
}
