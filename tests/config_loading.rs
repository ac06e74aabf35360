//! Configuration loading: file, defaults, and environment overrides.

use rust_focus::config::FocusConfig;
use rust_focus::registry::FactoryRegistry;
use serial_test::serial;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

const SAMPLE: &str = r#"
[application]
name = "Test Focuser"
log_level = "debug"

[polling]
interval_ms = 250

[device]
type = "microstepper"

[device.config]
port = "/dev/ttyACM3"
max_position = 20000
backlash = 35
"#;

#[test]
#[serial]
fn test_load_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("focuser.toml");
    fs::write(&path, SAMPLE).unwrap();

    let config = FocusConfig::load_from(&path).unwrap();
    assert_eq!(config.application.name, "Test Focuser");
    assert_eq!(config.application.log_level, "debug");
    assert_eq!(config.polling.interval(), Some(Duration::from_millis(250)));
    assert_eq!(config.device.r#type, "microstepper");
    assert_eq!(
        config.device.config.get("port").and_then(|v| v.as_str()),
        Some("/dev/ttyACM3")
    );
    assert!(config.validate().is_ok());

    // The device table is handed to the driver factory unchanged
    let registry = FactoryRegistry::with_builtin_drivers();
    let factory = registry.factory("microstepper").unwrap();
    assert!(factory.validate(&config.device.config).is_ok());
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    let dir = tempdir().unwrap();
    let config = FocusConfig::load_from(dir.path().join("absent.toml")).unwrap();

    assert_eq!(config.application.log_level, "info");
    assert_eq!(config.device.r#type, "microstepper");
    assert!(config.polling.interval().is_none());
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("focuser.toml");
    fs::write(&path, SAMPLE).unwrap();

    std::env::set_var("RUST_FOCUS_APPLICATION__LOG_LEVEL", "warn");
    std::env::set_var("RUST_FOCUS_DEVICE__CONFIG__PORT", "/dev/ttyUSB7");
    let result = FocusConfig::load_from(&path);
    std::env::remove_var("RUST_FOCUS_APPLICATION__LOG_LEVEL");
    std::env::remove_var("RUST_FOCUS_DEVICE__CONFIG__PORT");

    let config = result.unwrap();
    assert_eq!(config.application.log_level, "warn");
    assert_eq!(
        config.device.config.get("port").and_then(|v| v.as_str()),
        Some("/dev/ttyUSB7")
    );
    // Untouched keys survive the merge
    assert_eq!(
        config
            .device
            .config
            .get("max_position")
            .and_then(|v| v.as_integer()),
        Some(20000)
    );
}

#[test]
#[serial]
fn test_invalid_log_level_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("focuser.toml");
    fs::write(&path, "[application]\nlog_level = \"chatty\"\n").unwrap();

    let config = FocusConfig::load_from(&path).unwrap();
    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn test_shipped_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/focuser.toml");
    let config = FocusConfig::load_from(path).unwrap();
    assert!(config.validate().is_ok());

    let registry = FactoryRegistry::with_builtin_drivers();
    let factory = registry.factory(&config.device.r#type).unwrap();
    assert!(factory.validate(&config.device.config).is_ok());
}
