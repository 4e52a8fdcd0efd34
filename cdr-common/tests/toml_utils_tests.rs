//! Integration tests for TOML config utilities and output root resolution

use cdr_common::config::{
    ensure_directory, load_or_create_toml_config, load_toml_config, resolve_output_root,
    write_toml_config, LoggingConfig, TomlConfig, OUTPUT_ROOT_ENV,
};
use serial_test::serial;
use std::path::PathBuf;
use tempfile::TempDir;

fn sample_config() -> TomlConfig {
    TomlConfig {
        output_root: Some(PathBuf::from("/srv/crash-runs")),
        bind_addr: "0.0.0.0".to_string(),
        port: 8090,
        max_upload_bytes: 1024,
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        refinement_config: Some(PathBuf::from("/etc/crash-refiner/refine.toml")),
    }
}

#[test]
fn test_atomic_write_renames_to_target() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");

    write_toml_config(&sample_config(), &target).unwrap();

    assert!(target.exists());
    assert!(!temp_dir.path().join("config.toml.tmp").exists());

    let content = std::fs::read_to_string(&target).unwrap();
    assert!(content.contains("output_root"));
    assert!(content.contains("/srv/crash-runs"));
}

#[test]
fn test_write_then_load_preserves_fields() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("nested").join("config.toml");

    let config = sample_config();
    write_toml_config(&config, &target).unwrap();

    let loaded = load_toml_config(&target).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_load_reports_parse_error() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("broken.toml");
    std::fs::write(&target, "port = \"not a number\"").unwrap();

    let err = load_toml_config(&target).unwrap_err();
    assert!(err.to_string().starts_with("Cannot load config"));
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn test_first_run_writes_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("crash-refiner").join("config.toml");

    let config = load_or_create_toml_config(&target).unwrap();
    assert_eq!(config, TomlConfig::default());
    assert_eq!(load_toml_config(&target).unwrap(), TomlConfig::default());
}

#[test]
fn test_existing_config_is_not_overwritten() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");
    write_toml_config(&sample_config(), &target).unwrap();

    let config = load_or_create_toml_config(&target).unwrap();
    assert_eq!(config, sample_config());
}

#[test]
fn test_unwritable_first_run_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, "x").unwrap();

    let config = load_or_create_toml_config(&blocker.join("config.toml")).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
#[serial]
fn test_env_var_beats_toml() {
    let config = sample_config();
    std::env::set_var(OUTPUT_ROOT_ENV, "/from/env");
    let resolved = resolve_output_root(None, &config);
    std::env::remove_var(OUTPUT_ROOT_ENV);

    assert_eq!(resolved, PathBuf::from("/from/env"));
}

#[test]
#[serial]
fn test_toml_used_without_env_or_cli() {
    std::env::remove_var(OUTPUT_ROOT_ENV);
    let resolved = resolve_output_root(None, &sample_config());
    assert_eq!(resolved, PathBuf::from("/srv/crash-runs"));
}

#[test]
fn test_ensure_directory_creates_missing() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("a").join("b");

    let created = ensure_directory(&root).unwrap();
    assert_eq!(created, root);
    assert!(root.is_dir());
}

#[test]
fn test_ensure_directory_rejects_file() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("not_a_dir");
    std::fs::write(&file, "x").unwrap();

    assert!(ensure_directory(&file).is_err());
}
